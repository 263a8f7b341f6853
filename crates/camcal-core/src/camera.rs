//! Pinhole camera with Brown–Conrady distortion (k1, k2, p1, p2, k3).

use crate::Pose;
use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};

const UNDISTORT_ITERS: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    /// Zero-skew camera matrix `K`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Read `fx, fy, cx, cy` from a camera matrix; skew is ignored.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    #[inline]
    pub fn to_pixel(&self, x: f64, y: f64) -> Point2<f64> {
        Point2::new(self.fx * x + self.cx, self.fy * y + self.cy)
    }

    #[inline]
    pub fn to_normalized(&self, p: &Point2<f64>) -> (f64, f64) {
        ((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }
}

/// Lens distortion coefficients in OpenCV order `[k1, k2, p1, p2, k3]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub fn from_array(d: [f64; 5]) -> Self {
        Self {
            k1: d[0],
            k2: d[1],
            p1: d[2],
            p2: d[3],
            k3: d[4],
        }
    }

    pub fn to_array(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn is_zero(&self) -> bool {
        self.to_array().iter().all(|v| *v == 0.0)
    }

    /// Apply distortion to normalized image coordinates.
    #[inline]
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let xd = x * radial + 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (xd, yd)
    }

    /// Invert [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, xd: f64, yd: f64) -> (f64, f64) {
        let (mut x, mut y) = (xd, yd);
        for _ in 0..UNDISTORT_ITERS {
            let r2 = x * x + y * y;
            let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
            if radial.abs() < 1e-12 {
                break;
            }
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            x = (xd - dx) / radial;
            y = (yd - dy) / radial;
        }
        (x, y)
    }
}

/// Intrinsics plus distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
}

impl CameraModel {
    pub fn new(intrinsics: Intrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Project a point given in camera coordinates. Returns `None` behind the camera.
    #[inline]
    pub fn project_camera_point(&self, pc: &Point3<f64>) -> Option<Point2<f64>> {
        if pc.z <= 1e-9 {
            return None;
        }
        let (xd, yd) = self.distortion.distort(pc.x / pc.z, pc.y / pc.z);
        Some(self.intrinsics.to_pixel(xd, yd))
    }

    /// Project a board point seen under `pose` (board → camera).
    #[inline]
    pub fn project(&self, pose: &Pose, p: &Point3<f64>) -> Option<Point2<f64>> {
        self.project_camera_point(&pose.transform_point(p))
    }

    /// Pixel to undistorted normalized coordinates.
    pub fn undistort_pixel(&self, p: &Point2<f64>) -> Point2<f64> {
        let (xd, yd) = self.intrinsics.to_normalized(p);
        let (x, y) = self.distortion.undistort(xd, yd);
        Point2::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn camera() -> CameraModel {
        CameraModel::new(
            Intrinsics {
                fx: 900.0,
                fy: 880.0,
                cx: 640.0,
                cy: 360.0,
            },
            Distortion {
                k1: -0.2,
                k2: 0.08,
                p1: 0.001,
                p2: -0.0015,
                k3: -0.01,
            },
        )
    }

    #[test]
    fn undistort_inverts_distort() {
        let d = camera().distortion;
        for (x, y) in [(0.0, 0.0), (0.2, -0.1), (-0.35, 0.25), (0.4, 0.3)] {
            let (xd, yd) = d.distort(x, y);
            let (ux, uy) = d.undistort(xd, yd);
            assert_relative_eq!(ux, x, epsilon = 1e-9);
            assert_relative_eq!(uy, y, epsilon = 1e-9);
        }
    }

    #[test]
    fn projection_of_optical_axis_hits_principal_point() {
        let cam = camera();
        let pose = Pose::new(Matrix3::identity(), Vector3::new(0.0, 0.0, 500.0));
        let p = cam.project(&pose, &Point3::origin()).unwrap();
        assert_relative_eq!(p.x, 640.0);
        assert_relative_eq!(p.y, 360.0);
        assert!(cam
            .project_camera_point(&Point3::new(0.0, 0.0, -1.0))
            .is_none());
    }

    #[test]
    fn undistort_pixel_round_trips_projection() {
        let cam = camera();
        let pc = Point3::new(120.0, -80.0, 600.0);
        let px = cam.project_camera_point(&pc).unwrap();
        let n = cam.undistort_pixel(&px);
        assert_relative_eq!(n.x, pc.x / pc.z, epsilon = 1e-9);
        assert_relative_eq!(n.y, pc.y / pc.z, epsilon = 1e-9);
    }

    #[test]
    fn matrix_round_trip() {
        let k = camera().intrinsics;
        assert_eq!(Intrinsics::from_matrix(&k.matrix()), k);
    }
}
