//! Parameter packing and reprojection residuals shared by the solvers.

use camcal_core::{CameraModel, Distortion, Intrinsics, Pose};
use nalgebra::{DVector, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// `[fx, fy, cx, cy, k1, k2, p1, p2, k3]`.
pub(crate) const CAMERA_PARAMS: usize = 9;
/// `[rx, ry, rz, tx, ty, tz]`, rotation as an axis-angle vector.
pub(crate) const POSE_PARAMS: usize = 6;

/// Which camera parameters the optimizer may move.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrinsicsMask {
    pub fix_focal: bool,
    /// Keep `fy / fx` at its initial value; only `fx` is optimized.
    pub fix_aspect_ratio: bool,
    pub fix_principal_point: bool,
    pub fix_radial: bool,
    pub fix_k3: bool,
    pub zero_tangential: bool,
}

impl IntrinsicsMask {
    pub fn all_fixed() -> Self {
        Self {
            fix_focal: true,
            fix_aspect_ratio: false,
            fix_principal_point: true,
            fix_radial: true,
            fix_k3: true,
            zero_tangential: true,
        }
    }

    /// Free camera parameter offsets in `[0, CAMERA_PARAMS)`.
    pub(crate) fn free_offsets(&self) -> Vec<usize> {
        let mut free = Vec::with_capacity(CAMERA_PARAMS);
        if !self.fix_focal {
            free.push(0);
            if !self.fix_aspect_ratio {
                free.push(1);
            }
        }
        if !self.fix_principal_point {
            free.extend([2, 3]);
        }
        if !self.fix_radial {
            free.extend([4, 5]);
        }
        if !self.zero_tangential {
            free.extend([6, 7]);
        }
        if !self.fix_radial && !self.fix_k3 {
            free.push(8);
        }
        free
    }

    /// `fy / fx` to hold while solving, if the ratio is tied.
    pub(crate) fn aspect(&self, cam: &CameraModel) -> Option<f64> {
        (self.fix_aspect_ratio && !self.fix_focal)
            .then(|| cam.intrinsics.fy / cam.intrinsics.fx)
    }
}

/// Rebuild `fy` from `fx` when the aspect ratio is tied.
pub(crate) fn tie_aspect(mut cam: CameraModel, aspect: Option<f64>) -> CameraModel {
    if let Some(a) = aspect {
        cam.intrinsics.fy = cam.intrinsics.fx * a;
    }
    cam
}

pub(crate) fn camera_to_params(cam: &CameraModel) -> [f64; CAMERA_PARAMS] {
    let k = cam.intrinsics;
    let d = cam.distortion;
    [k.fx, k.fy, k.cx, k.cy, d.k1, d.k2, d.p1, d.p2, d.k3]
}

pub(crate) fn camera_from_params(x: &[f64]) -> CameraModel {
    CameraModel::new(
        Intrinsics {
            fx: x[0],
            fy: x[1],
            cx: x[2],
            cy: x[3],
        },
        Distortion::from_array([x[4], x[5], x[6], x[7], x[8]]),
    )
}

pub(crate) fn pose_to_params(pose: &Pose) -> [f64; POSE_PARAMS] {
    let r = pose.rodrigues();
    let t = pose.translation;
    [r.x, r.y, r.z, t.x, t.y, t.z]
}

pub(crate) fn pose_from_params(x: &[f64]) -> Pose {
    Pose::from_rodrigues(
        &Vector3::new(x[0], x[1], x[2]),
        Vector3::new(x[3], x[4], x[5]),
    )
}

/// Stacked `projected − observed` for one view, two entries per point.
///
/// Points that land behind the camera are projected from a clamped depth so the
/// residual stays finite and large.
pub(crate) fn view_residuals(
    cam: &CameraModel,
    pose: &Pose,
    object: &[Point3<f64>],
    observed: &[Point2<f64>],
) -> DVector<f64> {
    let mut r = DVector::zeros(2 * observed.len());
    for (i, (p, o)) in object.iter().zip(observed).enumerate() {
        let pc = pose.transform_point(p);
        let z = pc.z.max(1e-6);
        let (xd, yd) = cam.distortion.distort(pc.x / z, pc.y / z);
        let proj = cam.intrinsics.to_pixel(xd, yd);
        r[2 * i] = proj.x - o.x;
        r[2 * i + 1] = proj.y - o.y;
    }
    r
}

/// Sum of squared point distances and number of points for one view.
pub(crate) fn view_sq_error(
    cam: &CameraModel,
    pose: &Pose,
    object: &[Point3<f64>],
    observed: &[Point2<f64>],
) -> (f64, usize) {
    let r = view_residuals(cam, pose, object, observed);
    (r.norm_squared(), observed.len())
}

#[inline]
pub(crate) fn rms(sq_sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        (sq_sum / count as f64).sqrt()
    }
}
