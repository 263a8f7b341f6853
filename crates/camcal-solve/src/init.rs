//! Closed-form initial estimates: Zhang intrinsics and planar pose from `H`.

use camcal_core::{estimate_homography, project_to_so3, Homography, Intrinsics, Pose};
use nalgebra::{DMatrix, Matrix3, Point2, Point3, Vector3};

/// Board-plane homography `pixel ~ H * (X, Y, 1)` for one view.
pub fn board_homography(object: &[Point3<f64>], image: &[Point2<f64>]) -> Option<Homography> {
    let src: Vec<Point2<f64>> = object.iter().map(|p| Point2::new(p.x, p.y)).collect();
    estimate_homography(&src, image)
}

fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> [f64; 6] {
    let hi = h.column(i);
    let hj = h.column(j);
    [
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ]
}

/// Conditioning transform mapping pixels into roughly `[-1, 1]`.
fn pixel_conditioner(image_size: (u32, u32)) -> Matrix3<f64> {
    let (w, h) = (image_size.0 as f64, image_size.1 as f64);
    let s = 2.0 / (w + h).max(1.0);
    Matrix3::new(s, 0.0, -s * w * 0.5, 0.0, s, -s * h * 0.5, 0.0, 0.0, 1.0)
}

/// Zero-skew Zhang estimate from at least two homographies.
///
/// Homographies are conditioned with the image size before solving `V b = 0`;
/// an extra row pins `B12 = 0`.
pub fn zhang_intrinsics(homographies: &[Homography], image_size: (u32, u32)) -> Option<Intrinsics> {
    if homographies.len() < 2 {
        return None;
    }
    let n = pixel_conditioner(image_size);

    let rows = 2 * homographies.len() + 1;
    let mut v = DMatrix::<f64>::zeros(rows.max(6), 6);
    for (k, hom) in homographies.iter().enumerate() {
        let h = n * hom.h;
        let v12 = v_ij(&h, 0, 1);
        let v11 = v_ij(&h, 0, 0);
        let v22 = v_ij(&h, 1, 1);
        for c in 0..6 {
            v[(2 * k, c)] = v12[c];
            v[(2 * k + 1, c)] = v11[c] - v22[c];
        }
    }
    v[(2 * homographies.len(), 1)] = 1.0;

    let svd = v.svd(false, true);
    let vt = svd.v_t?;
    let b = vt.row(vt.nrows() - 1);
    let (mut b11, mut b12, mut b22, mut b13, mut b23, mut b33) =
        (b[0], b[1], b[2], b[3], b[4], b[5]);
    if b11 < 0.0 {
        (b11, b12, b22, b13, b23, b33) = (-b11, -b12, -b22, -b13, -b23, -b33);
    }

    let denom = b11 * b22 - b12 * b12;
    if denom.abs() < 1e-18 || b11.abs() < 1e-18 {
        return None;
    }
    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda / b11 <= 0.0 || lambda * b11 / denom <= 0.0 {
        return None;
    }
    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let u0 = -b13 * alpha * alpha / lambda;

    // Undo the conditioning: K = N^{-1} K'.
    let k_cond = Matrix3::new(alpha, 0.0, u0, 0.0, beta, v0, 0.0, 0.0, 1.0);
    let k = n.try_inverse()? * k_cond;
    let out = Intrinsics::from_matrix(&(k / k[(2, 2)]));
    (out.fx.is_finite() && out.fy.is_finite() && out.fx > 0.0 && out.fy > 0.0).then_some(out)
}

/// Focal-only estimate with the principal point at the image centre.
///
/// Used when too few views are available for [`zhang_intrinsics`]; falls back to
/// `f = max(w, h)` when no homography constrains the focal length.
pub fn centered_intrinsics(homographies: &[Homography], image_size: (u32, u32)) -> Intrinsics {
    let (w, h) = (image_size.0 as f64, image_size.1 as f64);
    let (cx, cy) = (w * 0.5, h * 0.5);
    let shift = Matrix3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);

    let mut f2 = Vec::new();
    for hom in homographies {
        let m = shift * hom.h;
        let (h1, h2) = (m.column(0), m.column(1));
        let den = h1[2] * h2[2];
        if den.abs() > 1e-15 {
            let est = -(h1[0] * h2[0] + h1[1] * h2[1]) / den;
            if est > 0.0 {
                f2.push(est);
            }
        }
        let den = h1[2] * h1[2] - h2[2] * h2[2];
        if den.abs() > 1e-15 {
            let est = -(h1[0] * h1[0] + h1[1] * h1[1] - h2[0] * h2[0] - h2[1] * h2[1]) / den;
            if est > 0.0 {
                f2.push(est);
            }
        }
    }

    let f = if f2.is_empty() {
        w.max(h)
    } else {
        (f2.iter().sum::<f64>() / f2.len() as f64).sqrt()
    };
    Intrinsics { fx: f, fy: f, cx, cy }
}

/// Board-to-camera pose from `H = K [r1 r2 t]`.
pub fn pose_from_homography(k: &Matrix3<f64>, hom: &Homography) -> Option<Pose> {
    let mut m = k.try_inverse()? * hom.h;
    if m[(2, 2)] < 0.0 {
        m = -m;
    }
    let h1: Vector3<f64> = m.column(0).into_owned();
    let h2: Vector3<f64> = m.column(1).into_owned();
    let scale = 2.0 / (h1.norm() + h2.norm());
    if !scale.is_finite() {
        return None;
    }
    let r1 = h1 * scale;
    let r2 = h2 * scale;
    let r3 = r1.cross(&r2);
    let t: Vector3<f64> = m.column(2).into_owned() * scale;

    let r = project_to_so3(&Matrix3::from_columns(&[r1, r2, r3]))?;
    Some(Pose::new(r, t))
}
