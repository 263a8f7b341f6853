mod common;

use camcal_core::pose::rotation_angle_deg;
use camcal_core::{CalibErr, Pose};
use camcal_solve::{calibrate_stereo, StereoOptions};
use common::*;
use nalgebra::{Matrix3, Vector3};

/// Right camera 100 mm along the left camera's +X axis, slightly toed in.
fn rig() -> Pose {
    let rotation = Pose::from_rodrigues(&Vector3::new(0.002, -0.03, 0.001), Vector3::zeros()).rotation;
    let center = Vector3::new(100.0, 0.0, 0.0);
    Pose::new(rotation, -(rotation * center))
}

#[test]
fn recovers_baseline_and_relative_rotation() {
    let board = board();
    let (left_cam, right_cam) = (left_camera(), right_camera());
    let rel = rig();
    let mut rng = rng(11);

    let poses = view_poses(&board, 10);
    let left: Vec<_> = poses
        .iter()
        .map(|p| project_view(&left_cam, p, &board, 0.02, &mut rng))
        .collect();
    let right: Vec<_> = poses
        .iter()
        .map(|p| project_view(&right_cam, &rel.compose(p), &board, 0.02, &mut rng))
        .collect();

    let result = calibrate_stereo(&board, &left, &right, IMAGE_SHAPE, &StereoOptions::default())
        .expect("stereo calibration");

    let dt = (result.relative_translation - rel.translation).norm();
    assert!(dt < 1.0, "translation error {dt} mm: {}", result.relative_translation);
    let dr = rotation_angle_deg(&(result.relative_rotation * rel.rotation.transpose()));
    assert!(dr < 0.1, "rotation error {dr} deg");
    assert!(result.relative_translation.x < -99.0);

    assert!(result.rms_error < 0.05, "rms {}", result.rms_error);
    assert_eq!(result.left.per_view_poses.len(), 10);
    assert_eq!(result.right.per_view_poses.len(), 10);
    assert!((result.fundamental_matrix[(2, 2)] - 1.0).abs() < 1e-12);

    // x_rᵀ E x_l ≈ 0 for undistorted normalized correspondences.
    let l = result.left.camera.undistort_pixel(&left[0][0]);
    let r = result.right.camera.undistort_pixel(&right[0][0]);
    let e = Vector3::new(r.x, r.y, 1.0).dot(&(result.essential_matrix * Vector3::new(l.x, l.y, 1.0)));
    assert!(e.abs() / result.relative_translation.norm() < 1e-3, "epipolar residual {e}");
}

#[test]
fn parallel_rig_has_identity_rotation_and_pure_x_baseline() {
    let board = board();
    let (left_cam, right_cam) = (left_camera(), right_camera());
    let rel = Pose::new(Matrix3::identity(), Vector3::new(-100.0, 0.0, 0.0));
    let mut rng = rng(3);

    let poses = view_poses(&board, 8);
    let left: Vec<_> = poses
        .iter()
        .map(|p| project_view(&left_cam, p, &board, 0.0, &mut rng))
        .collect();
    let right: Vec<_> = poses
        .iter()
        .map(|p| project_view(&right_cam, &rel.compose(p), &board, 0.0, &mut rng))
        .collect();

    let result = calibrate_stereo(&board, &left, &right, IMAGE_SHAPE, &StereoOptions::default())
        .expect("stereo calibration");

    let dr = rotation_angle_deg(&result.relative_rotation);
    assert!(dr < 0.01, "rotation {dr} deg");
    let t = result.relative_translation;
    assert!((t.x + 100.0).abs() < 0.05, "baseline {t}");
    assert!(t.y.abs() < 0.05 && t.z.abs() < 0.05, "off-axis baseline {t}");

    // With R = I the essential matrix is the cross-product matrix of t, so the
    // epipolar lines are horizontal: E's first row and column vanish.
    let e = result.essential_matrix / t.norm();
    assert!(e.row(0).norm() < 1e-3 && e.column(0).norm() < 1e-3, "E = {e}");
    assert!((e[(1, 2)].abs() - 1.0).abs() < 1e-3, "E = {e}");
}

#[test]
fn fixed_intrinsics_keep_mono_estimates() {
    let board = board();
    let rel = rig();
    let mut rng = rng(5);
    let poses = view_poses(&board, 6);
    let left: Vec<_> = poses
        .iter()
        .map(|p| project_view(&left_camera(), p, &board, 0.0, &mut rng))
        .collect();
    let right: Vec<_> = poses
        .iter()
        .map(|p| project_view(&right_camera(), &rel.compose(p), &board, 0.0, &mut rng))
        .collect();

    let options = StereoOptions {
        fix_intrinsics: true,
        ..Default::default()
    };
    let result = calibrate_stereo(&board, &left, &right, IMAGE_SHAPE, &options).expect("stereo");
    let dt = (result.relative_translation - rel.translation).norm();
    assert!(dt < 0.1, "translation error {dt}");
}

#[test]
fn mismatched_lists_are_rejected() {
    let board = board();
    let mut rng = rng(2);
    let poses = view_poses(&board, 3);
    let left: Vec<_> = poses
        .iter()
        .map(|p| project_view(&left_camera(), p, &board, 0.0, &mut rng))
        .collect();

    let err = calibrate_stereo(&board, &left, &left[..2], IMAGE_SHAPE, &StereoOptions::default())
        .unwrap_err();
    assert!(matches!(err, CalibErr::SizeMismatch { expected: 3, got: 2 }));

    let err = calibrate_stereo(&board, &[], &[], IMAGE_SHAPE, &StereoOptions::default()).unwrap_err();
    assert!(matches!(err, CalibErr::NoCorners));
}
