mod common;

use camcal_core::pose::rotation_angle_deg;
use camcal_core::Pose;
use camcal_solve::handeye::{self, validate};
use camcal_solve::{
    calibrate_hand_eye, estimate_board_pose, HandEyeMethod, HandEyeOptions, HandEyeSample,
    MotionPairing,
};
use common::*;
use nalgebra::{Matrix3, Vector3};

fn camera_to_gripper() -> Pose {
    Pose::from_rodrigues(&Vector3::new(0.05, -0.1, 1.5), Vector3::new(-35.0, 60.0, 110.0))
}

/// Robot captures looking at a fixed board, board poses recovered from noisy
/// synthetic corners.
fn samples(n: usize, noise: f64) -> Vec<HandEyeSample> {
    let board = board();
    let camera = left_camera();
    let x = camera_to_gripper();
    let mut rng = rng(21);

    // Camera-from-board poses that keep the board in view; gripper poses follow.
    let board_in_base =
        Pose::from_rodrigues(&Vector3::new(0.0, 0.0, 0.3), Vector3::new(800.0, -50.0, 20.0));
    view_poses(&board, n)
        .into_iter()
        .map(|board_to_camera| {
            // Tg X Tbc = board_in_base
            let gripper = board_in_base
                .compose(&board_to_camera.inverse())
                .compose(&x.inverse());
            let corners = project_view(&camera, &board_to_camera, &board, noise, &mut rng);
            let measured = estimate_board_pose(&board, &camera, &corners).expect("board pose");
            HandEyeSample {
                gripper,
                board_to_camera: measured.pose,
            }
        })
        .collect()
}

#[test]
fn every_method_recovers_camera_to_gripper() {
    let truth = camera_to_gripper();
    let data = samples(12, 0.05);
    for method in HandEyeMethod::ALL {
        for pairing in [MotionPairing::Consecutive, MotionPairing::AllPairs] {
            let options = HandEyeOptions { method, pairing };
            let result = calibrate_hand_eye(&data, &options)
                .unwrap_or_else(|e| panic!("{method} {pairing:?}: {e}"));
            let x = result.camera_to_gripper;

            let dr = rotation_angle_deg(&(x.rotation * truth.rotation.transpose()));
            let dt = (x.translation - truth.translation).norm();
            assert!(dr < 1.0, "{method} {pairing:?}: rotation error {dr} deg");
            assert!(dt < 1.0, "{method} {pairing:?}: translation error {dt} mm");
            assert!(result.rotation_error_deg < 0.5, "{method}: {}", result.rotation_error_deg);
            assert!(result.translation_error_mm < 0.5, "{method}: {}", result.translation_error_mm);
            assert_eq!(result.method, method);
        }
    }
}

#[test]
fn validation_matches_calibration_residual() {
    let data = samples(8, 0.0);
    let (gripper, board): (Vec<Pose>, Vec<Pose>) =
        data.iter().map(|s| (s.gripper, s.board_to_camera)).unzip();

    let x = handeye::solve(&gripper, &board, HandEyeMethod::Park).expect("park");
    let res = validate(&gripper, &board, &x, MotionPairing::Consecutive).expect("validate");
    assert!(res.rotation_error_deg < 1e-3);
    assert!(res.translation_error_mm < 1e-3);

    // Shifting t_X by d leaves each motion off by exactly (R_A - I) d.
    let d = Vector3::new(5.0, 0.0, 0.0);
    let shifted = Pose::new(x.rotation, x.translation + d);
    for pairing in [MotionPairing::Consecutive, MotionPairing::AllPairs] {
        let motions = handeye::build_motions(&gripper, &board, pairing).expect("motions");
        let expected = motions
            .iter()
            .map(|m| ((m.a.rotation - Matrix3::identity()) * d).norm())
            .sum::<f64>()
            / motions.len() as f64;
        assert!(expected > 0.05, "{pairing:?}: motions barely rotate");

        // The unshifted residual bounds how far the two can differ.
        let base = validate(&gripper, &board, &x, pairing).expect("validate");
        let worse = validate(&gripper, &board, &shifted, pairing).expect("validate");
        assert!(
            (worse.translation_error_mm - expected).abs() <= base.translation_error_mm + 1e-9,
            "{pairing:?}: {} vs {expected}",
            worse.translation_error_mm
        );
        assert!(worse.rotation_error_deg < 1e-3);
    }
}
