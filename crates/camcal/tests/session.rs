mod common;

use camcal::core::{CalibErr, CalibrationBoard, Pose};
use camcal::detect::DetectError;
use camcal::{
    CalibrationSession, Detection, ImageId, ImageState, MemoryStore, RecordStore,
    SessionCalibration,
};
use common::*;
use nalgebra::{Point2, Vector3};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

fn session(table: TableDetector) -> CalibrationSession {
    CalibrationSession::new(board(), Box::new(table))
}

fn never_found(_board: &CalibrationBoard, _path: &Path) -> Result<Detection, DetectError> {
    Ok(Detection {
        corners: None,
        image_size: IMAGE_SHAPE,
    })
}

#[test]
fn missing_board_is_rejected_and_the_rest_calibrate() {
    let (table, paths) = mono_table(5, &[2]);
    let mut s = session(table);
    let ids = s.register_images(paths);
    assert_eq!(ids.len(), 5);
    assert_eq!(s.count(ImageState::Pending), 5);

    let summary = s.detect_all(true);
    assert_eq!((summary.detected, summary.rejected, summary.skipped), (4, 1, 0));
    assert_eq!(s.ids_in_state(ImageState::Rejected), vec![ImageId(2)]);

    let result = s.calibrate().expect("calibration");
    assert!(matches!(result, SessionCalibration::Mono(_)));
    assert_eq!(result.view_count(), 4);
    assert!(result.rms_error() < 1e-3, "rms {}", result.rms_error());

    for (i, record) in s.records().iter().enumerate() {
        if i == 2 {
            assert_eq!(record.state, ImageState::Rejected);
            assert!(record.pose.is_none());
            assert!(record.detected_corners.is_none());
        } else {
            assert_eq!(record.state, ImageState::Calibrated);
            assert!(record.pose.is_some());
            assert!(record.reprojection_error.is_some_and(|e| e < 1e-2));
            assert_eq!(record.image_size, Some(IMAGE_SHAPE));
        }
    }
    assert_eq!(s.last_calibration(), Some(&result));
}

#[test]
fn calibrated_pose_matches_the_projection_pose() {
    let (table, paths) = mono_table(6, &[]);
    let mut s = session(table);
    s.register_images(paths);
    s.detect_all(false);
    s.calibrate().expect("calibration");

    let truth = view_poses(&board(), 6);
    for (record, gt) in s.records().iter().zip(&truth) {
        let pose = record.pose.expect("pose");
        assert!((pose.translation - gt.translation).norm() < 1e-2);
    }
}

#[test]
fn nothing_detected_cannot_calibrate() {
    let (table, paths) = mono_table(3, &[0, 1, 2]);
    let mut s = session(table);
    s.register_images(paths);
    let summary = s.detect_all(true);
    assert_eq!(summary.rejected, 3);
    assert!(matches!(s.calibrate(), Err(CalibErr::NoCorners)));
    assert!(s.last_calibration().is_none());
}

#[test]
fn plain_functions_work_as_detectors() {
    let mut s = CalibrationSession::new(board(), Box::new(never_found));
    s.register_images(["a.png", "b.png"]);
    s.detect_all(true);
    assert_eq!(s.count(ImageState::Rejected), 2);
}

#[test]
fn unreadable_image_is_rejected_without_aborting() {
    let (table, mut paths) = mono_table(6, &[]);
    paths.insert(3, PathBuf::from("/captures/left/missing.png"));
    let mut s = session(table);
    s.register_images(paths);

    let summary = s.detect_all(true);
    assert_eq!((summary.detected, summary.rejected), (6, 1));
    assert_eq!(s.record(ImageId(3)).map(|r| r.state), Some(ImageState::Rejected));
    assert!(s.calibrate().is_ok());
}

#[test]
fn second_detection_pass_only_touches_pending_records() {
    let (table, paths) = mono_table(6, &[4]);
    let mut s = session(table);
    s.register_images(paths.clone());
    s.detect_all(true);
    let before = s.records().to_vec();

    let again = s.detect_all(true);
    assert_eq!((again.detected, again.rejected, again.skipped), (0, 0, 0));
    assert_eq!(s.records(), before.as_slice());

    // Registering resets every record but keeps ids for known paths.
    let ids = s.register_images([paths[1].clone(), PathBuf::from("/captures/left/new.png")]);
    assert_eq!(ids, vec![ImageId(1), ImageId(6)]);
    assert_eq!(s.count(ImageState::Pending), 7);
    assert!(s.records().iter().all(|r| r.detected_corners.is_none()));
}

#[test]
fn raised_stop_flag_leaves_records_pending() {
    let (table, paths) = mono_table(5, &[]);
    let mut s = session(table);
    s.register_images(paths);

    let stop = AtomicBool::new(true);
    let summary = s.detect_all_with_stop(true, &stop);
    assert_eq!((summary.detected, summary.skipped), (0, 5));
    assert_eq!(s.count(ImageState::Pending), 5);
}

#[test]
fn worst_image_is_rejected_and_calibration_improves() {
    let (mut table, paths) = mono_table(8, &[]);
    // Shake one view so it no longer fits the common camera.
    let bad = paths[5].clone();
    let shaken: Vec<Point2<f64>> = table.views[&bad]
        .as_ref()
        .expect("corners")
        .iter()
        .enumerate()
        .map(|(k, p)| {
            let s = if k % 2 == 0 { 1.5 } else { -1.5 };
            Point2::new(p.x + s, p.y - s)
        })
        .collect();
    table.insert(bad, Some(shaken));

    let mut s = session(table);
    s.register_images(paths);
    s.detect_all(true);
    let first = s.calibrate().expect("calibration");
    assert_eq!(s.worst_image(), Some(ImageId(5)));

    let second = s.reject_and_recalibrate(ImageId(5)).expect("recalibration");
    assert_eq!(second.view_count(), 7);
    assert!(second.rms_error() < first.rms_error());
    let rejected = s.record(ImageId(5)).expect("record");
    assert_eq!(rejected.state, ImageState::Rejected);
    assert!(rejected.pose.is_none() && rejected.reprojection_error.is_none());
    assert_ne!(s.worst_image(), Some(ImageId(5)));
}

#[test]
fn failed_recalibration_drops_the_previous_result() {
    let (table, paths) = mono_table(4, &[]);
    let mut s = session(table);
    s.register_images(paths);
    s.detect_all(true);
    s.calibrate().expect("calibration");

    for id in 0..3 {
        assert!(s.exclude(ImageId(id)).unwrap());
    }
    assert!(s.last_calibration().is_some());

    // Rejecting the last usable image leaves nothing to calibrate from.
    assert!(matches!(s.reject_and_recalibrate(ImageId(3)), Err(CalibErr::NoCorners)));
    assert!(s.last_calibration().is_none());
    assert!(s.worst_image().is_none());
    assert!(s.records().iter().all(|r| r.pose.is_none() && r.reprojection_error.is_none()));
}

#[test]
fn unknown_ids_are_errors() {
    let (table, paths) = mono_table(6, &[]);
    let mut s = session(table);
    s.register_images(paths);
    s.detect_all(true);
    assert!(matches!(
        s.reject_and_recalibrate(ImageId(42)),
        Err(CalibErr::UnknownImage { id: 42 })
    ));
    assert!(matches!(s.exclude(ImageId(6)), Err(CalibErr::UnknownImage { id: 6 })));
}

#[test]
fn excluded_images_sit_out_the_next_calibration() {
    let (table, paths) = mono_table(7, &[6]);
    let mut s = session(table);
    s.register_images(paths);
    s.detect_all(true);
    s.calibrate().expect("calibration");

    assert!(s.exclude(ImageId(0)).unwrap());
    assert!(!s.exclude(ImageId(6)).unwrap());
    assert_eq!(s.record(ImageId(0)).map(|r| r.state), Some(ImageState::Excluded));

    let result = s.calibrate().expect("calibration");
    assert_eq!(result.view_count(), 5);
    assert!(s.record(ImageId(0)).is_some_and(|r| r.pose.is_none()));
}

#[test]
fn excluded_images_persist_as_rejected() {
    let (table, paths) = mono_table(5, &[]);
    let mut s = session(table);
    s.register_images(paths);
    s.detect_all(true);
    s.calibrate().expect("calibration");
    assert!(s.exclude(ImageId(3)).unwrap());

    let mut store = MemoryStore::new();
    s.persist(&mut store).expect("persist");
    let excluded = store.get("view_03.png").expect("row");
    assert!(excluded.isreject);
    assert_eq!(excluded.status, Some(ImageState::Excluded));
    assert!(!excluded.is_usable());
    assert!(excluded.cors.is_some() && excluded.rpje.is_none());
}

#[test]
fn changing_the_board_resets_records() {
    let (table, paths) = mono_table(6, &[]);
    let mut s = session(table);
    s.register_images(paths);
    s.detect_all(true);
    s.calibrate().expect("calibration");

    s.set_board(CalibrationBoard::with_size(6, 8, 25.0).expect("board"));
    assert_eq!(s.count(ImageState::Pending), 6);
    assert!(s.last_calibration().is_none());
    assert_eq!(s.board().rows(), 6);
}

#[test]
fn stereo_pairs_need_both_sides() {
    let board = board();
    let cam = camera();
    let rotation = Pose::from_rodrigues(&Vector3::new(0.0, -0.02, 0.0), Vector3::zeros()).rotation;
    let rig = Pose::new(rotation, -(rotation * Vector3::new(100.0, 0.0, 0.0)));

    let mut table = TableDetector::default();
    let mut pairs = Vec::new();
    for (i, pose) in view_poses(&board, 7).iter().enumerate() {
        let left = view_path(i);
        let right = PathBuf::from(format!("/captures/right/view_{i:02}.png"));
        table.insert(left.clone(), Some(project(&cam, pose, &board)));
        let right_corners = (i != 3).then(|| project(&cam, &rig.compose(pose), &board));
        table.insert(right.clone(), right_corners);
        pairs.push((left, right));
    }

    let mut s = session(table);
    s.register_stereo_pairs(pairs);
    assert!(s.is_stereo());
    let summary = s.detect_all(true);
    assert_eq!((summary.detected, summary.rejected), (6, 1));
    assert_eq!(s.record(ImageId(3)).map(|r| r.state), Some(ImageState::Rejected));

    let SessionCalibration::Stereo(result) = s.calibrate().expect("stereo calibration") else {
        panic!("expected a stereo result");
    };
    assert_eq!(result.left.per_view_poses.len(), 6);
    let dt = (result.relative_translation - rig.translation).norm();
    assert!(dt < 0.5, "baseline error {dt} mm");
    assert!(s
        .records()
        .iter()
        .filter(|r| r.state == ImageState::Calibrated)
        .all(|r| r.right_corners.is_some() && r.reprojection_error.is_some()));

    // Going back to single images drops the pairs.
    s.register_images([view_path(0)]);
    assert!(!s.is_stereo());
    assert_eq!(s.records().len(), 1);
}

#[test]
fn persist_writes_one_row_per_image() {
    let (table, paths) = mono_table(6, &[1]);
    let mut s = session(table);
    s.register_images(paths);
    s.detect_all(true);
    s.calibrate().expect("calibration");

    let mut store = MemoryStore::new();
    s.persist(&mut store).expect("persist");
    assert_eq!(store.len(), 6);

    let rejected = store.get("view_01.png").expect("row");
    assert!(rejected.isreject);
    assert!(rejected.rpje.is_none() && rejected.cors.is_none());

    let good = store.get("view_00.png").expect("row");
    assert!(!good.isreject);
    assert!(good.is_usable());
    assert_eq!(good.status, Some(ImageState::Calibrated));
    assert_eq!(good.rootpath, "/captures/left");
    assert_eq!(good.cors.as_ref().map(Vec::len), Some(108));
    let q = [good.qw, good.qx, good.qy, good.qz].map(|v| v.expect("quaternion"));
    let norm: f64 = q.iter().map(|v| v * v).sum::<f64>().sqrt();
    assert!((norm - 1.0).abs() < 1e-9);
}
