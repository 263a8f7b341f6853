//! Robot controller pose logs (gripper-to-base).
//!
//! Two text formats are understood:
//! - CSV with a header line and `q0,qx,qy,qz,tx,ty,tz` rows (quaternion `w`
//!   first, translation in millimetres);
//! - whitespace-separated `x y z rx ry rz` rows with a Rodrigues rotation,
//!   optionally in metres.
//!
//! Malformed rows are skipped with a warning. A file without a single valid row
//! is an error.

use crate::core::{pose::rodrigues, quaternion_to_rotation, CalibErr, Pose};
use nalgebra::Vector3;
use std::fs;
use std::path::Path;

/// Translation substituted when only the rotation of the sensor is trusted.
pub const ROTATION_ONLY_TRANSLATION: [f64; 3] = [1.0, 1.0, 1.0];

fn parse_row(line: &str, sep: impl Fn(char) -> bool, expected: usize) -> Option<Vec<f64>> {
    let vals: Vec<f64> = line
        .split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<f64>)
        .collect::<Result<_, _>>()
        .ok()?;
    (vals.len() == expected && vals.iter().all(|v| v.is_finite())).then_some(vals)
}

fn non_empty(poses: Vec<Pose>, source: &str) -> Result<Vec<Pose>, CalibErr> {
    if poses.is_empty() {
        log::warn!("{source}: no valid poses");
        return Err(CalibErr::TooFewSamples { needed: 1, got: 0 });
    }
    log::debug!("{source}: {} poses", poses.len());
    Ok(poses)
}

/// Parse quaternion CSV text. The first line is a header and always skipped.
pub fn parse_quaternion_csv(text: &str) -> Result<Vec<Pose>, CalibErr> {
    let mut poses = Vec::new();
    for (n, line) in text.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let parsed = parse_row(line, |c| c == ',', 7)
            .and_then(|v| quaternion_to_rotation([v[0], v[1], v[2], v[3]]).ok().map(|r| (r, v)));
        match parsed {
            Some((r, v)) => poses.push(Pose::new(r, Vector3::new(v[4], v[5], v[6]))),
            None => log::warn!("line {}: skipping malformed pose row {line:?}", n + 1),
        }
    }
    non_empty(poses, "quaternion csv")
}

/// Parse `x y z rx ry rz` text; `meters` scales the translation to millimetres.
pub fn parse_rodrigues_txt(text: &str, meters: bool) -> Result<Vec<Pose>, CalibErr> {
    let scale = if meters { 1000.0 } else { 1.0 };
    let mut poses = Vec::new();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_row(line, char::is_whitespace, 6) {
            Some(v) => poses.push(Pose::new(
                rodrigues(&Vector3::new(v[3], v[4], v[5])),
                Vector3::new(v[0], v[1], v[2]) * scale,
            )),
            None => log::warn!("line {}: skipping malformed pose row {line:?}", n + 1),
        }
    }
    non_empty(poses, "rodrigues txt")
}

pub fn load_quaternion_csv(path: &Path) -> Result<Vec<Pose>, CalibErr> {
    parse_quaternion_csv(&fs::read_to_string(path)?)
}

pub fn load_rodrigues_txt(path: &Path, meters: bool) -> Result<Vec<Pose>, CalibErr> {
    parse_rodrigues_txt(&fs::read_to_string(path)?, meters)
}

/// Pick the loader from the extension: `.csv` is quaternion CSV, anything else
/// Rodrigues txt.
pub fn load_robot_poses(path: &Path, meters: bool) -> Result<Vec<Pose>, CalibErr> {
    let is_csv = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if is_csv {
        load_quaternion_csv(path)
    } else {
        load_rodrigues_txt(path, meters)
    }
}

/// Replace every translation with [`ROTATION_ONLY_TRANSLATION`].
pub fn sensor_only_rotation(poses: &mut [Pose]) {
    let t = Vector3::from(ROTATION_ONLY_TRANSLATION);
    poses.iter_mut().for_each(|p| p.translation = t);
}
