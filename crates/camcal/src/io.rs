//! JSON files exchanged with other calibration tools.
//!
//! Camera parameter files carry a `Scheme` tag. Only `"opencv"` stores
//! `IntrinsicMatrix` (and `RotationOfCamera2`) row-major as used here; any
//! other or missing scheme is treated as the column-major MATLAB layout and
//! transposed on load. Writers always emit `"opencv"`.

use crate::core::{CalibErr, CameraModel, Distortion, Intrinsics, Pose};
use crate::solve::{CalibrationResult, HandEyeResult, StereoResult};
use nalgebra::{Matrix3, Matrix4, Vector3};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

pub const OPENCV_SCHEME: &str = "opencv";
pub const HAND_EYE_SCHEME: &str = "opencv_AXXB";

/// Read any serde type from a JSON file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, CalibErr> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn read_value(path: &Path) -> Result<Value, CalibErr> {
    load_json(path)
}

fn write_value(path: &Path, value: &Value) -> Result<(), CalibErr> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    fs::write(path, text)?;
    Ok(())
}

/// One camera loaded from a parameter file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraParameters {
    pub camera: CameraModel,
    /// `(width, height)` when the file has `ImageShape`.
    pub image_shape: Option<(u32, u32)>,
}

/// A stereo rig loaded from a parameter file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StereoParameters {
    pub left: CameraModel,
    pub right: CameraModel,
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub image_shape: Option<(u32, u32)>,
}

impl StereoParameters {
    /// Left-camera to right-camera pose.
    pub fn relative_pose(&self) -> Pose {
        Pose::new(self.rotation, self.translation)
    }
}

fn get<'a>(v: &'a Value, key: &str, path: &str) -> Result<&'a Value, CalibErr> {
    v.get(key).ok_or_else(|| CalibErr::field(path))
}

fn numbers(v: &Value, path: &str) -> Result<Vec<f64>, CalibErr> {
    v.as_array()
        .ok_or_else(|| CalibErr::field(path))?
        .iter()
        .map(|x| x.as_f64().filter(|f| f.is_finite()).ok_or_else(|| CalibErr::field(path)))
        .collect()
}

fn matrix3(v: &Value, path: &str, transpose: bool) -> Result<Matrix3<f64>, CalibErr> {
    let rows = v.as_array().ok_or_else(|| CalibErr::field(path))?;
    if rows.len() != 3 {
        return Err(CalibErr::field(path));
    }
    let mut m = Matrix3::zeros();
    for (r, row) in rows.iter().enumerate() {
        let vals = numbers(row, path)?;
        if vals.len() != 3 {
            return Err(CalibErr::field(path));
        }
        for (c, x) in vals.into_iter().enumerate() {
            m[(r, c)] = x;
        }
    }
    Ok(if transpose { m.transpose() } else { m })
}

fn is_opencv(doc: &Value) -> bool {
    doc.get("Scheme")
        .and_then(Value::as_str)
        .is_some_and(|s| s.eq_ignore_ascii_case(OPENCV_SCHEME))
}

fn image_shape(doc: &Value) -> Result<Option<(u32, u32)>, CalibErr> {
    let Some(shape) = doc.get("ImageShape") else {
        return Ok(None);
    };
    let vals = numbers(shape, "ImageShape")?;
    match vals[..] {
        [w, h] if w >= 1.0 && h >= 1.0 && w.fract() == 0.0 && h.fract() == 0.0 => {
            Ok(Some((w as u32, h as u32)))
        }
        _ => Err(CalibErr::field("ImageShape")),
    }
}

fn parse_camera(section: &Value, name: &str, transpose: bool) -> Result<CameraModel, CalibErr> {
    let k_path = format!("{name}.IntrinsicMatrix");
    let k = matrix3(get(section, "IntrinsicMatrix", &k_path)?, &k_path, transpose)?;
    let bottom_ok = k[(2, 0)].abs() < 1e-9 && k[(2, 1)].abs() < 1e-9 && (k[(2, 2)] - 1.0).abs() < 1e-9;
    if !bottom_ok || k[(0, 0)] <= 0.0 || k[(1, 1)] <= 0.0 {
        return Err(CalibErr::field(k_path));
    }

    let r_path = format!("{name}.RadialDistortion");
    let radial = numbers(get(section, "RadialDistortion", &r_path)?, &r_path)?;
    let (k1, k2, k3) = match radial[..] {
        [k1, k2, .., k3] if radial.len() >= 3 => (k1, k2, k3),
        _ => return Err(CalibErr::field(r_path)),
    };

    let t_path = format!("{name}.TangentialDistortion");
    let tangential = numbers(get(section, "TangentialDistortion", &t_path)?, &t_path)?;
    let [p1, p2] = tangential[..] else {
        return Err(CalibErr::field(t_path));
    };

    Ok(CameraModel::new(
        Intrinsics::from_matrix(&k),
        Distortion {
            k1,
            k2,
            p1,
            p2,
            k3,
        },
    ))
}

/// Parse a mono file (`CameraParameters`), or the left camera of a stereo
/// file (`CameraParameters1`).
pub fn parse_camera_parameters(doc: &Value) -> Result<CameraParameters, CalibErr> {
    let transpose = !is_opencv(doc);
    let name = if doc.get("CameraParameters").is_some() {
        "CameraParameters"
    } else {
        "CameraParameters1"
    };
    let section = get(doc, name, name)?;
    Ok(CameraParameters {
        camera: parse_camera(section, name, transpose)?,
        image_shape: image_shape(doc)?,
    })
}

pub fn parse_stereo_parameters(doc: &Value) -> Result<StereoParameters, CalibErr> {
    let transpose = !is_opencv(doc);
    let left = parse_camera(get(doc, "CameraParameters1", "CameraParameters1")?, "CameraParameters1", transpose)?;
    let right = parse_camera(get(doc, "CameraParameters2", "CameraParameters2")?, "CameraParameters2", transpose)?;
    let rotation = matrix3(
        get(doc, "RotationOfCamera2", "RotationOfCamera2")?,
        "RotationOfCamera2",
        transpose,
    )?;
    let t = numbers(
        get(doc, "TranslationOfCamera2", "TranslationOfCamera2")?,
        "TranslationOfCamera2",
    )?;
    let [tx, ty, tz] = t[..] else {
        return Err(CalibErr::field("TranslationOfCamera2"));
    };
    Ok(StereoParameters {
        left,
        right,
        rotation,
        translation: Vector3::new(tx, ty, tz),
        image_shape: image_shape(doc)?,
    })
}

pub fn read_camera_parameters(path: &Path) -> Result<CameraParameters, CalibErr> {
    parse_camera_parameters(&read_value(path)?)
}

pub fn read_stereo_parameters(path: &Path) -> Result<StereoParameters, CalibErr> {
    parse_stereo_parameters(&read_value(path)?)
}

fn rows(m: &Matrix3<f64>) -> Value {
    json!([
        [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
        [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
    ])
}

fn camera_section(camera: &CameraModel) -> Value {
    let d = camera.distortion;
    json!({
        "RadialDistortion": [d.k1, d.k2, d.k3],
        "TangentialDistortion": [d.p1, d.p2],
        "IntrinsicMatrix": rows(&camera.intrinsics.matrix()),
    })
}

/// Mono parameter document.
pub fn camera_parameters_json(result: &CalibrationResult, serial: &str) -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "SN": serial,
        "Scheme": OPENCV_SCHEME,
        "ImageShape": [result.image_shape.0, result.image_shape.1],
        "CameraParameters": camera_section(&result.camera),
        "ReprojectionError": result.rms_error,
    })
}

/// Stereo parameter document.
pub fn stereo_parameters_json(result: &StereoResult, serial: &str) -> Value {
    let t = result.relative_translation;
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "SN": serial,
        "Scheme": OPENCV_SCHEME,
        "ImageShape": [result.left.image_shape.0, result.left.image_shape.1],
        "CameraParameters1": camera_section(&result.left.camera),
        "CameraParameters2": camera_section(&result.right.camera),
        "RotationOfCamera2": rows(&result.relative_rotation),
        "TranslationOfCamera2": [t.x, t.y, t.z],
        "ReprojectionError": result.rms_error,
    })
}

pub fn write_camera_parameters(path: &Path, result: &CalibrationResult, serial: &str) -> Result<(), CalibErr> {
    write_value(path, &camera_parameters_json(result, serial))
}

pub fn write_stereo_parameters(path: &Path, result: &StereoResult, serial: &str) -> Result<(), CalibErr> {
    write_value(path, &stereo_parameters_json(result, serial))
}

/// Hand-eye document. With `meters` the translation column is divided by 1000;
/// the residuals stay in degrees and millimetres.
pub fn hand_eye_json(result: &HandEyeResult, serial: &str, meters: bool) -> Value {
    let mut m = result.camera_to_gripper.to_homogeneous();
    if meters {
        for r in 0..3 {
            m[(r, 3)] /= 1000.0;
        }
    }
    let matrix: Vec<Vec<f64>> = (0..4).map(|r| (0..4).map(|c| m[(r, c)]).collect()).collect();
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "SN": serial,
        "Scheme": HAND_EYE_SCHEME,
        "AXXB": {
            "Matrix": matrix,
            "rotation_err": result.rotation_error_deg,
            "translation_err": result.translation_error_mm,
        },
    })
}

pub fn write_hand_eye(path: &Path, result: &HandEyeResult, serial: &str, meters: bool) -> Result<(), CalibErr> {
    write_value(path, &hand_eye_json(result, serial, meters))
}

/// The 4x4 `AXXB.Matrix`, in whatever unit it was written.
pub fn parse_hand_eye(doc: &Value) -> Result<Matrix4<f64>, CalibErr> {
    let path = "AXXB.Matrix";
    let rows = get(get(doc, "AXXB", "AXXB")?, "Matrix", path)?
        .as_array()
        .ok_or_else(|| CalibErr::field(path))?;
    if rows.len() != 4 {
        return Err(CalibErr::field(path));
    }
    let mut m = Matrix4::zeros();
    for (r, row) in rows.iter().enumerate() {
        let vals = numbers(row, path)?;
        if vals.len() != 4 {
            return Err(CalibErr::field(path));
        }
        for (c, x) in vals.into_iter().enumerate() {
            m[(r, c)] = x;
        }
    }
    Ok(m)
}

pub fn read_hand_eye(path: &Path) -> Result<Matrix4<f64>, CalibErr> {
    parse_hand_eye(&read_value(path)?)
}
