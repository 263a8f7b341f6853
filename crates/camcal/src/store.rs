//! Per-image persistence keyed by file name.

use crate::core::CalibErr;
use crate::session::{ImageRecord, ImageState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Flat per-image row as other tools expect it.
///
/// The pose is board-to-camera with the quaternion `w` first; `rpje` is the
/// per-image RMS reprojection error and `cors` the detected corners.
/// `isreject` is set for rejected and excluded images alike; `status` keeps
/// the exact session state when it is known.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub rootpath: String,
    pub filename: String,
    pub isreject: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ImageState>,
    pub qw: Option<f64>,
    pub qx: Option<f64>,
    pub qy: Option<f64>,
    pub qz: Option<f64>,
    pub tx: Option<f64>,
    pub ty: Option<f64>,
    pub tz: Option<f64>,
    pub rpje: Option<f64>,
    pub cors: Option<Vec<[f64; 2]>>,
}

impl StoredRecord {
    pub fn from_record(record: &ImageRecord) -> Self {
        let rootpath = record
            .path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let filename = record
            .path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| record.path.to_string_lossy().into_owned());
        let q = record.pose.map(|p| p.quaternion());
        let t = record.pose.map(|p| p.translation);

        Self {
            rootpath,
            filename,
            isreject: matches!(record.state, ImageState::Rejected | ImageState::Excluded),
            status: Some(record.state),
            qw: q.map(|q| q[0]),
            qx: q.map(|q| q[1]),
            qy: q.map(|q| q[2]),
            qz: q.map(|q| q[3]),
            tx: t.map(|t| t.x),
            ty: t.map(|t| t.y),
            tz: t.map(|t| t.z),
            rpje: record.reprojection_error,
            cors: record
                .detected_corners
                .as_ref()
                .map(|c| c.iter().map(|p| [p.x, p.y]).collect()),
        }
    }

    /// Whether the row may feed a calibration when reloaded.
    pub fn is_usable(&self) -> bool {
        !self.isreject && self.status.is_none_or(ImageState::is_usable)
    }

    pub fn path(&self) -> PathBuf {
        Path::new(&self.rootpath).join(&self.filename)
    }
}

/// Get/set storage of [`StoredRecord`]s keyed by `filename`.
pub trait RecordStore {
    fn get(&self, filename: &str) -> Option<StoredRecord>;
    /// Insert or replace the record with the same `filename`.
    fn set(&mut self, record: StoredRecord) -> Result<(), CalibErr>;
    fn remove(&mut self, filename: &str) -> Result<Option<StoredRecord>, CalibErr>;
    /// All file names in ascending order.
    fn filenames(&self) -> Vec<String>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, StoredRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, filename: &str) -> Option<StoredRecord> {
        self.records.get(filename).cloned()
    }

    fn set(&mut self, record: StoredRecord) -> Result<(), CalibErr> {
        self.records.insert(record.filename.clone(), record);
        Ok(())
    }

    fn remove(&mut self, filename: &str) -> Result<Option<StoredRecord>, CalibErr> {
        Ok(self.records.remove(filename))
    }

    fn filenames(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }
}

/// Store backed by one pretty-printed JSON array, rewritten on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Start an empty store at `path`, replacing any existing file.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, CalibErr> {
        let store = Self {
            path: path.into(),
            inner: MemoryStore::new(),
        };
        store.flush()?;
        Ok(store)
    }

    /// Load `path` if it exists, otherwise start empty without touching disk.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CalibErr> {
        let path = path.into();
        let mut inner = MemoryStore::new();
        if path.exists() {
            let records: Vec<StoredRecord> = crate::io::load_json(&path)?;
            log::debug!("{}: loaded {} records", path.display(), records.len());
            for r in records {
                inner.records.insert(r.filename.clone(), r);
            }
        }
        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), CalibErr> {
        let records: Vec<&StoredRecord> = self.inner.records.values().collect();
        fs::write(&self.path, serde_json::to_string_pretty(&records)?)?;
        Ok(())
    }
}

impl RecordStore for JsonFileStore {
    fn get(&self, filename: &str) -> Option<StoredRecord> {
        self.inner.get(filename)
    }

    fn set(&mut self, record: StoredRecord) -> Result<(), CalibErr> {
        self.inner.set(record)?;
        self.flush()
    }

    fn remove(&mut self, filename: &str) -> Result<Option<StoredRecord>, CalibErr> {
        let removed = self.inner.remove(filename)?;
        if removed.is_some() {
            self.flush()?;
        }
        Ok(removed)
    }

    fn filenames(&self) -> Vec<String> {
        self.inner.filenames()
    }
}
