//! Session bookkeeping: what rig a checkpoint describes and what was done to it.

use std::time::SystemTime;

use rigcal_core::CameraId;
use serde::{Deserialize, Serialize};

use crate::store::TrackingResultStore;

/// Format version of serialized calibration sessions.
pub const SCHEMA_VERSION: u32 = 1;

/// Rig summary stored at the top of a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub schema_version: u32,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    pub last_modified: u64,
    pub reference_camera: CameraId,
    /// Cameras with at least one stored localization, ascending.
    pub cameras: Vec<CameraId>,
    /// Distinct frames across all tracks.
    pub frame_count: usize,
}

impl SessionMetadata {
    pub fn new(reference_camera: CameraId) -> Self {
        let now = unix_seconds();
        Self {
            schema_version: SCHEMA_VERSION,
            created_at: now,
            last_modified: now,
            reference_camera,
            cameras: Vec::new(),
            frame_count: 0,
        }
    }

    /// Refresh the rig summary from the store and bump `last_modified`.
    pub fn sync(&mut self, store: &TrackingResultStore, reference_camera: CameraId) {
        self.reference_camera = reference_camera;
        self.cameras = store.camera_indices();
        self.frame_count = store.frames().len();
        self.last_modified = unix_seconds().max(self.created_at);
    }
}

/// Session operations recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    SetTrackingResult,
    Initialize,
    Optimize,
    Reset,
    Export,
}

/// One line of the session audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: u64,
    pub operation: Operation,
    pub success: bool,
    /// Outcome summary, or the error of a failed operation.
    pub notes: Option<String>,
}

impl LogEntry {
    pub fn ok(operation: Operation, notes: impl Into<String>) -> Self {
        Self::record(operation, true, Some(notes.into()))
    }

    pub fn failed(operation: Operation, error: impl ToString) -> Self {
        Self::record(operation, false, Some(error.to_string()))
    }

    pub fn bare(operation: Operation) -> Self {
        Self::record(operation, true, None)
    }

    fn record(operation: Operation, success: bool, notes: Option<String>) -> Self {
        Self {
            timestamp: unix_seconds(),
            operation,
            success,
            notes,
        }
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
