//! Rig calibration pipeline.
//!
//! - [`store`]: append-only per-camera localization tracks.
//! - [`state`]: the calibration state machine (stage, per-camera status,
//!   extrinsics, trajectory).
//! - [`steps`]: `step_initialize` (robust relative poses) and `step_optimize`
//!   (joint refinement) operating on the state.
//! - [`RigCalibration`]: the facade tying store, config and state together,
//!   with logging, checkpoints and export.
//! - [`export`]: flattened export records and sinks.

pub mod config;
pub mod export;
mod rig;
pub mod state;
pub mod steps;
pub mod store;
pub mod types;

pub use config::RigCalibrationConfig;
pub use export::{
    CameraExport, ExportSink, FrameExport, JsonFileSink, LandmarkExport, MemorySink,
    RigCalibrationExport,
};
pub use rig::RigCalibration;
pub use state::{
    CalibrationStage, CalibrationState, CameraCalibration, CameraStatus, PoseSource,
    RefinementSummary, TrajectoryEntry,
};
pub use steps::{CameraInitOutcome, InitializationReport, RefinementReport, ViewResiduals};
pub use store::{CameraTrack, TrackingResultStore};
pub use types::{LogEntry, Operation, SessionMetadata};
