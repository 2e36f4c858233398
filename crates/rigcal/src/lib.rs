//! High-level entry crate for `rigcal`.
//!
//! `rigcal` calibrates the extrinsics of a rigid multi-camera rig from
//! independent per-camera localization tracks against a shared map. Every
//! camera runs its own localizer; the calibration only consumes the reported
//! poses and inlier correspondences.
//!
//! ## Facade
//!
//! ```no_run
//! use rigcal::prelude::*;
//!
//! # fn main() -> Result<(), RigCalibError> {
//! # let tracks: Vec<Vec<LocalizationResult>> = Vec::new();
//! let mut rig = RigCalibration::new();
//! for (camera, track) in tracks.into_iter().enumerate() {
//!     rig.set_tracking_result(track, camera)?;
//! }
//!
//! // Robust relative poses against the reference camera
//! let init = rig.initialize_calibration()?;
//! for camera in init.failed_cameras() {
//!     println!("camera {camera} could not be calibrated");
//! }
//!
//! // Joint refinement of extrinsics and rig trajectory
//! let refined = rig.optimize_calibration()?;
//! if let Some(warning) = refined.warning() {
//!     println!("kept initial calibration: {warning}");
//! }
//! for (camera, cam_se3_rig) in rig.extrinsics() {
//!     println!("camera {camera}: {}", cam_se3_rig);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - **[`pipeline`]**: the [`RigCalibration`](pipeline::RigCalibration) facade,
//!   state, step functions and export sinks
//! - **[`core`]**: math types, camera models, localization records, errors
//! - **[`linear`]**: rotation averaging and relative pose initialization
//! - **[`optim`]**: joint non-linear refinement and solver backends
//! - **[`prelude`]**: convenient re-exports for common use cases
//!
//! ## Stability
//!
//! The `rigcal` crate is the public compatibility boundary. Lower-level crates
//! are intended for advanced usage and may evolve more quickly.

/// Calibration facade, state machine, step functions and exports.
pub mod pipeline {
    pub use rigcal_pipeline::*;
}

/// Core math types, camera models and localization records.
pub mod core {
    pub use rigcal_core::*;
}

/// Robust initialization from localizer poses.
pub mod linear {
    pub use rigcal_linear::*;
}

/// Non-linear least-squares refinement problems and backends.
pub mod optim {
    pub use rigcal_optim::*;
}

/// Convenient re-exports for common use cases.
///
/// Import with `use rigcal::prelude::*;` to get started quickly.
pub mod prelude {
    // Common types
    pub use crate::core::{
        make_pinhole_camera, pose_error, BrownConrady5, CameraId, Correspondence, FrameId,
        FxFyCxCySkew, Iso3, LocalizationResult, PinholeCamera, Pt2, Pt3, Real, RigCalibError,
    };

    // Facade and results
    pub use crate::pipeline::{
        CalibrationStage, CameraStatus, ExportSink, InitializationReport, JsonFileSink,
        MemorySink, PoseSource, RefinementReport, RigCalibration, RigCalibrationConfig,
        RigCalibrationExport, TrajectoryEntry,
    };

    // Common options
    pub use crate::optim::{RefineBackend, RobustKernel};
}
