//! The rig calibration facade.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use log::{info, warn};
use rigcal_core::{CameraId, FrameId, Iso3, LocalizationResult, RigCalibError};
use serde::{Deserialize, Serialize};

use crate::config::RigCalibrationConfig;
use crate::export::{ExportSink, RigCalibrationExport};
use crate::state::{CalibrationStage, CalibrationState, CameraStatus, TrajectoryEntry};
use crate::steps::{
    reprojection_residuals, step_initialize, step_optimize, InitializationReport,
    RefinementReport, ViewResiduals,
};
use crate::store::TrackingResultStore;
use crate::types::{LogEntry, Operation, SessionMetadata, SCHEMA_VERSION};

/// Calibration session of one multi-camera rig.
///
/// Collects per-camera localization tracks, then runs the two stages:
///
/// ```no_run
/// use rigcal_pipeline::RigCalibration;
/// # fn main() -> Result<(), rigcal_core::RigCalibError> {
/// # let (track0, track1) = (Vec::new(), Vec::new());
/// let mut rig = RigCalibration::new();
/// rig.set_tracking_result(track0, 0)?;
/// rig.set_tracking_result(track1, 1)?;
///
/// let init = rig.initialize_calibration()?;
/// let refined = rig.optimize_calibration()?;
/// if let Some(warning) = refined.warning() {
///     eprintln!("kept initial calibration: {warning}");
/// }
/// let extrinsic = rig.extrinsic(1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigCalibration {
    pub metadata: SessionMetadata,
    config: RigCalibrationConfig,
    store: TrackingResultStore,
    state: CalibrationState,
    init_report: Option<InitializationReport>,
    log: Vec<LogEntry>,
}

impl Default for RigCalibration {
    fn default() -> Self {
        Self::new()
    }
}

impl RigCalibration {
    // ─────────────────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────────────────

    pub fn new() -> Self {
        let config = RigCalibrationConfig::default();
        Self {
            metadata: SessionMetadata::new(config.reference_camera),
            state: CalibrationState::new(config.reference_camera),
            config,
            store: TrackingResultStore::new(),
            init_report: None,
            log: Vec::new(),
        }
    }

    pub fn with_config(config: RigCalibrationConfig) -> Result<Self, RigCalibError> {
        let mut rig = Self::new();
        rig.set_config(config)?;
        Ok(rig)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────────────────

    pub fn config(&self) -> &RigCalibrationConfig {
        &self.config
    }

    /// Replace the configuration; it applies to the next stage run.
    ///
    /// The reference camera can only change before initialization (or after
    /// [`reset_calibration`](Self::reset_calibration)).
    pub fn set_config(&mut self, config: RigCalibrationConfig) -> Result<(), RigCalibError> {
        config.validate()?;
        if self.state.stage != CalibrationStage::Uninitialized
            && config.reference_camera != self.state.reference_camera
        {
            return Err(RigCalibError::InvalidInput(format!(
                "reference camera is {} for the current calibration; reset before changing it",
                self.state.reference_camera
            )));
        }
        if self.state.stage == CalibrationStage::Uninitialized {
            self.state.reference_camera = config.reference_camera;
        }
        self.config = config;
        self.sync_metadata();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Input
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a camera's whole track; result `i` belongs to frame `i`.
    pub fn set_tracking_result(
        &mut self,
        results: Vec<LocalizationResult>,
        camera: CameraId,
    ) -> Result<(), RigCalibError> {
        let n = results.len();
        self.store.append_track(camera, results)?;
        self.sync_metadata();
        self.log.push(LogEntry::ok(
            Operation::SetTrackingResult,
            format!("camera {}: {} frames", camera, n),
        ));
        Ok(())
    }

    pub fn add_localization_result(
        &mut self,
        camera: CameraId,
        frame: FrameId,
        result: LocalizationResult,
    ) -> Result<(), RigCalibError> {
        self.store.append(camera, frame, result)?;
        self.sync_metadata();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stages
    // ─────────────────────────────────────────────────────────────────────────

    /// Estimate extrinsics from localizer poses and seed the trajectory.
    ///
    /// Idempotent: once initialized, returns the stored report without
    /// recomputing, even if tracks were appended since.
    pub fn initialize_calibration(&mut self) -> Result<InitializationReport, RigCalibError> {
        if self.state.stage != CalibrationStage::Uninitialized {
            if let Some(report) = &self.init_report {
                if report.store_revision != self.store.revision() {
                    warn!(
                        "tracks were added after initialization; call reset_calibration to include them"
                    );
                }
                return Ok(report.clone());
            }
        }

        match step_initialize(&self.store, &self.config, &mut self.state) {
            Ok(report) => {
                self.log.push(LogEntry::ok(
                    Operation::Initialize,
                    format!(
                        "initialized cameras {:?}, failed {:?}, {} rig frames",
                        report.initialized_cameras(),
                        report.failed_cameras(),
                        report.rig_frames
                    ),
                ));
                self.init_report = Some(report.clone());
                self.sync_metadata();
                Ok(report)
            }
            Err(e) => {
                self.log.push(LogEntry::failed(Operation::Initialize, &e));
                Err(e)
            }
        }
    }

    /// Jointly refine extrinsics and trajectory.
    ///
    /// A rejected refinement is not an error: the report carries an
    /// [`RigCalibError::OptimizationDivergence`] warning and the previous
    /// calibration is kept.
    pub fn optimize_calibration(&mut self) -> Result<RefinementReport, RigCalibError> {
        match step_optimize(&self.store, &self.config, &mut self.state) {
            Ok(report) => {
                let entry = match report.warning() {
                    Some(w) => LogEntry::failed(Operation::Optimize, w),
                    None => LogEntry::ok(
                        Operation::Optimize,
                        format!(
                            "{:?} after {} iterations, median {:.4} px",
                            report.summary.report.termination,
                            report.summary.report.iterations,
                            report.summary.after.map_or(0.0, |s| s.median)
                        ),
                    ),
                };
                self.log.push(entry);
                self.sync_metadata();
                Ok(report)
            }
            Err(e) => {
                self.log.push(LogEntry::failed(Operation::Optimize, &e));
                Err(e)
            }
        }
    }

    /// Discard the calibration state; tracks are kept.
    pub fn reset_calibration(&mut self) {
        self.state = CalibrationState::new(self.config.reference_camera);
        self.init_report = None;
        self.sync_metadata();
        self.log.push(LogEntry::bare(Operation::Reset));
        info!("calibration state reset");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read Access
    // ─────────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    pub fn store(&self) -> &TrackingResultStore {
        &self.store
    }

    pub fn stage(&self) -> CalibrationStage {
        self.state.stage
    }

    /// `Uninitialized` for cameras the calibration has not seen.
    pub fn camera_status(&self, camera: CameraId) -> CameraStatus {
        self.state
            .camera(camera)
            .map_or(CameraStatus::Uninitialized, |c| c.status)
    }

    /// Extrinsic `cam_se3_rig` of a calibrated camera.
    pub fn extrinsic(&self, camera: CameraId) -> Option<Iso3> {
        self.state
            .camera(camera)
            .filter(|c| c.status.is_calibrated())
            .and_then(|c| c.cam_se3_rig)
    }

    pub fn extrinsics(&self) -> BTreeMap<CameraId, Iso3> {
        self.state
            .calibrated_cameras()
            .into_iter()
            .filter_map(|c| self.state.extrinsic(c).map(|e| (c, e)))
            .collect()
    }

    pub fn trajectory(&self) -> &BTreeMap<FrameId, TrajectoryEntry> {
        &self.state.trajectory
    }

    pub fn initialization_report(&self) -> Option<&InitializationReport> {
        self.init_report.as_ref()
    }

    /// Per-view reprojection errors under the current calibration.
    pub fn reprojection_residuals(&self) -> Vec<ViewResiduals> {
        reprojection_residuals(&self.store, &self.state)
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    fn sync_metadata(&mut self) {
        self.metadata.sync(&self.store, self.state.reference_camera);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Export & Checkpoints
    // ─────────────────────────────────────────────────────────────────────────

    pub fn export(&self) -> RigCalibrationExport {
        RigCalibrationExport::new(&self.store, &self.state)
    }

    pub fn export_to(&mut self, sink: &mut dyn ExportSink) -> Result<()> {
        let export = self.export();
        match sink.consume(&export) {
            Ok(()) => {
                self.log.push(LogEntry::bare(Operation::Export));
                Ok(())
            }
            Err(e) => {
                self.log.push(LogEntry::failed(Operation::Export, format!("{:#}", e)));
                Err(e)
            }
        }
    }

    /// Serialize the whole session (config, tracks, state, log).
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize calibration session")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let rig: Self =
            serde_json::from_str(json).context("failed to parse calibration session")?;
        if rig.metadata.schema_version != SCHEMA_VERSION {
            bail!(
                "unsupported session schema version {} (expected {})",
                rig.metadata.schema_version,
                SCHEMA_VERSION
            );
        }
        Ok(rig)
    }
}
