//! Step functions of the two calibration stages.
//!
//! Both take the store read-only and mutate the [`CalibrationState`] in place.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use rayon::prelude::*;
use rigcal_core::{CameraId, FrameId, Iso3, Pt2, Pt3, Real, RigCalibError};
use rigcal_linear::{
    estimate_cam_se3_rig, seed_world_se3_rig, RelativePoseError, RelativePoseEstimate,
};
use rigcal_optim::{
    optimize_rig_extrinsics, RefineError, ResidualStats, RigRefineDataset, RigRefineParams,
    RigRefineProblem, RigViewObservations,
};
use serde::{Deserialize, Serialize};

use crate::config::RigCalibrationConfig;
use crate::state::{
    CalibrationStage, CalibrationState, CameraCalibration, CameraStatus, PoseSource,
    RefinementSummary, TrajectoryEntry,
};
use crate::store::TrackingResultStore;

// ─────────────────────────────────────────────────────────────────────────────
// Reports
// ─────────────────────────────────────────────────────────────────────────────

/// Initialization outcome of one camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInitOutcome {
    pub camera: CameraId,
    pub status: CameraStatus,
    pub estimate: Option<RelativePoseEstimate>,
    pub failure: Option<RigCalibError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializationReport {
    pub reference_camera: CameraId,
    /// One entry per camera in the store, ascending.
    pub cameras: Vec<CameraInitOutcome>,
    /// Frames with a calibrated rig pose.
    pub rig_frames: usize,
    /// Frames localized only by failed cameras.
    pub uncalibrated_frames: usize,
    /// Store revision the initialization was computed from.
    pub store_revision: u64,
}

impl InitializationReport {
    pub fn initialized_cameras(&self) -> Vec<CameraId> {
        self.cameras
            .iter()
            .filter(|c| c.status.is_calibrated())
            .map(|c| c.camera)
            .collect()
    }

    pub fn failed_cameras(&self) -> Vec<CameraId> {
        self.cameras
            .iter()
            .filter(|c| c.status == CameraStatus::Failed)
            .map(|c| c.camera)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementReport {
    pub summary: RefinementSummary,
    /// Cameras whose correspondences took part in an accepted refinement;
    /// the reference is listed although its extrinsic stays identity.
    pub refined_cameras: Vec<CameraId>,
}

impl RefinementReport {
    pub fn accepted(&self) -> bool {
        self.summary.accepted
    }

    /// Set when the refinement was rejected and the previous state kept.
    pub fn warning(&self) -> Option<&RigCalibError> {
        self.summary.warning.as_ref()
    }
}

/// Reprojection errors of one camera at one frame under the current calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewResiduals {
    pub camera: CameraId,
    pub frame: FrameId,
    /// Pixel error per correspondence, in storage order.
    pub errors: Vec<Real>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

fn estimate_camera(
    camera: CameraId,
    reference: &BTreeMap<FrameId, Iso3>,
    store: &TrackingResultStore,
    config: &RigCalibrationConfig,
) -> Result<CameraInitOutcome, RigCalibError> {
    let poses = store
        .get(camera)
        .map(|t| t.valid_poses())
        .unwrap_or_default();
    match estimate_cam_se3_rig(reference, &poses, &config.relative_pose_options()) {
        Ok(estimate) => {
            debug!(
                "camera {}: {} / {} samples kept, spread {:.3} deg / {:.4}",
                camera,
                estimate.inliers,
                estimate.candidates,
                estimate.rotation_spread_deg,
                estimate.translation_spread
            );
            Ok(CameraInitOutcome {
                camera,
                status: CameraStatus::Initialized,
                estimate: Some(estimate),
                failure: None,
            })
        }
        Err(RelativePoseError::InsufficientOverlap { found, required }) => {
            let failure = RigCalibError::InsufficientOverlap {
                camera,
                found,
                required,
            };
            warn!("{}", failure);
            Ok(CameraInitOutcome {
                camera,
                status: CameraStatus::Failed,
                estimate: None,
                failure: Some(failure),
            })
        }
        Err(RelativePoseError::InvalidOptions(msg)) => Err(RigCalibError::InvalidInput(msg)),
    }
}

/// Rig pose of one frame from the best available localization.
///
/// Preference: the reference camera, then calibrated cameras in ascending
/// order, then any other localized camera (recorded as uncalibrated).
fn seed_frame(
    frame: FrameId,
    store: &TrackingResultStore,
    state: &CalibrationState,
) -> Option<TrajectoryEntry> {
    let valid_pose = |camera: CameraId| {
        store
            .get(camera)
            .and_then(|t| t.get(frame))
            .filter(|r| r.is_valid())
            .map(|r| r.cam_se3_world)
    };

    if let Some(pose) = valid_pose(state.reference_camera) {
        return Some(TrajectoryEntry::Rig {
            world_se3_rig: seed_world_se3_rig(&pose, &Iso3::identity()),
            source: PoseSource::Reference,
        });
    }
    for camera in state.calibrated_cameras() {
        if let (Some(pose), Some(cam_se3_rig)) = (valid_pose(camera), state.extrinsic(camera)) {
            return Some(TrajectoryEntry::Rig {
                world_se3_rig: seed_world_se3_rig(&pose, &cam_se3_rig),
                source: PoseSource::Camera(camera),
            });
        }
    }
    store.camera_indices().into_iter().find_map(|camera| {
        valid_pose(camera).map(|pose| TrajectoryEntry::Uncalibrated {
            camera,
            world_se3_cam: pose.inverse(),
        })
    })
}

/// Re-derive a held frame seeded from a non-reference camera, so that it
/// follows that camera's refined extrinsic.
fn reseed_held_frame(
    frame: FrameId,
    store: &TrackingResultStore,
    state: &CalibrationState,
) -> Option<TrajectoryEntry> {
    let TrajectoryEntry::Rig {
        source: PoseSource::Camera(camera),
        ..
    } = state.trajectory.get(&frame)?
    else {
        return None;
    };
    let cam_se3_world = store
        .get(*camera)?
        .get(frame)
        .filter(|r| r.is_valid())?
        .cam_se3_world;
    let cam_se3_rig = state.extrinsic(*camera)?;
    Some(TrajectoryEntry::Rig {
        world_se3_rig: seed_world_se3_rig(&cam_se3_world, &cam_se3_rig),
        source: PoseSource::Camera(*camera),
    })
}

/// Dense refinement problem over calibrated cameras and rig frames.
struct RefineInputs {
    cameras: Vec<CameraId>,
    frames: Vec<FrameId>,
    problem: RigRefineProblem,
    init: RigRefineParams,
}

fn build_refine_inputs(
    store: &TrackingResultStore,
    state: &CalibrationState,
    config: &RigCalibrationConfig,
) -> Result<RefineInputs, RigCalibError> {
    let cameras = state.calibrated_cameras();
    let rig_poses = state.rig_poses();
    let frames: Vec<FrameId> = rig_poses.keys().copied().collect();

    let mut views = Vec::new();
    for (cam_idx, &camera) in cameras.iter().enumerate() {
        let Some(track) = store.get(camera) else {
            continue;
        };
        for (frame_idx, frame) in frames.iter().enumerate() {
            let Some(result) = track.get(*frame).filter(|r| r.is_valid()) else {
                continue;
            };
            if result.correspondences.is_empty() {
                continue;
            }
            let (points_3d, points_2d): (Vec<Pt3>, Vec<Pt2>) = result
                .correspondences
                .iter()
                .map(|c| (c.point_3d, c.point_2d))
                .unzip();
            views.push(
                RigViewObservations::new(
                    cam_idx,
                    frame_idx,
                    result.camera.clone(),
                    points_3d,
                    points_2d,
                )
                .map_err(|e| RigCalibError::InvalidInput(e.to_string()))?,
            );
        }
    }

    let dataset = RigRefineDataset::new(cameras.len(), frames.len(), views)
        .map_err(|e| RigCalibError::InvalidInput(e.to_string()))?;
    let fixed: Vec<usize> = cameras
        .iter()
        .position(|&c| c == state.reference_camera)
        .into_iter()
        .collect();
    let problem = RigRefineProblem::new(dataset, &fixed, &config.refine_options())
        .map_err(|e| RigCalibError::InvalidInput(e.to_string()))?;

    let init = RigRefineParams {
        cam_se3_rig: cameras
            .iter()
            .map(|&c| state.extrinsic(c).unwrap_or_else(Iso3::identity))
            .collect(),
        rig_se3_world: rig_poses.values().map(|p| p.inverse()).collect(),
    };

    Ok(RefineInputs {
        cameras,
        frames,
        problem,
        init,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Step Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Estimate every extrinsic from localizer poses and seed the rig trajectory.
///
/// Replaces `state` wholesale. Cameras without enough overlap with the
/// reference end up `Failed`; only structural problems return an error.
pub fn step_initialize(
    store: &TrackingResultStore,
    config: &RigCalibrationConfig,
    state: &mut CalibrationState,
) -> Result<InitializationReport, RigCalibError> {
    config.validate()?;
    let reference = config.reference_camera;
    let reference_track = store.get(reference).ok_or_else(|| {
        RigCalibError::InvalidInput(format!("reference camera {} has no track", reference))
    })?;
    let reference_poses = reference_track.valid_poses();

    let others: Vec<CameraId> = store
        .camera_indices()
        .into_iter()
        .filter(|&c| c != reference)
        .collect();
    let outcomes: Vec<CameraInitOutcome> = if config.parallel_initialization {
        others
            .par_iter()
            .map(|&c| estimate_camera(c, &reference_poses, store, config))
            .collect::<Result<_, _>>()?
    } else {
        others
            .iter()
            .map(|&c| estimate_camera(c, &reference_poses, store, config))
            .collect::<Result<_, _>>()?
    };

    let mut next = CalibrationState::new(reference);
    next.cameras
        .insert(reference, CameraCalibration::initialized(Iso3::identity(), None));
    for outcome in &outcomes {
        let calibration = match (&outcome.estimate, &outcome.failure) {
            (Some(estimate), _) => {
                CameraCalibration::initialized(estimate.cam_se3_rig, Some(estimate.clone()))
            }
            (None, Some(failure)) => CameraCalibration::failed(failure.clone()),
            (None, None) => CameraCalibration::default(),
        };
        next.cameras.insert(outcome.camera, calibration);
    }

    for frame in store.frames() {
        if let Some(entry) = seed_frame(frame, store, &next) {
            next.trajectory.insert(frame, entry);
        }
    }
    next.stage = CalibrationStage::Initialized;

    let mut cameras = Vec::with_capacity(outcomes.len() + 1);
    cameras.push(CameraInitOutcome {
        camera: reference,
        status: CameraStatus::Initialized,
        estimate: None,
        failure: None,
    });
    cameras.extend(outcomes);
    cameras.sort_by_key(|c| c.camera);

    let rig_frames = next.rig_poses().len();
    let report = InitializationReport {
        reference_camera: reference,
        cameras,
        rig_frames,
        uncalibrated_frames: next.trajectory.len() - rig_frames,
        store_revision: store.revision(),
    };
    info!(
        "initialized {} of {} cameras, {} rig frames, {} uncalibrated frames",
        report.initialized_cameras().len(),
        report.cameras.len(),
        report.rig_frames,
        report.uncalibrated_frames
    );

    *state = next;
    Ok(report)
}

/// Jointly refine extrinsics and rig poses of every calibrated camera.
///
/// Runs from the last accepted state. A rejected refinement leaves extrinsics
/// and trajectory untouched and is reported as a warning.
pub fn step_optimize(
    store: &TrackingResultStore,
    config: &RigCalibrationConfig,
    state: &mut CalibrationState,
) -> Result<RefinementReport, RigCalibError> {
    if state.stage == CalibrationStage::Uninitialized {
        return Err(RigCalibError::OutOfOrder(
            "optimize_calibration requires initialize_calibration first".to_string(),
        ));
    }
    config.validate()?;

    let inputs = build_refine_inputs(store, state, config)?;
    let problem = &inputs.problem;
    debug!(
        "refinement over {} cameras, {} frames, {} correspondences",
        inputs.cameras.len(),
        inputs.frames.len(),
        problem.num_observations()
    );

    match optimize_rig_extrinsics(problem, &inputs.init, &config.refine_options()) {
        Ok(result) => {
            // cameras held fixed for lack of correspondences keep their status
            let mut refined_cameras = Vec::new();
            for (idx, &camera) in inputs.cameras.iter().enumerate() {
                if !problem.is_camera_constrained(idx) {
                    continue;
                }
                if let Some(cal) = state.cameras.get_mut(&camera) {
                    if problem.is_camera_free(idx) {
                        cal.cam_se3_rig = Some(result.params.cam_se3_rig[idx]);
                    }
                    cal.status = CameraStatus::Refined;
                    refined_cameras.push(camera);
                }
            }
            for (idx, &frame) in inputs.frames.iter().enumerate() {
                if problem.is_frame_free(idx) {
                    state.trajectory.insert(
                        frame,
                        TrajectoryEntry::Rig {
                            world_se3_rig: result.params.rig_se3_world[idx].inverse(),
                            source: PoseSource::Refined,
                        },
                    );
                } else if let Some(entry) = reseed_held_frame(frame, store, state) {
                    state.trajectory.insert(frame, entry);
                }
            }
            state.stage = CalibrationStage::Refined;
            info!(
                "refinement {:?} after {} iterations: rms {:.4} -> {:.4} px, median {:.4} -> {:.4} px",
                result.report.termination,
                result.report.iterations,
                result.before.rms,
                result.after.rms,
                result.before.median,
                result.after.median
            );

            let summary = RefinementSummary {
                accepted: true,
                report: result.report,
                num_cameras: inputs.cameras.len(),
                num_frames: inputs.frames.len(),
                num_observations: problem.num_observations(),
                before: result.before,
                after: Some(result.after),
                warning: None,
            };
            state.last_refinement = Some(summary.clone());
            Ok(RefinementReport {
                summary,
                refined_cameras,
            })
        }
        Err(RefineError::Diverged { reason, report }) => {
            let warning = RigCalibError::OptimizationDivergence(reason);
            warn!("{}; keeping the previous calibration", warning);
            let summary = RefinementSummary {
                accepted: false,
                report,
                num_cameras: inputs.cameras.len(),
                num_frames: inputs.frames.len(),
                num_observations: problem.num_observations(),
                before: ResidualStats::from_errors(&problem.reprojection_errors(&inputs.init)),
                after: None,
                warning: Some(warning),
            };
            state.last_refinement = Some(summary.clone());
            Ok(RefinementReport {
                summary,
                refined_cameras: Vec::new(),
            })
        }
        Err(RefineError::InvalidProblem(msg)) => Err(RigCalibError::InvalidInput(msg)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Diagnostics
// ─────────────────────────────────────────────────────────────────────────────

/// Reprojection errors of every calibrated camera at every rig frame.
pub fn reprojection_residuals(
    store: &TrackingResultStore,
    state: &CalibrationState,
) -> Vec<ViewResiduals> {
    let rig_poses = state.rig_poses();
    let mut out = Vec::new();
    for camera in state.calibrated_cameras() {
        let (Some(track), Some(cam_se3_rig)) = (store.get(camera), state.extrinsic(camera)) else {
            continue;
        };
        for (frame, world_se3_rig) in &rig_poses {
            let Some(result) = track.get(*frame).filter(|r| r.is_valid()) else {
                continue;
            };
            let cam_se3_world = cam_se3_rig * world_se3_rig.inverse();
            let errors = result
                .correspondences
                .iter()
                .map(|c| {
                    c.reprojection_error(&cam_se3_world, &result.camera)
                        .unwrap_or(Real::INFINITY)
                })
                .collect();
            out.push(ViewResiduals {
                camera,
                frame: *frame,
                errors,
            });
        }
    }
    out
}
