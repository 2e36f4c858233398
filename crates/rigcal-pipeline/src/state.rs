//! Calibration state shared by the two stages.
//!
//! Created empty by the facade and mutated only by
//! [`step_initialize`](crate::steps::step_initialize) and
//! [`step_optimize`](crate::steps::step_optimize).

use std::collections::BTreeMap;

use rigcal_core::{CameraId, FrameId, Iso3, RigCalibError};
use rigcal_linear::RelativePoseEstimate;
use rigcal_optim::{ResidualStats, SolveReport};
use serde::{Deserialize, Serialize};

/// Overall progress; only moves forward until an explicit reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStage {
    #[default]
    Uninitialized,
    Initialized,
    Refined,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraStatus {
    #[default]
    Uninitialized,
    Initialized,
    Refined,
    /// Excluded from trajectory fusion and refinement; see `failure`.
    Failed,
}

impl CameraStatus {
    /// Whether the camera has an accepted extrinsic.
    pub fn is_calibrated(self) -> bool {
        matches!(self, CameraStatus::Initialized | CameraStatus::Refined)
    }
}

/// Calibration of one camera relative to the rig.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub status: CameraStatus,
    /// Current extrinsic, rig -> camera.
    pub cam_se3_rig: Option<Iso3>,
    /// Extrinsic as estimated by initialization, before refinement.
    pub initial_cam_se3_rig: Option<Iso3>,
    pub failure: Option<RigCalibError>,
    /// Statistics of the relative pose estimate (absent for the reference).
    pub support: Option<RelativePoseEstimate>,
}

impl CameraCalibration {
    pub fn initialized(cam_se3_rig: Iso3, support: Option<RelativePoseEstimate>) -> Self {
        Self {
            status: CameraStatus::Initialized,
            cam_se3_rig: Some(cam_se3_rig),
            initial_cam_se3_rig: Some(cam_se3_rig),
            failure: None,
            support,
        }
    }

    pub fn failed(error: RigCalibError) -> Self {
        Self {
            status: CameraStatus::Failed,
            failure: Some(error),
            ..Self::default()
        }
    }

    /// Inverse extrinsic, camera -> rig.
    pub fn rig_se3_cam(&self) -> Option<Iso3> {
        self.cam_se3_rig.map(|p| p.inverse())
    }
}

/// Where a rig pose came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseSource {
    /// The reference camera's localization.
    Reference,
    /// Another calibrated camera's localization composed with its extrinsic.
    Camera(CameraId),
    /// Joint refinement.
    Refined,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrajectoryEntry {
    Rig {
        world_se3_rig: Iso3,
        source: PoseSource,
    },
    /// Localized only by cameras whose calibration failed.
    Uncalibrated {
        camera: CameraId,
        world_se3_cam: Iso3,
    },
}

impl TrajectoryEntry {
    pub fn world_se3_rig(&self) -> Option<Iso3> {
        match self {
            TrajectoryEntry::Rig { world_se3_rig, .. } => Some(*world_se3_rig),
            TrajectoryEntry::Uncalibrated { .. } => None,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self, TrajectoryEntry::Rig { .. })
    }
}

/// Outcome of the last refinement attempt, accepted or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementSummary {
    pub accepted: bool,
    pub report: SolveReport,
    pub num_cameras: usize,
    pub num_frames: usize,
    pub num_observations: usize,
    pub before: ResidualStats,
    /// Statistics after refinement; `None` when the result was rejected.
    pub after: Option<ResidualStats>,
    pub warning: Option<RigCalibError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    pub reference_camera: CameraId,
    pub stage: CalibrationStage,
    pub cameras: BTreeMap<CameraId, CameraCalibration>,
    pub trajectory: BTreeMap<FrameId, TrajectoryEntry>,
    #[serde(default)]
    pub last_refinement: Option<RefinementSummary>,
}

impl CalibrationState {
    pub fn new(reference_camera: CameraId) -> Self {
        Self {
            reference_camera,
            ..Self::default()
        }
    }

    pub fn camera(&self, camera: CameraId) -> Option<&CameraCalibration> {
        self.cameras.get(&camera)
    }

    pub fn extrinsic(&self, camera: CameraId) -> Option<Iso3> {
        self.cameras.get(&camera).and_then(|c| c.cam_se3_rig)
    }

    /// Cameras with an accepted extrinsic, ascending.
    pub fn calibrated_cameras(&self) -> Vec<CameraId> {
        self.cameras
            .iter()
            .filter(|(_, c)| c.status.is_calibrated() && c.cam_se3_rig.is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn failed_cameras(&self) -> Vec<CameraId> {
        self.cameras
            .iter()
            .filter(|(_, c)| c.status == CameraStatus::Failed)
            .map(|(id, _)| *id)
            .collect()
    }

    /// `world_se3_rig` of every frame with a calibrated rig pose.
    pub fn rig_poses(&self) -> BTreeMap<FrameId, Iso3> {
        self.trajectory
            .iter()
            .filter_map(|(f, e)| e.world_se3_rig().map(|p| (*f, p)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcal_core::synthetic::make_iso;

    fn sample_state() -> CalibrationState {
        let mut state = CalibrationState::new(0);
        state.stage = CalibrationStage::Initialized;
        state
            .cameras
            .insert(0, CameraCalibration::initialized(Iso3::identity(), None));
        state.cameras.insert(
            1,
            CameraCalibration::initialized(make_iso((0.0, 0.1, 0.0), (0.1, 0.0, 0.0)), None),
        );
        state.cameras.insert(
            2,
            CameraCalibration::failed(RigCalibError::InsufficientOverlap {
                camera: 2,
                found: 2,
                required: 3,
            }),
        );
        state.trajectory.insert(
            0,
            TrajectoryEntry::Rig {
                world_se3_rig: make_iso((0.0, 0.0, 0.2), (1.0, 2.0, 3.0)),
                source: PoseSource::Camera(1),
            },
        );
        state.trajectory.insert(
            3,
            TrajectoryEntry::Uncalibrated {
                camera: 2,
                world_se3_cam: Iso3::translation(0.5, 0.0, 0.0),
            },
        );
        state
    }

    #[test]
    fn queries_split_calibrated_and_failed() {
        let state = sample_state();
        assert_eq!(state.calibrated_cameras(), vec![0, 1]);
        assert_eq!(state.failed_cameras(), vec![2]);
        assert!(state.extrinsic(2).is_none());
        assert_eq!(state.rig_poses().len(), 1);
        let inv = state.camera(1).unwrap().rig_se3_cam().unwrap();
        let (dt, ang) =
            rigcal_core::pose_error(&(inv * state.extrinsic(1).unwrap()), &Iso3::identity());
        assert!(dt < 1e-12 && ang < 1e-12);
    }

    #[test]
    fn stages_are_ordered() {
        assert!(CalibrationStage::Uninitialized < CalibrationStage::Initialized);
        assert!(CalibrationStage::Initialized < CalibrationStage::Refined);
    }

    #[test]
    fn state_roundtrips_through_json() {
        let state = sample_state();
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"kind\":\"uncalibrated\""));
        let back: CalibrationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stage, state.stage);
        for (id, cam) in &state.cameras {
            let restored = back.camera(*id).unwrap();
            assert_eq!(restored.status, cam.status);
            assert_eq!(restored.failure, cam.failure);
            if let (Some(a), Some(b)) = (restored.cam_se3_rig, cam.cam_se3_rig) {
                let (dt, ang) = rigcal_core::pose_error(&a, &b);
                assert!(dt < 1e-12 && ang < 1e-12);
            }
        }
        assert_eq!(back.trajectory.len(), 2);
        assert_eq!(back.calibrated_cameras(), vec![0, 1]);
        let (dt, ang) = rigcal_core::pose_error(
            &back.rig_poses()[&0],
            &state.rig_poses()[&0],
        );
        assert!(dt < 1e-12 && ang < 1e-12);
    }
}
