//! Calibration export records and sinks.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rigcal_core::{iso3_to_rows, CameraId, FrameId, Real};
use serde::{Deserialize, Serialize};

use crate::state::{
    CalibrationStage, CalibrationState, CameraStatus, PoseSource, RefinementSummary,
    TrajectoryEntry,
};
use crate::store::TrackingResultStore;
use crate::types::SCHEMA_VERSION;

/// Row-major homogeneous 4x4 matrix.
pub type PoseRows = [[Real; 4]; 4];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraExport {
    pub camera: CameraId,
    pub status: CameraStatus,
    /// Extrinsic, rig -> camera.
    pub cam_se3_rig: Option<PoseRows>,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameExport {
    Rig {
        frame: FrameId,
        world_se3_rig: PoseRows,
        source: PoseSource,
    },
    Uncalibrated {
        frame: FrameId,
        camera: CameraId,
        world_se3_cam: PoseRows,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkExport {
    pub id: u64,
    pub position: [Real; 3],
}

/// Flat, interchange-friendly snapshot of a calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigCalibrationExport {
    pub schema_version: u32,
    pub reference_camera: CameraId,
    pub stage: CalibrationStage,
    pub refined: bool,
    pub cameras: Vec<CameraExport>,
    pub trajectory: Vec<FrameExport>,
    /// Map points referenced by any stored correspondence, unique by id.
    pub landmarks: Vec<LandmarkExport>,
    pub refinement: Option<RefinementSummary>,
}

impl RigCalibrationExport {
    pub fn new(store: &TrackingResultStore, state: &CalibrationState) -> Self {
        let cameras = state
            .cameras
            .iter()
            .map(|(id, cal)| CameraExport {
                camera: *id,
                status: cal.status,
                cam_se3_rig: cal.cam_se3_rig.as_ref().map(iso3_to_rows),
                failure: cal.failure.as_ref().map(|e| e.to_string()),
            })
            .collect();

        let trajectory = state
            .trajectory
            .iter()
            .map(|(frame, entry)| match entry {
                TrajectoryEntry::Rig {
                    world_se3_rig,
                    source,
                } => FrameExport::Rig {
                    frame: *frame,
                    world_se3_rig: iso3_to_rows(world_se3_rig),
                    source: *source,
                },
                TrajectoryEntry::Uncalibrated {
                    camera,
                    world_se3_cam,
                } => FrameExport::Uncalibrated {
                    frame: *frame,
                    camera: *camera,
                    world_se3_cam: iso3_to_rows(world_se3_cam),
                },
            })
            .collect();

        let mut landmarks = BTreeMap::new();
        for (_, track) in store.iter() {
            for (_, result) in track.iter() {
                for c in &result.correspondences {
                    landmarks
                        .entry(c.landmark_id)
                        .or_insert([c.point_3d.x, c.point_3d.y, c.point_3d.z]);
                }
            }
        }

        Self {
            schema_version: SCHEMA_VERSION,
            reference_camera: state.reference_camera,
            stage: state.stage,
            refined: state.stage == CalibrationStage::Refined,
            cameras,
            trajectory,
            landmarks: landmarks
                .into_iter()
                .map(|(id, position)| LandmarkExport { id, position })
                .collect(),
            refinement: state.last_refinement.clone(),
        }
    }
}

/// Destination for calibration exports.
pub trait ExportSink {
    fn consume(&mut self, export: &RigCalibrationExport) -> Result<()>;
}

/// Writes each export as pretty-printed JSON, replacing the file.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ExportSink for JsonFileSink {
    fn consume(&mut self, export: &RigCalibrationExport) -> Result<()> {
        let json = serde_json::to_string_pretty(export).context("failed to serialize export")?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write export to {}", self.path.display()))
    }
}

/// Keeps every export in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub exports: Vec<RigCalibrationExport>,
}

impl ExportSink for MemorySink {
    fn consume(&mut self, export: &RigCalibrationExport) -> Result<()> {
        self.exports.push(export.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CameraCalibration;
    use rigcal_core::synthetic::default_camera;
    use rigcal_core::{Correspondence, Iso3, LocalizationResult, Pt2, Pt3, RigCalibError};

    fn result(ids: &[u64]) -> LocalizationResult {
        let corr = ids
            .iter()
            .map(|&id| Correspondence::new(id, Pt2::new(1.0, 2.0), Pt3::new(id as Real, 0.0, 5.0)))
            .collect();
        LocalizationResult::localized(Iso3::identity(), default_camera(), corr)
    }

    #[test]
    fn export_flattens_state_and_dedups_landmarks() {
        let mut store = TrackingResultStore::new();
        store.append_track(0, vec![result(&[1, 2]), result(&[2, 3])]).unwrap();
        store.append_track(1, vec![result(&[3, 4])]).unwrap();

        let mut state = CalibrationState::new(0);
        state.stage = CalibrationStage::Initialized;
        state
            .cameras
            .insert(0, CameraCalibration::initialized(Iso3::identity(), None));
        state.cameras.insert(
            1,
            CameraCalibration::failed(RigCalibError::InsufficientOverlap {
                camera: 1,
                found: 1,
                required: 3,
            }),
        );
        state.trajectory.insert(
            0,
            TrajectoryEntry::Rig {
                world_se3_rig: Iso3::translation(1.0, 0.0, 0.0),
                source: PoseSource::Reference,
            },
        );

        let export = RigCalibrationExport::new(&store, &state);
        assert!(!export.refined);
        assert_eq!(
            export.landmarks.iter().map(|l| l.id).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(export.cameras[0].cam_se3_rig.unwrap()[3], [0.0, 0.0, 0.0, 1.0]);
        assert!(export.cameras[1].cam_se3_rig.is_none());
        assert!(export.cameras[1].failure.as_ref().unwrap().contains("camera 1"));
        match &export.trajectory[0] {
            FrameExport::Rig { world_se3_rig, .. } => assert_eq!(world_se3_rig[0][3], 1.0),
            other => panic!("unexpected {:?}", other),
        }

        let mut sink = MemorySink::default();
        sink.consume(&export).unwrap();
        assert_eq!(sink.exports, vec![export]);
    }

    #[test]
    fn json_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        let export =
            RigCalibrationExport::new(&TrackingResultStore::new(), &CalibrationState::new(0));

        let mut sink = JsonFileSink::new(&path);
        sink.consume(&export).unwrap();
        let text = std::fs::read_to_string(sink.path()).unwrap();
        let back: RigCalibrationExport = serde_json::from_str(&text).unwrap();
        assert_eq!(back, export);
    }
}
