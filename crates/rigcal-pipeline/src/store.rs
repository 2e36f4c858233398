//! Append-only storage of per-camera localization tracks.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use rigcal_core::{CameraId, FrameId, Iso3, LocalizationResult, RigCalibError};
use serde::{Deserialize, Serialize};

/// Localization results of one camera, ordered by frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraTrack {
    results: BTreeMap<FrameId, LocalizationResult>,
}

impl CameraTrack {
    pub fn get(&self, frame: FrameId) -> Option<&LocalizationResult> {
        self.results.get(&frame)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrameId, &LocalizationResult)> + '_ {
        self.results.iter().map(|(f, r)| (*f, r))
    }

    /// `cam_se3_world` of every successfully localized frame.
    pub fn valid_poses(&self) -> BTreeMap<FrameId, Iso3> {
        self.results
            .iter()
            .filter(|(_, r)| r.is_valid())
            .map(|(f, r)| (*f, r.cam_se3_world))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.results.values().filter(|r| r.is_valid()).count()
    }

    pub fn first_frame(&self) -> Option<FrameId> {
        self.results.keys().next().copied()
    }

    pub fn last_frame(&self) -> Option<FrameId> {
        self.results.keys().next_back().copied()
    }
}

/// All tracks fed to the engine so far.
///
/// Entries are never modified or removed once appended. `revision` counts
/// successful appends so callers can tell whether the store changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackingResultStore {
    tracks: BTreeMap<CameraId, CameraTrack>,
    revision: u64,
}

impl TrackingResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one result. Frames of a camera must arrive in increasing order.
    pub fn append(
        &mut self,
        camera: CameraId,
        frame: FrameId,
        result: LocalizationResult,
    ) -> Result<(), RigCalibError> {
        let track = self.tracks.entry(camera).or_default();
        if track.results.contains_key(&frame) {
            return Err(RigCalibError::DuplicateFrame { camera, frame });
        }
        if let Some(last) = track.last_frame() {
            if frame < last {
                return Err(RigCalibError::InvalidInput(format!(
                    "camera {} frame {} arrives after frame {}",
                    camera, frame, last
                )));
            }
        }
        track.results.insert(frame, result);
        self.revision += 1;
        Ok(())
    }

    /// Append a whole track; result `i` is frame `i`.
    ///
    /// Validated up front, so a rejected track leaves the store untouched.
    pub fn append_track(
        &mut self,
        camera: CameraId,
        results: Vec<LocalizationResult>,
    ) -> Result<(), RigCalibError> {
        if results.is_empty() {
            return Err(RigCalibError::InvalidInput(format!(
                "empty track for camera {}",
                camera
            )));
        }
        if let Some(track) = self.tracks.get(&camera) {
            if let Some(first) = track.first_frame() {
                // frame 0 is always a duplicate or out of order here
                return Err(if track.results.contains_key(&0) {
                    RigCalibError::DuplicateFrame { camera, frame: 0 }
                } else {
                    RigCalibError::InvalidInput(format!(
                        "camera {} already holds frames from {}",
                        camera, first
                    ))
                });
            }
        }
        for (frame, result) in results.into_iter().enumerate() {
            self.append(camera, frame, result)?;
        }
        Ok(())
    }

    pub fn get(&self, camera: CameraId) -> Option<&CameraTrack> {
        self.tracks.get(&camera)
    }

    pub fn camera_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn camera_indices(&self) -> Vec<CameraId> {
        self.tracks.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CameraId, &CameraTrack)> + '_ {
        self.tracks.iter().map(|(c, t)| (*c, t))
    }

    /// Smallest and largest frame over all cameras.
    pub fn frame_range(&self) -> Option<RangeInclusive<FrameId>> {
        let first = self.tracks.values().filter_map(CameraTrack::first_frame).min()?;
        let last = self.tracks.values().filter_map(CameraTrack::last_frame).max()?;
        Some(first..=last)
    }

    /// Every frame recorded by at least one camera, ascending.
    pub fn frames(&self) -> Vec<FrameId> {
        let mut frames: Vec<FrameId> = self
            .tracks
            .values()
            .flat_map(|t| t.results.keys().copied())
            .collect();
        frames.sort_unstable();
        frames.dedup();
        frames
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}
