use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CameraId, FrameId};

/// Errors raised by the rig calibration engine.
///
/// Structural errors (`InvalidInput`, `DuplicateFrame`, `OutOfOrder`) are
/// returned to the caller immediately. `InsufficientOverlap` is recorded per
/// camera and `OptimizationDivergence` is reported as a refinement warning.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum RigCalibError {
    /// Malformed or empty input, inconsistent frame indexing or invalid configuration.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A camera reported two results for the same frame.
    #[error("camera {camera} already has a localization result for frame {frame}")]
    DuplicateFrame { camera: CameraId, frame: FrameId },

    /// Too few frames where both the camera and the reference localized.
    #[error(
        "camera {camera} has {found} usable frames jointly localized with the reference, \
         at least {required} required"
    )]
    InsufficientOverlap {
        camera: CameraId,
        found: usize,
        required: usize,
    },

    /// Joint refinement did not converge.
    #[error("joint refinement diverged: {0}")]
    OptimizationDivergence(String),

    /// A calibration stage was invoked before its prerequisite stage.
    #[error("stage invoked out of order: {0}")]
    OutOfOrder(String),
}

impl RigCalibError {
    /// Whether the error only affects a single camera's calibration.
    pub fn is_per_camera(&self) -> bool {
        matches!(self, RigCalibError::InsufficientOverlap { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_camera() {
        let err = RigCalibError::DuplicateFrame {
            camera: 2,
            frame: 7,
        };
        assert_eq!(
            err.to_string(),
            "camera 2 already has a localization result for frame 7"
        );

        let err = RigCalibError::InsufficientOverlap {
            camera: 1,
            found: 2,
            required: 3,
        };
        assert!(err.to_string().contains("camera 1 has 2 usable frames"));
        assert!(err.is_per_camera());
        assert!(!RigCalibError::OutOfOrder("x".into()).is_per_camera());
    }

    #[test]
    fn json_roundtrip() {
        let err = RigCalibError::InsufficientOverlap {
            camera: 1,
            found: 0,
            required: 3,
        };
        let json = serde_json::to_string(&err).unwrap();
        let restored: RigCalibError = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, err);
    }
}
