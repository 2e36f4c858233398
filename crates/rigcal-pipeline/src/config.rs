use rigcal_core::{CameraId, Real, RigCalibError};
use rigcal_linear::RelativePoseOptions;
use rigcal_optim::{RefineBackend, RigRefineOptions, RobustKernel, SolveOptions};
use serde::{Deserialize, Serialize};

/// Configuration of both calibration stages.
///
/// Missing fields take their defaults when deserialized, so a config file
/// only needs the knobs it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigCalibrationConfig {
    /// Camera whose frame defines the rig frame.
    pub reference_camera: CameraId,

    // ─────────────────────────────────────────────────────────────────────────
    // Initialization
    // ─────────────────────────────────────────────────────────────────────────
    /// Minimum jointly localized frames (and inliers) per camera.
    pub min_overlap_frames: usize,
    /// Outlier threshold on relative rotation (degrees).
    pub max_rotation_deviation_deg: Real,
    /// Outlier threshold on relative camera centre (map units).
    pub max_translation_deviation: Real,
    /// Estimate cameras in parallel.
    pub parallel_initialization: bool,

    // ─────────────────────────────────────────────────────────────────────────
    // Refinement
    // ─────────────────────────────────────────────────────────────────────────
    /// Robust loss on per-correspondence reprojection error (pixels).
    pub robust_loss: RobustKernel,
    pub max_iters: usize,
    pub param_tolerance: Real,
    /// Relative cost decrease below which the solver stops.
    pub cost_tolerance: Real,
    pub gradient_tolerance: Real,
    /// Refinement results whose cost grew by more than this factor are rejected.
    pub divergence_ratio: Real,
    /// Frames with fewer correspondences keep their initial rig pose.
    pub min_frame_correspondences: usize,
    pub backend: RefineBackend,
    /// Log every solver iteration at `info` level.
    pub verbose: bool,
}

impl Default for RigCalibrationConfig {
    fn default() -> Self {
        Self {
            reference_camera: 0,
            min_overlap_frames: 3,
            max_rotation_deviation_deg: 5.0,
            max_translation_deviation: 0.10,
            parallel_initialization: true,
            robust_loss: RobustKernel::Huber { delta: 2.0 },
            max_iters: 100,
            param_tolerance: 1e-10,
            cost_tolerance: 1e-12,
            gradient_tolerance: 1e-10,
            divergence_ratio: 10.0,
            min_frame_correspondences: 3,
            backend: RefineBackend::Schur,
            verbose: false,
        }
    }
}

impl RigCalibrationConfig {
    pub fn validate(&self) -> Result<(), RigCalibError> {
        let invalid = |msg: String| Err(RigCalibError::InvalidInput(msg));
        if let Err(e) = self.relative_pose_options().validate() {
            return invalid(e.to_string());
        }
        if let Err(e) = self.robust_loss.validate() {
            return invalid(e);
        }
        let non_negative = |v: Real| v >= 0.0;
        if !non_negative(self.param_tolerance)
            || !non_negative(self.cost_tolerance)
            || !non_negative(self.gradient_tolerance)
        {
            return invalid("solver tolerances must be non-negative".to_string());
        }
        let at_least_one = |v: Real| v >= 1.0;
        if !at_least_one(self.divergence_ratio) {
            return invalid(format!(
                "divergence_ratio must be at least 1, got {}",
                self.divergence_ratio
            ));
        }
        Ok(())
    }

    pub fn relative_pose_options(&self) -> RelativePoseOptions {
        RelativePoseOptions {
            min_overlap_frames: self.min_overlap_frames,
            max_rotation_deviation_deg: self.max_rotation_deviation_deg,
            max_translation_deviation: self.max_translation_deviation,
            ..RelativePoseOptions::default()
        }
    }

    pub fn refine_options(&self) -> RigRefineOptions {
        RigRefineOptions {
            robust_loss: self.robust_loss,
            min_frame_observations: self.min_frame_correspondences,
            backend: self.backend,
            solve: SolveOptions {
                max_iters: self.max_iters,
                ftol: self.cost_tolerance,
                gtol: self.gradient_tolerance,
                xtol: self.param_tolerance,
                verbose: self.verbose,
            },
            divergence_ratio: self.divergence_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_forwarded() {
        let config = RigCalibrationConfig::default();
        config.validate().unwrap();
        let rel = config.relative_pose_options();
        assert_eq!(rel.min_overlap_frames, 3);
        assert_eq!(rel.max_rotation_deviation_deg, 5.0);
        let refine = config.refine_options();
        assert_eq!(refine.robust_loss, RobustKernel::Huber { delta: 2.0 });
        assert_eq!(refine.solve.max_iters, 100);
        assert_eq!(refine.solve.xtol, 1e-10);
        assert_eq!(refine.backend, RefineBackend::Schur);
    }

    #[test]
    fn invalid_knobs_are_rejected() {
        let bad = [
            RigCalibrationConfig {
                min_overlap_frames: 0,
                ..Default::default()
            },
            RigCalibrationConfig {
                max_rotation_deviation_deg: -1.0,
                ..Default::default()
            },
            RigCalibrationConfig {
                robust_loss: RobustKernel::Cauchy { c: 0.0 },
                ..Default::default()
            },
            RigCalibrationConfig {
                divergence_ratio: Real::NAN,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(
                config.validate(),
                Err(RigCalibError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: RigCalibrationConfig = serde_json::from_str(
            r#"{ "reference_camera": 1, "robust_loss": { "kind": "cauchy", "c": 3.0 }, "backend": "dense_lm" }"#,
        )
        .unwrap();
        assert_eq!(config.reference_camera, 1);
        assert_eq!(config.robust_loss, RobustKernel::Cauchy { c: 3.0 });
        assert_eq!(config.backend, RefineBackend::DenseLm);
        assert_eq!(config.min_overlap_frames, 3);

        let json = serde_json::to_string(&config).unwrap();
        let back: RigCalibrationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
