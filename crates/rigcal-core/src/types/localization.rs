//! Per-frame localization records.
//!
//! A localizer estimates one camera's pose against a prebuilt map for each
//! synchronized frame and reports the inlier 2D-3D correspondences it used.
//! These records are the only input of the rig calibration engine.

use serde::{Deserialize, Serialize};

use crate::{Iso3, PinholeCamera, Pt2, Pt3, Real};

/// A 2D image observation paired with the map point it was matched to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    /// Identifier of the map landmark.
    pub landmark_id: u64,
    /// Observed pixel location.
    pub point_2d: Pt2,
    /// Landmark position in world (map) coordinates.
    pub point_3d: Pt3,
}

impl Correspondence {
    pub fn new(landmark_id: u64, point_2d: Pt2, point_3d: Pt3) -> Self {
        Self {
            landmark_id,
            point_2d,
            point_3d,
        }
    }

    /// Pixel reprojection error under `cam_se3_world` and `camera`.
    ///
    /// `None` when the landmark lies behind the camera.
    pub fn reprojection_error(&self, cam_se3_world: &Iso3, camera: &PinholeCamera) -> Option<Real> {
        let p_c = cam_se3_world * self.point_3d;
        let uv = camera.project_point(&p_c)?;
        Some((uv - self.point_2d.coords).norm())
    }
}

/// Output of the localizer for one camera at one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizationResult {
    /// Estimated pose, world -> camera.
    pub cam_se3_world: Iso3,
    /// Whether localization succeeded; the pose is meaningless otherwise.
    pub valid: bool,
    /// Intrinsics used (or refined) by the localizer for this frame.
    pub camera: PinholeCamera,
    /// Inlier correspondences supporting the pose.
    #[serde(default)]
    pub correspondences: Vec<Correspondence>,
}

impl LocalizationResult {
    /// Successful localization.
    pub fn localized(
        cam_se3_world: Iso3,
        camera: PinholeCamera,
        correspondences: Vec<Correspondence>,
    ) -> Self {
        Self {
            cam_se3_world,
            valid: true,
            camera,
            correspondences,
        }
    }

    /// Frame the localizer could not localize.
    pub fn not_localized(camera: PinholeCamera) -> Self {
        Self {
            cam_se3_world: Iso3::identity(),
            valid: false,
            camera,
            correspondences: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Camera pose in the world, camera -> world.
    pub fn world_se3_cam(&self) -> Iso3 {
        self.cam_se3_world.inverse()
    }

    pub fn num_correspondences(&self) -> usize {
        self.correspondences.len()
    }

    /// Per-correspondence pixel errors under the localizer's own pose.
    ///
    /// Landmarks behind the camera report `Real::INFINITY`.
    pub fn reprojection_errors(&self) -> Vec<Real> {
        self.correspondences
            .iter()
            .map(|c| {
                c.reprojection_error(&self.cam_se3_world, &self.camera)
                    .unwrap_or(Real::INFINITY)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{make_pinhole_camera, BrownConrady5, FxFyCxCySkew};

    fn camera() -> PinholeCamera {
        make_pinhole_camera(
            FxFyCxCySkew {
                fx: 800.0,
                fy: 800.0,
                cx: 640.0,
                cy: 360.0,
                skew: 0.0,
            },
            BrownConrady5::default(),
        )
    }

    #[test]
    fn reprojection_error_is_zero_for_exact_observation() {
        let pose = Iso3::translation(0.1, 0.0, 0.0);
        let pw = Pt3::new(0.2, -0.1, 4.0);
        let uv = camera().project_point(&(pose * pw)).unwrap();
        let c = Correspondence::new(7, Pt2::from(uv), pw);

        let result = LocalizationResult::localized(pose, camera(), vec![c]);
        let errors = result.reprojection_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0] < 1e-9, "err={}", errors[0]);
    }

    #[test]
    fn landmark_behind_camera_is_infinite() {
        let c = Correspondence::new(1, Pt2::new(10.0, 10.0), Pt3::new(0.0, 0.0, -2.0));
        let result = LocalizationResult::localized(Iso3::identity(), camera(), vec![c]);
        assert!(result.reprojection_errors()[0].is_infinite());
    }

    #[test]
    fn json_roundtrip() {
        let c = Correspondence::new(3, Pt2::new(100.0, 200.0), Pt3::new(1.0, 2.0, 5.0));
        let result =
            LocalizationResult::localized(Iso3::translation(0.0, 0.5, 0.0), camera(), vec![c]);
        let json = serde_json::to_string(&result).unwrap();
        let restored: LocalizationResult = serde_json::from_str(&json).unwrap();
        assert!(restored.valid);
        assert_eq!(restored.correspondences, result.correspondences);
        assert_eq!(restored.camera.k.fx, 800.0);
        assert!((restored.cam_se3_world.translation.y - 0.5).abs() < 1e-15);

        let lost = LocalizationResult::not_localized(camera());
        assert!(!lost.is_valid());
        assert_eq!(lost.num_correspondences(), 0);
    }
}
