//! Camera model building blocks.
//!
//! A camera is a composition of three stages:
//!
//! 1. `ProjectionModel`: map a 3D direction to normalized coordinates (pinhole).
//! 2. `DistortionModel`: apply radial/tangential distortion in normalized space.
//! 3. `IntrinsicsModel`: map normalized coordinates to pixels (K matrix).
//!
//! `pixel = intrinsics(distortion(projection(dir)))`
//!
//! Localizers report intrinsics with up to three radial and two tangential
//! coefficients, which [`PinholeCamera`] covers.

mod camera;
mod distortion;
mod intrinsics;
mod projection;

pub use camera::*;
pub use distortion::*;
pub use intrinsics::*;
pub use projection::*;

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Vector2, Vector3};

    #[test]
    fn projection_applies_distortion_before_intrinsics() {
        let cam = make_pinhole_camera(
            FxFyCxCySkew {
                fx: 800.0,
                fy: 810.0,
                cx: 640.0,
                cy: 360.0,
                skew: 0.0,
            },
            BrownConrady5 {
                k1: -0.05,
                ..Default::default()
            },
        );

        let on_axis = cam.project_point_c(&Vector3::new(0.0, 0.0, 3.0)).unwrap();
        assert_eq!(on_axis, Vector2::new(640.0, 360.0));

        // normalized (0.3, 0.2), r2 = 0.13, radial factor 0.9935
        let px = cam.project_point_c(&Vector3::new(0.75, 0.5, 2.5)).unwrap();
        let err = (px - Vector2::new(878.44, 520.947)).norm();
        assert!(err < 1e-9, "err={err}");
    }

    #[test]
    fn points_behind_camera_do_not_project() {
        let cam = make_pinhole_camera(
            FxFyCxCySkew {
                fx: 500.0,
                fy: 500.0,
                cx: 320.0,
                cy: 240.0,
                skew: 0.0,
            },
            BrownConrady5::default(),
        );
        assert!(cam
            .project_point_c(&Vector3::new(0.1, 0.0, -1.0))
            .is_none());
    }
}
