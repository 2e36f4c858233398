//! Synthetic multi-camera rig observing a landmark lattice.

use nalgebra::{Rotation3, Translation3};

use super::{PoseNoise, UniformPixelNoise};
use crate::{
    make_pinhole_camera, BrownConrady5, Correspondence, FxFyCxCySkew, Iso3, LocalizationResult,
    PinholeCamera, Pt2, Pt3, Real,
};

/// Pose from XYZ Euler angles (radians) and a translation.
pub fn make_iso(angles: (Real, Real, Real), t: (Real, Real, Real)) -> Iso3 {
    let rot = Rotation3::from_euler_angles(angles.0, angles.1, angles.2);
    Iso3::from_parts(Translation3::new(t.0, t.1, t.2), rot.into())
}

/// 1280x720 pinhole camera without distortion.
pub fn default_camera() -> PinholeCamera {
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

/// Noise stream of one `(camera, frame)` view; distinct for indices below 2^32.
pub fn view_stream(camera: usize, frame: usize) -> u64 {
    ((camera as u64) << 32) | frame as u64
}

/// Regular 3D lattice of `nx * ny * nz` points centred on `center`.
///
/// Ordered deterministically (Z major, then Y, then X).
pub fn landmark_lattice(nx: usize, ny: usize, nz: usize, spacing: Real, center: Pt3) -> Vec<Pt3> {
    let offset = |n: usize, i: usize| (i as Real - (n.saturating_sub(1)) as Real * 0.5) * spacing;
    let mut points = Vec::with_capacity(nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                points.push(Pt3::new(
                    center.x + offset(nx, i),
                    center.y + offset(ny, j),
                    center.z + offset(nz, k),
                ));
            }
        }
    }
    points
}

/// Smooth rig trajectory translating along +X by `step` per frame with a
/// gentle wobble in orientation and height.
pub fn rig_trajectory(num_frames: usize, step: Real) -> Vec<Iso3> {
    (0..num_frames)
        .map(|f| {
            let t = f as Real;
            make_iso(
                (0.04 * t.sin(), 0.06 * (0.5 * t).cos() - 0.06, 0.02 * t),
                (step * t, 0.03 * (0.7 * t).sin(), 0.05 * t.cos() - 0.05),
            )
        })
        .collect()
}

/// Ground-truth rig together with a shared camera model.
#[derive(Debug, Clone)]
pub struct SyntheticRig {
    pub camera: PinholeCamera,
    /// Extrinsics, rig -> camera. Camera 0 is the reference.
    pub cam_se3_rig: Vec<Iso3>,
    /// Trajectory, rig -> world, one entry per frame.
    pub world_se3_rig: Vec<Iso3>,
    pub landmarks: Vec<Pt3>,
    /// Image width and height in pixels; projections outside are dropped.
    pub image_size: (Real, Real),
}

impl SyntheticRig {
    pub fn new(
        camera: PinholeCamera,
        cam_se3_rig: Vec<Iso3>,
        world_se3_rig: Vec<Iso3>,
        landmarks: Vec<Pt3>,
    ) -> Self {
        let image_size = (2.0 * camera.k.cx, 2.0 * camera.k.cy);
        Self {
            camera,
            cam_se3_rig,
            world_se3_rig,
            landmarks,
            image_size,
        }
    }

    pub fn num_cameras(&self) -> usize {
        self.cam_se3_rig.len()
    }

    pub fn num_frames(&self) -> usize {
        self.world_se3_rig.len()
    }

    /// Ground-truth localizer pose of `camera` at `frame`.
    pub fn cam_se3_world(&self, camera: usize, frame: usize) -> Iso3 {
        self.cam_se3_rig[camera] * self.world_se3_rig[frame].inverse()
    }

    /// Localization result with exact correspondences and a perturbed pose.
    ///
    /// Pixel noise is keyed by `(camera, frame)` and the landmark index.
    pub fn observe(
        &self,
        camera: usize,
        frame: usize,
        pose_noise: &PoseNoise,
        pixel_noise: &UniformPixelNoise,
    ) -> LocalizationResult {
        let truth = self.cam_se3_world(camera, frame);
        let stream = view_stream(camera, frame);
        let correspondences = self
            .landmarks
            .iter()
            .enumerate()
            .filter_map(|(idx, pw)| {
                let pc = truth * pw;
                if pc.z < 0.1 {
                    return None;
                }
                let uv = self.camera.project_point(&pc)? + pixel_noise.sample(stream, idx);
                let inside = uv.x >= 0.0
                    && uv.y >= 0.0
                    && uv.x < self.image_size.0
                    && uv.y < self.image_size.1;
                inside.then(|| Correspondence::new(idx as u64, Pt2::from(uv), *pw))
            })
            .collect();

        LocalizationResult::localized(
            pose_noise.apply(camera, frame, &truth),
            self.camera.clone(),
            correspondences,
        )
    }

    /// Full track of one camera.
    pub fn track(
        &self,
        camera: usize,
        pose_noise: &PoseNoise,
        pixel_noise: &UniformPixelNoise,
    ) -> Vec<LocalizationResult> {
        (0..self.num_frames())
            .map(|frame| self.observe(camera, frame, pose_noise, pixel_noise))
            .collect()
    }

    /// Noise-free tracks of every camera.
    pub fn exact_tracks(&self) -> Vec<Vec<LocalizationResult>> {
        (0..self.num_cameras())
            .map(|cam| self.track(cam, &PoseNoise::default(), &UniformPixelNoise::default()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_streams_keep_camera_and_frame_apart() {
        assert_eq!(view_stream(3, 7), 0x0000_0003_0000_0007);
        assert_ne!(view_stream(1, 0), view_stream(0, 1));
        assert_eq!(view_stream(0, 0xFFFF_FFFF), 0xFFFF_FFFF);
    }

    fn rig() -> SyntheticRig {
        SyntheticRig::new(
            default_camera(),
            vec![Iso3::identity(), make_iso((0.0, 0.1, 0.0), (-0.2, 0.0, 0.0))],
            rig_trajectory(4, 0.1),
            landmark_lattice(5, 4, 3, 0.5, Pt3::new(0.0, 0.0, 4.0)),
        )
    }

    #[test]
    fn lattice_is_centred() {
        let pts = landmark_lattice(3, 3, 3, 1.0, Pt3::new(1.0, 2.0, 3.0));
        assert_eq!(pts.len(), 27);
        let mean = pts.iter().fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords) / 27.0;
        assert!((mean - nalgebra::Vector3::new(1.0, 2.0, 3.0)).norm() < 1e-12);
    }

    #[test]
    fn exact_observations_reproject_perfectly() {
        let rig = rig();
        let tracks = rig.exact_tracks();
        assert_eq!(tracks.len(), 2);
        for track in &tracks {
            assert_eq!(track.len(), 4);
            for result in track {
                assert!(result.valid);
                assert!(result.num_correspondences() > 20);
                let worst = result.reprojection_errors().into_iter().fold(0.0, Real::max);
                assert!(worst < 1e-9, "worst={worst}");
            }
        }
    }

    #[test]
    fn localizer_pose_is_rig_composition() {
        let rig = rig();
        let expected = rig.cam_se3_rig[1] * rig.world_se3_rig[2].inverse();
        let (dt, ang) = crate::pose_error(&rig.cam_se3_world(1, 2), &expected);
        assert!(dt < 1e-15 && ang < 1e-12);
    }
}
