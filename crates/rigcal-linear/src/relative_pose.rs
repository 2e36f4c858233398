//! Per-camera extrinsic initialization from independent localizer poses.
//!
//! For a camera `i` and the reference camera `r`, every frame where both
//! localized yields a sample of the rig extrinsic
//!
//! `cam_se3_rig(i) = cam_se3_world(i, f) * cam_se3_world(r, f)^-1`
//!
//! (the rig frame is the reference camera frame). Samples are aggregated with
//! a consensus medoid and a geodesic L1 mean for rotation and a median of the
//! camera centres for translation, outliers are excluded, and a single
//! re-aggregation over the inliers produces the estimate.

use std::collections::BTreeMap;

use log::debug;
use rigcal_core::{rotation_angle, FrameId, Iso3, Quat, Real, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rotation_averaging::{
    chordal_mean, component_median, geodesic_l1_mean, medoid_rotation, median,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelativePoseError {
    #[error("{found} usable frames, at least {required} required")]
    InsufficientOverlap { found: usize, required: usize },
    #[error("invalid relative pose options: {0}")]
    InvalidOptions(String),
}

/// Policy knobs of the relative pose estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativePoseOptions {
    /// Minimum number of jointly valid frames, and of inliers after outlier exclusion.
    pub min_overlap_frames: usize,
    /// Samples rotated further than this from the aggregate are outliers (degrees).
    pub max_rotation_deviation_deg: Real,
    /// Samples whose camera centre is further than this from the aggregate are
    /// outliers (map units).
    pub max_translation_deviation: Real,
    /// Weiszfeld iterations of the geodesic L1 rotation mean.
    pub l1_iterations: usize,
}

impl Default for RelativePoseOptions {
    fn default() -> Self {
        Self {
            min_overlap_frames: 3,
            max_rotation_deviation_deg: 5.0,
            max_translation_deviation: 0.10,
            l1_iterations: 32,
        }
    }
}

impl RelativePoseOptions {
    pub fn validate(&self) -> Result<(), RelativePoseError> {
        if self.min_overlap_frames == 0 {
            return Err(RelativePoseError::InvalidOptions(
                "min_overlap_frames must be at least 1".into(),
            ));
        }
        let positive = |v: Real| v > 0.0;
        if !positive(self.max_rotation_deviation_deg) || !positive(self.max_translation_deviation) {
            return Err(RelativePoseError::InvalidOptions(
                "outlier thresholds must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Aggregated extrinsic together with the statistics that support it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelativePoseEstimate {
    /// Extrinsic, rig (reference camera) -> camera.
    pub cam_se3_rig: Iso3,
    /// Number of jointly valid frames.
    pub candidates: usize,
    /// Number of samples kept after outlier exclusion.
    pub inliers: usize,
    /// Frames whose sample was excluded as an outlier.
    pub rejected_frames: Vec<FrameId>,
    /// Median angular deviation of the inliers from the estimate (degrees).
    pub rotation_spread_deg: Real,
    /// Median camera-centre deviation of the inliers from the estimate.
    pub translation_spread: Real,
}

/// One relative pose sample per frame where both cameras localized.
///
/// Both maps hold `cam_se3_world` poses of valid frames only.
pub fn relative_pose_samples(
    reference: &BTreeMap<FrameId, Iso3>,
    camera: &BTreeMap<FrameId, Iso3>,
) -> Vec<(FrameId, Iso3)> {
    camera
        .iter()
        .filter_map(|(frame, cam_se3_world)| {
            reference
                .get(frame)
                .map(|ref_se3_world| (*frame, cam_se3_world * ref_se3_world.inverse()))
        })
        .collect()
}

/// Estimate `cam_se3_rig` of one camera from its valid poses and the reference's.
pub fn estimate_cam_se3_rig(
    reference: &BTreeMap<FrameId, Iso3>,
    camera: &BTreeMap<FrameId, Iso3>,
    opts: &RelativePoseOptions,
) -> Result<RelativePoseEstimate, RelativePoseError> {
    let samples = relative_pose_samples(reference, camera);
    aggregate_relative_poses(&samples, opts)
}

struct Sample {
    frame: FrameId,
    rotation: Quat,
    /// Camera centre in the rig frame.
    centre: Vec3,
}

/// Robustly aggregate relative pose samples `(frame, cam_se3_rig)`.
pub fn aggregate_relative_poses(
    samples: &[(FrameId, Iso3)],
    opts: &RelativePoseOptions,
) -> Result<RelativePoseEstimate, RelativePoseError> {
    opts.validate()?;
    if samples.len() < opts.min_overlap_frames {
        return Err(RelativePoseError::InsufficientOverlap {
            found: samples.len(),
            required: opts.min_overlap_frames,
        });
    }

    let samples: Vec<Sample> = samples
        .iter()
        .map(|(frame, pose)| Sample {
            frame: *frame,
            rotation: pose.rotation,
            centre: pose.inverse().translation.vector,
        })
        .collect();
    let max_angle = opts.max_rotation_deviation_deg.to_radians();

    // Consensus pass: medoid, then L1 mean of the samples near it.
    let rotations: Vec<Quat> = samples.iter().map(|s| s.rotation).collect();
    let medoid = medoid_rotation(&rotations)
        .map(|i| rotations[i])
        .unwrap_or_else(Quat::identity);
    let near: Vec<&Sample> = samples
        .iter()
        .filter(|s| rotation_angle(&medoid, &s.rotation) <= max_angle)
        .collect();
    let near_rotations: Vec<Quat> = near.iter().map(|s| s.rotation).collect();
    let near_centres: Vec<Vec3> = near.iter().map(|s| s.centre).collect();
    let rotation = geodesic_l1_mean(&near_rotations, medoid, opts.l1_iterations);
    let centre = component_median(&near_centres).unwrap_or_else(Vec3::zeros);

    // Outlier exclusion against the consensus aggregate.
    let (inliers, outliers): (Vec<&Sample>, Vec<&Sample>) = samples.iter().partition(|s| {
        rotation_angle(&rotation, &s.rotation) <= max_angle
            && (s.centre - centre).norm() <= opts.max_translation_deviation
    });
    if inliers.len() < opts.min_overlap_frames {
        return Err(RelativePoseError::InsufficientOverlap {
            found: inliers.len(),
            required: opts.min_overlap_frames,
        });
    }

    // Single re-aggregation over the inliers.
    let inlier_rotations: Vec<Quat> = inliers.iter().map(|s| s.rotation).collect();
    let inlier_centres: Vec<Vec3> = inliers.iter().map(|s| s.centre).collect();
    let rotation = chordal_mean(&inlier_rotations).unwrap_or(rotation);
    let centre = component_median(&inlier_centres).unwrap_or(centre);

    let rotation_spread = median(
        &inliers
            .iter()
            .map(|s| rotation_angle(&rotation, &s.rotation))
            .collect::<Vec<_>>(),
    )
    .unwrap_or(0.0);
    let translation_spread = median(
        &inliers
            .iter()
            .map(|s| (s.centre - centre).norm())
            .collect::<Vec<_>>(),
    )
    .unwrap_or(0.0);

    let rejected_frames: Vec<FrameId> = outliers.iter().map(|s| s.frame).collect();
    if !rejected_frames.is_empty() {
        debug!(
            "excluded {} of {} relative pose samples: frames {:?}",
            rejected_frames.len(),
            samples.len(),
            rejected_frames
        );
    }

    // t = -R c: the median centre expressed through the aggregated rotation.
    let translation = -(rotation * centre);
    Ok(RelativePoseEstimate {
        cam_se3_rig: Iso3::from_parts(translation.into(), rotation),
        candidates: samples.len(),
        inliers: inliers.len(),
        rejected_frames,
        rotation_spread_deg: rotation_spread.to_degrees(),
        translation_spread,
    })
}

/// Rig pose implied by one camera's localization and its extrinsic.
///
/// `world_se3_rig = cam_se3_world^-1 * cam_se3_rig`.
pub fn seed_world_se3_rig(cam_se3_world: &Iso3, cam_se3_rig: &Iso3) -> Iso3 {
    cam_se3_world.inverse() * cam_se3_rig
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcal_core::{pose_error, synthetic::make_iso};

    fn poses(
        cam_se3_rig: &Iso3,
        world_se3_rig: &[Iso3],
    ) -> (BTreeMap<FrameId, Iso3>, BTreeMap<FrameId, Iso3>) {
        let reference = world_se3_rig
            .iter()
            .enumerate()
            .map(|(f, w)| (f, w.inverse()))
            .collect();
        let camera = world_se3_rig
            .iter()
            .enumerate()
            .map(|(f, w)| (f, cam_se3_rig * w.inverse()))
            .collect();
        (reference, camera)
    }

    fn trajectory() -> Vec<Iso3> {
        vec![
            make_iso((0.2, 0.1, 0.0), (0.0, 0.0, 1.0)),
            make_iso((-0.1, 0.0, 0.15), (0.1, -0.05, 1.2)),
            make_iso((0.05, -0.2, 0.1), (-0.2, 0.05, 1.1)),
            make_iso((0.0, 0.1, -0.1), (0.05, 0.1, 0.9)),
            make_iso((0.3, -0.1, 0.2), (0.4, 0.0, 0.7)),
        ]
    }

    #[test]
    fn exact_samples_recover_extrinsic() {
        let gt = make_iso((0.1, -0.05, 0.2), (0.2, -0.1, 0.0));
        let (reference, camera) = poses(&gt, &trajectory());

        let est =
            estimate_cam_se3_rig(&reference, &camera, &RelativePoseOptions::default()).unwrap();
        let (dt, ang) = pose_error(&est.cam_se3_rig, &gt);
        assert!(dt < 1e-10, "translation error {}", dt);
        assert!(ang < 1e-10, "rotation error {}", ang);
        assert_eq!(est.candidates, 5);
        assert_eq!(est.inliers, 5);
        assert!(est.rejected_frames.is_empty());
    }

    #[test]
    fn only_jointly_valid_frames_are_used() {
        let gt = make_iso((0.0, 0.0, 0.0), (0.1, 0.0, 0.0));
        let (reference, mut camera) = poses(&gt, &trajectory());
        camera.remove(&1);
        camera.remove(&3);
        let samples = relative_pose_samples(&reference, &camera);
        assert_eq!(samples.iter().map(|s| s.0).collect::<Vec<_>>(), vec![0, 2, 4]);

        camera.remove(&4);
        let err = estimate_cam_se3_rig(&reference, &camera, &RelativePoseOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            RelativePoseError::InsufficientOverlap {
                found: 2,
                required: 3
            }
        );
    }

    #[test]
    fn translation_outlier_is_excluded() {
        let gt = make_iso((0.0, 0.05, 0.0), (0.1, 0.0, 0.0));
        let mut samples: Vec<(FrameId, Iso3)> = (0..6).map(|f| (f, gt)).collect();
        samples[2].1 = Iso3::from_parts(
            (gt.translation.vector + Vec3::new(0.0, 1.0, 0.0)).into(),
            gt.rotation,
        );

        let est = aggregate_relative_poses(&samples, &RelativePoseOptions::default()).unwrap();
        assert_eq!(est.rejected_frames, vec![2]);
        let (dt, ang) = pose_error(&est.cam_se3_rig, &gt);
        assert!(dt < 1e-12 && ang < 1e-12, "dt {} ang {}", dt, ang);
    }

    #[test]
    fn too_few_inliers_fail() {
        let gt = Iso3::translation(0.1, 0.0, 0.0);
        let far = make_iso((1.0, 0.0, 0.0), (0.1, 0.0, 0.0));
        let samples = vec![
            (0, gt),
            (1, gt),
            (2, far),
            (3, make_iso((0.0, 1.0, 0.0), (0.0, 0.0, 0.0))),
        ];
        let err = aggregate_relative_poses(&samples, &RelativePoseOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            RelativePoseError::InsufficientOverlap { found: 2, required: 3 }
        ));
    }

    #[test]
    fn seed_from_camera_matches_reference_pose() {
        let gt = make_iso((0.1, 0.0, -0.1), (0.1, 0.02, 0.0));
        let world_se3_rig = make_iso((0.3, 0.2, 0.1), (1.0, 2.0, 3.0));
        let cam_se3_world = gt * world_se3_rig.inverse();
        let seeded = seed_world_se3_rig(&cam_se3_world, &gt);
        let (dt, ang) = pose_error(&seeded, &world_se3_rig);
        assert!(dt < 1e-12 && ang < 1e-12);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let opts = RelativePoseOptions {
            min_overlap_frames: 0,
            ..Default::default()
        };
        assert!(matches!(
            aggregate_relative_poses(&[], &opts),
            Err(RelativePoseError::InvalidOptions(_))
        ));
    }
}
