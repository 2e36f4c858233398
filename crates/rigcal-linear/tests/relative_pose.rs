use std::collections::BTreeMap;

use nalgebra::Vector3;
use rigcal_core::synthetic::{
    default_camera, landmark_lattice, make_iso, rig_trajectory, PoseNoise, SyntheticRig,
    UniformPixelNoise,
};
use rigcal_core::{pose_error, FrameId, Iso3, Pt3, Quat};
use rigcal_linear::{
    aggregate_relative_poses, chordal_mean, estimate_cam_se3_rig, RelativePoseOptions,
};

fn valid_poses(rig: &SyntheticRig, cam: usize, noise: &PoseNoise) -> BTreeMap<FrameId, Iso3> {
    rig.track(cam, noise, &UniformPixelNoise::default())
        .into_iter()
        .enumerate()
        .filter(|(_, r)| r.valid)
        .map(|(f, r)| (f, r.cam_se3_world))
        .collect()
}

#[test]
fn zero_noise_rig_recovers_every_extrinsic() {
    let gt = vec![
        Iso3::identity(),
        make_iso((0.0, 0.0, 0.0), (0.10, 0.0, 0.0)),
        make_iso((0.05, -0.3, 0.02), (-0.25, 0.05, 0.1)),
    ];
    let rig = SyntheticRig::new(
        default_camera(),
        gt.clone(),
        rig_trajectory(6, 0.2),
        landmark_lattice(4, 4, 2, 0.5, Pt3::new(0.0, 0.0, 4.0)),
    );
    let reference = valid_poses(&rig, 0, &PoseNoise::default());
    for (cam, truth) in gt.iter().enumerate().skip(1) {
        let camera = valid_poses(&rig, cam, &PoseNoise::default());
        let est = estimate_cam_se3_rig(&reference, &camera, &RelativePoseOptions::default())
            .expect("estimate");
        let (dt, ang) = pose_error(&est.cam_se3_rig, truth);
        assert!(dt < 1e-9, "camera {} translation error {}", cam, dt);
        assert!(ang < 1e-9, "camera {} rotation error {}", cam, ang);
    }
}

#[test]
fn ninety_degree_sample_barely_moves_the_aggregate() {
    let gt = make_iso((0.02, 0.1, -0.03), (0.1, 0.0, 0.0));
    let mut samples: Vec<(FrameId, Iso3)> = (0..9)
        .map(|f| {
            // small consistent jitter
            let e = 2e-4 * (f as f64 - 4.0);
            let jitter = make_iso((e, -e, 0.5 * e), (e, 0.0, -e));
            (f, jitter * gt)
        })
        .collect();
    let outlier_rot = Quat::from_scaled_axis(Vector3::new(std::f64::consts::FRAC_PI_2, 0.0, 0.0));
    samples.push((9, Iso3::from_parts(gt.translation, outlier_rot * gt.rotation)));

    let robust = aggregate_relative_poses(&samples, &RelativePoseOptions::default()).unwrap();
    let (robust_dt, robust_ang) = pose_error(&robust.cam_se3_rig, &gt);
    assert_eq!(robust.rejected_frames, vec![9]);
    assert!(robust_ang < 1e-3, "robust rotation shift {}", robust_ang);
    assert!(robust_dt < 1e-2, "robust translation shift {}", robust_dt);

    let rotations: Vec<Quat> = samples.iter().map(|s| s.1.rotation).collect();
    let naive = chordal_mean(&rotations).unwrap();
    let naive_ang = naive.angle_to(&gt.rotation);
    assert!(naive_ang > 0.1, "naive mean shift {}", naive_ang);
    assert!(naive_ang > 100.0 * robust_ang);
}

#[test]
fn noisy_poses_stay_close_to_ground_truth() {
    let gt = make_iso((0.0, 0.2, 0.0), (0.15, -0.02, 0.0));
    let rig = SyntheticRig::new(
        default_camera(),
        vec![Iso3::identity(), gt],
        rig_trajectory(25, 0.1),
        landmark_lattice(4, 4, 2, 0.5, Pt3::new(0.0, 0.0, 4.0)),
    );
    let noise = PoseNoise {
        seed: 11,
        max_rotation_rad: 0.002,
        max_translation: 0.005,
    };
    let reference = valid_poses(&rig, 0, &noise);
    let camera = valid_poses(&rig, 1, &noise);
    let est = estimate_cam_se3_rig(&reference, &camera, &RelativePoseOptions::default()).unwrap();
    let (dt, ang) = pose_error(&est.cam_se3_rig, &gt);
    assert!(dt < 0.02, "translation error {}", dt);
    assert!(ang < 0.005, "rotation error {}", ang);
    assert_eq!(est.candidates, 25);
}
