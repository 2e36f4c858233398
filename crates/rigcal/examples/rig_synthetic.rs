//! Synthetic three-camera rig calibration.
//!
//! Builds noisy localization tracks from a known rig, runs both stages and
//! compares the recovered extrinsics with ground truth.

use anyhow::{ensure, Result};
use rigcal::core::synthetic::{
    default_camera, landmark_lattice, make_iso, rig_trajectory, PoseNoise, SyntheticRig,
    UniformPixelNoise,
};
use rigcal::prelude::*;

fn main() -> Result<()> {
    env_logger::init();

    // Ground truth extrinsics: rig -> camera, camera 0 is the rig frame
    let rig = SyntheticRig::new(
        default_camera(),
        vec![
            Iso3::identity(),
            make_iso((0.0, 0.05, 0.0), (0.12, 0.0, 0.0)),
            make_iso((0.01, -0.15, 0.0), (-0.2, 0.03, 0.05)),
        ],
        rig_trajectory(20, 0.08),
        landmark_lattice(6, 5, 3, 0.4, Pt3::new(0.0, 0.0, 4.0)),
    );
    let pose_noise = PoseNoise {
        seed: 7,
        max_rotation_rad: 0.003,
        max_translation: 0.01,
    };
    let pixel_noise = UniformPixelNoise {
        seed: 11,
        max_abs_px: 0.5,
    };

    let mut calib = RigCalibration::new();
    for camera in 0..rig.num_cameras() {
        let mut track = rig.track(camera, &pose_noise, &pixel_noise);
        // Localizer dropouts
        if camera > 0 {
            track[camera * 3] = LocalizationResult::not_localized(default_camera());
        }
        calib.set_tracking_result(track, camera)?;
    }

    let init = calib.initialize_calibration()?;
    ensure!(init.failed_cameras().is_empty(), "unexpected failed cameras");
    let initial = calib.extrinsics();

    let refined = calib.optimize_calibration()?;
    if let Some(warning) = refined.warning() {
        println!("refinement rejected: {warning}");
    }

    for (camera, cam_se3_rig) in calib.extrinsics() {
        let (dt_init, ang_init) = pose_error(&initial[&camera], &rig.cam_se3_rig[camera]);
        let (dt, ang) = pose_error(&cam_se3_rig, &rig.cam_se3_rig[camera]);
        println!(
            "camera {camera}: init {:.2} mm / {:.4} deg, refined {:.2} mm / {:.4} deg",
            dt_init * 1e3,
            ang_init.to_degrees(),
            dt * 1e3,
            ang.to_degrees()
        );
    }
    if let Some(after) = refined.summary.after {
        println!(
            "reprojection rms {:.3} px -> {:.3} px",
            refined.summary.before.rms, after.rms
        );
    }

    Ok(())
}
