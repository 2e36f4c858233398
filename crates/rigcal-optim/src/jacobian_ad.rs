//! Per-correspondence Jacobians using `num-dual`.
//!
//! Each reprojection residual depends on exactly two 6-DoF blocks: the
//! camera extrinsic and the frame's rig pose. Autodiff therefore runs over a
//! local 12-vector `[cam_delta (6), rig_delta (6)]` instead of the global
//! parameter vector, and callers scatter the two 2x6 halves where needed.

use nalgebra::{SMatrix, SVector, Vector2};
use num_dual::{jacobian, DualSVec64};
use rigcal_core::{Iso3, Pt2, Pt3};

use crate::factors::{rig_reprojection_residual, ProjectionConsts};

pub(crate) const BLOCK_DIM: usize = 6;
pub(crate) const LOCAL_DIM: usize = 2 * BLOCK_DIM;

pub(crate) type LocalJacobian = SMatrix<f64, 2, LOCAL_DIM>;

/// Residual and Jacobian of one correspondence at `local = [cam_delta, rig_delta]`.
pub(crate) fn residual_and_jacobian(
    local: &SVector<f64, LOCAL_DIM>,
    cam_se3_rig: &Iso3,
    rig_se3_world: &Iso3,
    intr: &ProjectionConsts,
    pw: &Pt3,
    uv: &Pt2,
) -> (Vector2<f64>, LocalJacobian) {
    jacobian(
        |p: SVector<DualSVec64<LOCAL_DIM>, LOCAL_DIM>| {
            let p = p.as_slice();
            rig_reprojection_residual(
                &p[..BLOCK_DIM],
                &p[BLOCK_DIM..],
                cam_se3_rig,
                rig_se3_world,
                intr,
                pw,
                uv,
            )
        },
        *local,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::rig_reprojection_residual_at;
    use rigcal_core::synthetic::{default_camera, make_iso};
    use rigcal_core::{retract_pose, Vec6};

    #[test]
    fn autodiff_matches_central_differences() {
        let intr = ProjectionConsts::from(&default_camera());
        let cam_se3_rig = make_iso((0.02, 0.05, -0.01), (0.1, 0.01, 0.0));
        let rig_se3_world = make_iso((0.1, -0.05, 0.2), (0.3, -0.2, 0.5));
        let pw = Pt3::new(0.4, -0.3, 4.0);
        let uv = Pt2::new(650.0, 350.0);

        let (r, j) = residual_and_jacobian(
            &SVector::zeros(),
            &cam_se3_rig,
            &rig_se3_world,
            &intr,
            &pw,
            &uv,
        );
        let r0 = rig_reprojection_residual_at(&cam_se3_rig, &rig_se3_world, &intr, &pw, &uv);
        assert!((r - r0).norm() < 1e-12);

        let h = 1e-6;
        for k in 0..LOCAL_DIM {
            let eval = |s: f64| {
                let mut d = Vec6::zeros();
                d[k % BLOCK_DIM] = s;
                let (cam, rig) = if k < BLOCK_DIM {
                    (retract_pose(&cam_se3_rig, &d), rig_se3_world)
                } else {
                    (cam_se3_rig, retract_pose(&rig_se3_world, &d))
                };
                rig_reprojection_residual_at(&cam, &rig, &intr, &pw, &uv)
            };
            let fd = (eval(h) - eval(-h)) / (2.0 * h);
            let ad = j.column(k);
            assert!(
                (fd - ad).norm() < 1e-4 * (1.0 + ad.norm()),
                "column {} fd={} ad={}",
                k,
                fd,
                ad
            );
        }
    }
}
