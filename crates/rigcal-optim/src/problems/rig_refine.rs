//! Joint refinement of camera extrinsics and rig trajectory.
//!
//! Unknowns are one `cam_se3_rig` per camera and one `rig_se3_world` per
//! frame. Every 2D-3D correspondence seen by camera `c` at frame `f`
//! contributes the residual
//!
//! ```text
//! project(K_c, cam_se3_rig[c] * rig_se3_world[f] * X) - uv
//! ```
//!
//! Intrinsics and landmarks are held fixed. Cameras listed as fixed (at least
//! the reference camera, which pins the rig frame) keep their extrinsic;
//! frames with too few correspondences keep their pose.

use log::{debug, warn};
use nalgebra::{DMatrix, DVector, Matrix2x6, SVector};
use rigcal_core::{retract_pose, Iso3, PinholeCamera, Pt2, Pt3, Real, Vec6};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::factors::{rig_reprojection_residual_at, ProjectionConsts};
use crate::jacobian_ad::{residual_and_jacobian, BLOCK_DIM, LOCAL_DIM};
use crate::schur::{BlockLeastSquares, BlockStep, BlockSystem, SchurLmBackend};
use crate::{
    LmBackend, NllsProblem, NllsSolverBackend, RobustKernel, SolveOptions, SolveReport,
    Termination,
};

#[derive(Debug, Clone, Error)]
pub enum RefineError {
    #[error("invalid refinement problem: {0}")]
    InvalidProblem(String),
    /// The solver ran but its result was rejected.
    #[error("refinement diverged: {reason}")]
    Diverged { reason: String, report: SolveReport },
}

/// Correspondences of one camera at one frame.
#[derive(Debug, Clone)]
pub struct RigViewObservations {
    pub camera: usize,
    pub frame: usize,
    pub model: PinholeCamera,
    pub points_3d: Vec<Pt3>,
    pub points_2d: Vec<Pt2>,
}

impl RigViewObservations {
    pub fn new(
        camera: usize,
        frame: usize,
        model: PinholeCamera,
        points_3d: Vec<Pt3>,
        points_2d: Vec<Pt2>,
    ) -> Result<Self, RefineError> {
        if points_3d.len() != points_2d.len() {
            return Err(RefineError::InvalidProblem(format!(
                "3D/2D point count mismatch: {} vs {}",
                points_3d.len(),
                points_2d.len()
            )));
        }
        Ok(Self {
            camera,
            frame,
            model,
            points_3d,
            points_2d,
        })
    }

    pub fn len(&self) -> usize {
        self.points_3d.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points_3d.is_empty()
    }
}

/// All views of a refinement problem, with dense camera and frame indices.
#[derive(Debug, Clone)]
pub struct RigRefineDataset {
    pub num_cameras: usize,
    pub num_frames: usize,
    pub views: Vec<RigViewObservations>,
}

impl RigRefineDataset {
    pub fn new(
        num_cameras: usize,
        num_frames: usize,
        views: Vec<RigViewObservations>,
    ) -> Result<Self, RefineError> {
        for (idx, view) in views.iter().enumerate() {
            if view.camera >= num_cameras || view.frame >= num_frames {
                return Err(RefineError::InvalidProblem(format!(
                    "view {} references camera {} / frame {} outside {}x{}",
                    idx, view.camera, view.frame, num_cameras, num_frames
                )));
            }
            if view.points_3d.len() != view.points_2d.len() {
                return Err(RefineError::InvalidProblem(format!(
                    "view {} has {} 3D points but {} 2D points",
                    idx,
                    view.points_3d.len(),
                    view.points_2d.len()
                )));
            }
        }
        Ok(Self {
            num_cameras,
            num_frames,
            views,
        })
    }

    /// Total number of correspondences.
    pub fn num_observations(&self) -> usize {
        self.views.iter().map(RigViewObservations::len).sum()
    }
}

/// Current estimate of every extrinsic and rig pose.
#[derive(Debug, Clone, PartialEq)]
pub struct RigRefineParams {
    pub cam_se3_rig: Vec<Iso3>,
    pub rig_se3_world: Vec<Iso3>,
}

/// Which solver drives the refinement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefineBackend {
    /// Block LM with the frame poses eliminated through the Schur complement.
    #[default]
    Schur,
    /// Dense LM over the full Jacobian; for small problems and cross-checks.
    DenseLm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigRefineOptions {
    pub robust_loss: RobustKernel,
    /// Frames with fewer correspondences keep their initial pose. Cameras
    /// need the same number of correspondences to be refined.
    pub min_frame_observations: usize,
    pub backend: RefineBackend,
    pub solve: SolveOptions,
    /// Reject the result when the final cost exceeds this multiple of the
    /// initial cost.
    pub divergence_ratio: Real,
}

impl Default for RigRefineOptions {
    fn default() -> Self {
        Self {
            robust_loss: RobustKernel::Huber { delta: 2.0 },
            min_frame_observations: 3,
            backend: RefineBackend::Schur,
            solve: SolveOptions::default(),
            divergence_ratio: 10.0,
        }
    }
}

/// Summary of per-correspondence reprojection errors (pixels).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResidualStats {
    pub count: usize,
    pub mean: Real,
    pub median: Real,
    pub rms: Real,
    pub max: Real,
}

impl ResidualStats {
    pub fn from_errors(errors: &[Real]) -> Self {
        if errors.is_empty() {
            return Self::default();
        }
        let n = errors.len() as Real;
        let mut sorted = errors.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            0.5 * (sorted[mid - 1] + sorted[mid])
        } else {
            sorted[mid]
        };
        Self {
            count: errors.len(),
            mean: errors.iter().sum::<Real>() / n,
            median,
            rms: (errors.iter().map(|e| e * e).sum::<Real>() / n).sqrt(),
            max: sorted[sorted.len() - 1],
        }
    }
}

#[derive(Debug, Clone)]
pub struct RigRefineResult {
    pub params: RigRefineParams,
    pub report: SolveReport,
    pub before: ResidualStats,
    pub after: ResidualStats,
}

/// Refinement problem with its free-block layout resolved.
#[derive(Debug, Clone)]
pub struct RigRefineProblem {
    dataset: RigRefineDataset,
    intrinsics: Vec<ProjectionConsts>,
    camera_slots: Vec<Option<usize>>,
    /// Cameras with at least `min_frame_observations` correspondences.
    constrained_cameras: Vec<bool>,
    frame_slots: Vec<Option<usize>>,
    num_free_cameras: usize,
    num_free_frames: usize,
    robust_loss: RobustKernel,
}

fn assign_slots(free: impl Iterator<Item = bool>) -> (Vec<Option<usize>>, usize) {
    let mut next = 0;
    let slots = free
        .map(|is_free| {
            is_free.then(|| {
                next += 1;
                next - 1
            })
        })
        .collect();
    (slots, next)
}

impl RigRefineProblem {
    /// Resolve which blocks are optimized.
    ///
    /// A camera is free unless listed in `fixed_cameras` or observed by fewer
    /// than `min_frame_observations` correspondences; the same threshold
    /// applies per frame.
    pub fn new(
        dataset: RigRefineDataset,
        fixed_cameras: &[usize],
        opts: &RigRefineOptions,
    ) -> Result<Self, RefineError> {
        opts.robust_loss.validate().map_err(RefineError::InvalidProblem)?;
        if let Some(&bad) = fixed_cameras.iter().find(|&&c| c >= dataset.num_cameras) {
            return Err(RefineError::InvalidProblem(format!(
                "fixed camera {} out of range (num_cameras = {})",
                bad, dataset.num_cameras
            )));
        }

        let mut per_camera = vec![0usize; dataset.num_cameras];
        let mut per_frame = vec![0usize; dataset.num_frames];
        for view in &dataset.views {
            per_camera[view.camera] += view.len();
            per_frame[view.frame] += view.len();
        }
        let min_obs = opts.min_frame_observations.max(1);

        let constrained_cameras: Vec<bool> = per_camera.iter().map(|&n| n >= min_obs).collect();
        let (camera_slots, num_free_cameras) = assign_slots(
            constrained_cameras
                .iter()
                .enumerate()
                .map(|(c, &ok)| ok && !fixed_cameras.contains(&c)),
        );
        let (frame_slots, num_free_frames) =
            assign_slots(per_frame.iter().map(|&n| n >= min_obs));

        let held = per_frame.iter().filter(|&&n| n > 0 && n < min_obs).count();
        if held > 0 {
            debug!(
                "{} frames with fewer than {} correspondences keep their pose",
                held, min_obs
            );
        }

        let intrinsics = dataset
            .views
            .iter()
            .map(|v| ProjectionConsts::from(&v.model))
            .collect();

        Ok(Self {
            dataset,
            intrinsics,
            camera_slots,
            constrained_cameras,
            frame_slots,
            num_free_cameras,
            num_free_frames,
            robust_loss: opts.robust_loss,
        })
    }

    pub fn dataset(&self) -> &RigRefineDataset {
        &self.dataset
    }

    pub fn num_free_cameras(&self) -> usize {
        self.num_free_cameras
    }

    pub fn num_free_frames(&self) -> usize {
        self.num_free_frames
    }

    pub fn num_observations(&self) -> usize {
        self.dataset.num_observations()
    }

    pub fn is_camera_free(&self, camera: usize) -> bool {
        matches!(self.camera_slots.get(camera), Some(Some(_)))
    }

    /// Enough correspondences to take part in the refinement, whether or
    /// not the extrinsic itself is held fixed.
    pub fn is_camera_constrained(&self, camera: usize) -> bool {
        self.constrained_cameras.get(camera).copied().unwrap_or(false)
    }

    pub fn is_frame_free(&self, frame: usize) -> bool {
        matches!(self.frame_slots.get(frame), Some(Some(_)))
    }

    fn num_params(&self) -> usize {
        BLOCK_DIM * (self.num_free_cameras + self.num_free_frames)
    }

    fn check_params(&self, params: &RigRefineParams) -> Result<(), RefineError> {
        if params.cam_se3_rig.len() != self.dataset.num_cameras
            || params.rig_se3_world.len() != self.dataset.num_frames
        {
            return Err(RefineError::InvalidProblem(format!(
                "initial guess has {} extrinsics / {} rig poses, expected {} / {}",
                params.cam_se3_rig.len(),
                params.rig_se3_world.len(),
                self.dataset.num_cameras,
                self.dataset.num_frames
            )));
        }
        Ok(())
    }

    fn for_each_residual(&self, params: &RigRefineParams, mut f: impl FnMut(Real)) {
        for (view, intr) in self.dataset.views.iter().zip(&self.intrinsics) {
            let cam = &params.cam_se3_rig[view.camera];
            let rig = &params.rig_se3_world[view.frame];
            for (pw, uv) in view.points_3d.iter().zip(&view.points_2d) {
                f(rig_reprojection_residual_at(cam, rig, intr, pw, uv).norm_squared());
            }
        }
    }

    /// Robust cost `sum rho(|r|^2)` over all correspondences.
    pub fn cost(&self, params: &RigRefineParams) -> Real {
        let mut total = 0.0;
        self.for_each_residual(params, |r2| total += self.robust_loss.rho_and_weight(r2).0);
        total
    }

    /// Reprojection error (pixels) of every correspondence, in view order.
    pub fn reprojection_errors(&self, params: &RigRefineParams) -> Vec<Real> {
        let mut errors = Vec::with_capacity(self.num_observations());
        self.for_each_residual(params, |r2| errors.push(r2.sqrt()));
        errors
    }

    /// Apply a dense delta vector laid out as `[free cameras.., free frames..]`.
    pub fn apply_deltas(&self, base: &RigRefineParams, x: &DVector<Real>) -> RigRefineParams {
        let block =
            |slot: usize| -> Vec6 { x.fixed_rows::<BLOCK_DIM>(BLOCK_DIM * slot).into_owned() };
        RigRefineParams {
            cam_se3_rig: base
                .cam_se3_rig
                .iter()
                .zip(&self.camera_slots)
                .map(|(pose, slot)| match slot {
                    Some(s) => retract_pose(pose, &block(*s)),
                    None => *pose,
                })
                .collect(),
            rig_se3_world: base
                .rig_se3_world
                .iter()
                .zip(&self.frame_slots)
                .map(|(pose, slot)| match slot {
                    Some(s) => retract_pose(pose, &block(self.num_free_cameras + s)),
                    None => *pose,
                })
                .collect(),
        }
    }
}

impl BlockLeastSquares for RigRefineProblem {
    type Params = RigRefineParams;

    fn linearize(&self, params: &RigRefineParams) -> BlockSystem {
        let mut system = BlockSystem::new(self.num_free_cameras, self.num_free_frames);
        let zero = SVector::<Real, LOCAL_DIM>::zeros();
        for (view, intr) in self.dataset.views.iter().zip(&self.intrinsics) {
            let cam_slot = self.camera_slots[view.camera];
            let frame_slot = self.frame_slots[view.frame];
            let cam = &params.cam_se3_rig[view.camera];
            let rig = &params.rig_se3_world[view.frame];
            for (pw, uv) in view.points_3d.iter().zip(&view.points_2d) {
                if cam_slot.is_none() && frame_slot.is_none() {
                    let r2 = rig_reprojection_residual_at(cam, rig, intr, pw, uv).norm_squared();
                    system.cost += self.robust_loss.rho_and_weight(r2).0;
                    continue;
                }
                let (r, j) = residual_and_jacobian(&zero, cam, rig, intr, pw, uv);
                let (rho, w) = self.robust_loss.rho_and_weight(r.norm_squared());
                system.cost += rho;
                let j_cam: Matrix2x6<Real> = j.fixed_view::<2, BLOCK_DIM>(0, 0).into_owned();
                let j_rig: Matrix2x6<Real> =
                    j.fixed_view::<2, BLOCK_DIM>(0, BLOCK_DIM).into_owned();
                system.add_residual(cam_slot, frame_slot, &j_cam, &j_rig, &r, w);
            }
        }
        system
    }

    fn cost(&self, params: &RigRefineParams) -> Real {
        RigRefineProblem::cost(self, params)
    }

    fn retract(&self, params: &RigRefineParams, step: &BlockStep) -> RigRefineParams {
        RigRefineParams {
            cam_se3_rig: params
                .cam_se3_rig
                .iter()
                .zip(&self.camera_slots)
                .map(|(pose, slot)| match slot {
                    Some(s) => retract_pose(pose, &step.cameras[*s]),
                    None => *pose,
                })
                .collect(),
            rig_se3_world: params
                .rig_se3_world
                .iter()
                .zip(&self.frame_slots)
                .map(|(pose, slot)| match slot {
                    Some(s) => retract_pose(pose, &step.poses[*s]),
                    None => *pose,
                })
                .collect(),
        }
    }
}

/// Dense view of a [`RigRefineProblem`]: parameters are left perturbations of
/// `base`, stacked as `[free cameras.., free frames..]`.
pub struct RigDenseProblem<'a> {
    pub problem: &'a RigRefineProblem,
    pub base: &'a RigRefineParams,
}

impl RigDenseProblem<'_> {
    fn local_delta(
        &self,
        x: &DVector<Real>,
        view: &RigViewObservations,
    ) -> (SVector<Real, LOCAL_DIM>, Option<usize>, Option<usize>) {
        let p = self.problem;
        let cam_col = p.camera_slots[view.camera].map(|s| BLOCK_DIM * s);
        let rig_col = p.frame_slots[view.frame].map(|s| BLOCK_DIM * (p.num_free_cameras + s));
        let mut local = SVector::<Real, LOCAL_DIM>::zeros();
        if let Some(col) = cam_col {
            local
                .fixed_rows_mut::<BLOCK_DIM>(0)
                .copy_from(&x.fixed_rows::<BLOCK_DIM>(col));
        }
        if let Some(col) = rig_col {
            local
                .fixed_rows_mut::<BLOCK_DIM>(BLOCK_DIM)
                .copy_from(&x.fixed_rows::<BLOCK_DIM>(col));
        }
        (local, cam_col, rig_col)
    }

    fn evaluate(
        &self,
        x: &DVector<Real>,
        mut jacobian: Option<&mut DMatrix<Real>>,
    ) -> DVector<Real> {
        let p = self.problem;
        let mut r = DVector::zeros(self.num_residuals());
        let mut row = 0;
        for (view, intr) in p.dataset.views.iter().zip(&p.intrinsics) {
            let (local, cam_col, rig_col) = self.local_delta(x, view);
            let cam = &self.base.cam_se3_rig[view.camera];
            let rig = &self.base.rig_se3_world[view.frame];
            for (pw, uv) in view.points_3d.iter().zip(&view.points_2d) {
                let (res, j) = residual_and_jacobian(&local, cam, rig, intr, pw, uv);
                r.fixed_rows_mut::<2>(row).copy_from(&res);
                if let Some(jac) = jacobian.as_deref_mut() {
                    if let Some(col) = cam_col {
                        jac.fixed_view_mut::<2, BLOCK_DIM>(row, col)
                            .copy_from(&j.fixed_view::<2, BLOCK_DIM>(0, 0));
                    }
                    if let Some(col) = rig_col {
                        jac.fixed_view_mut::<2, BLOCK_DIM>(row, col)
                            .copy_from(&j.fixed_view::<2, BLOCK_DIM>(0, BLOCK_DIM));
                    }
                }
                row += 2;
            }
        }
        r
    }
}

impl NllsProblem for RigDenseProblem<'_> {
    fn num_params(&self) -> usize {
        self.problem.num_params()
    }

    fn num_residuals(&self) -> usize {
        2 * self.problem.num_observations()
    }

    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
        self.evaluate(x, None)
    }

    fn jacobian_unweighted(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let mut jac = DMatrix::zeros(self.num_residuals(), self.num_params());
        self.evaluate(x, Some(&mut jac));
        jac
    }

    fn robust_row_scales(&self, r_unweighted: &DVector<Real>) -> DVector<Real> {
        let mut scales = DVector::from_element(r_unweighted.len(), 1.0);
        for i in 0..r_unweighted.len() / 2 {
            let r2 = r_unweighted[2 * i].powi(2) + r_unweighted[2 * i + 1].powi(2);
            let s = self.problem.robust_loss.rho_and_weight(r2).1.sqrt();
            scales[2 * i] = s;
            scales[2 * i + 1] = s;
        }
        scales
    }
}

/// Refine extrinsics and rig poses from `init`.
///
/// The result is rejected with [`RefineError::Diverged`] when the cost ends
/// non-finite, grows past `divergence_ratio` times its initial value, or the
/// solver stops without converging.
pub fn optimize_rig_extrinsics(
    problem: &RigRefineProblem,
    init: &RigRefineParams,
    opts: &RigRefineOptions,
) -> Result<RigRefineResult, RefineError> {
    problem.check_params(init)?;
    let initial_cost = problem.cost(init);
    if !initial_cost.is_finite() {
        return Err(RefineError::InvalidProblem(
            "initial cost is not finite".to_string(),
        ));
    }
    let before = ResidualStats::from_errors(&problem.reprojection_errors(init));

    if problem.num_params() == 0 {
        debug!("rig refinement has no free parameters");
        return Ok(RigRefineResult {
            params: init.clone(),
            report: SolveReport::new(0, initial_cost, initial_cost, Termination::Converged),
            before,
            after: before,
        });
    }

    debug!(
        "refining {} cameras and {} frames from {} correspondences ({:?})",
        problem.num_free_cameras,
        problem.num_free_frames,
        problem.num_observations(),
        opts.backend
    );
    let (params, mut report) = match opts.backend {
        RefineBackend::Schur => SchurLmBackend.solve(problem, init.clone(), &opts.solve),
        RefineBackend::DenseLm => {
            let dense = RigDenseProblem {
                problem,
                base: init,
            };
            let x0 = DVector::zeros(problem.num_params());
            let (x, report) = LmBackend.solve(&dense, x0, &opts.solve);
            (problem.apply_deltas(init, &x), report)
        }
    };

    let final_cost = problem.cost(&params);
    report.initial_cost = initial_cost;
    report.final_cost = final_cost;

    let reason = if !final_cost.is_finite() {
        Some("cost became non-finite".to_string())
    } else if final_cost > opts.divergence_ratio * initial_cost.max(Real::EPSILON) {
        Some(format!(
            "final cost {:.6e} exceeds {} x initial cost {:.6e}",
            final_cost, opts.divergence_ratio, initial_cost
        ))
    } else if !report.converged {
        Some(format!(
            "solver stopped without converging ({:?} after {} iterations)",
            report.termination, report.iterations
        ))
    } else {
        None
    };
    if let Some(reason) = reason {
        warn!("rig refinement rejected: {}", reason);
        return Err(RefineError::Diverged { reason, report });
    }

    let after = ResidualStats::from_errors(&problem.reprojection_errors(&params));
    Ok(RigRefineResult {
        params,
        report,
        before,
        after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcal_core::synthetic::default_camera;

    fn single_view(n: usize) -> RigRefineDataset {
        let pts: Vec<Pt3> = (0..n).map(|i| Pt3::new(0.1 * i as Real, 0.0, 3.0)).collect();
        let uv = vec![Pt2::new(640.0, 360.0); n];
        let view = RigViewObservations::new(0, 0, default_camera(), pts, uv).unwrap();
        RigRefineDataset::new(2, 1, vec![view]).unwrap()
    }

    #[test]
    fn stats_cover_odd_and_even_sets() {
        let s = ResidualStats::from_errors(&[3.0, 1.0, 2.0]);
        assert_eq!(s.count, 3);
        assert_eq!(s.median, 2.0);
        assert_eq!(s.max, 3.0);
        assert!((s.mean - 2.0).abs() < 1e-12);
        assert!((s.rms - (14.0 / 3.0 as Real).sqrt()).abs() < 1e-12);
        assert_eq!(ResidualStats::from_errors(&[1.0, 4.0]).median, 2.5);
        assert_eq!(ResidualStats::from_errors(&[]), ResidualStats::default());
    }

    #[test]
    fn dataset_rejects_out_of_range_views() {
        let view = RigViewObservations::new(3, 0, default_camera(), vec![], vec![]).unwrap();
        assert!(matches!(
            RigRefineDataset::new(2, 1, vec![view]),
            Err(RefineError::InvalidProblem(_))
        ));
        assert!(
            RigViewObservations::new(0, 0, default_camera(), vec![Pt3::origin()], vec![]).is_err()
        );
    }

    #[test]
    fn layout_respects_fixed_cameras_and_thresholds() {
        let opts = RigRefineOptions::default();
        let problem = RigRefineProblem::new(single_view(5), &[], &opts).unwrap();
        assert!(problem.is_camera_free(0));
        // camera 1 has no observations
        assert!(!problem.is_camera_free(1));
        assert!(problem.is_frame_free(0));

        let problem = RigRefineProblem::new(single_view(5), &[0], &opts).unwrap();
        assert_eq!(problem.num_free_cameras(), 0);
        assert!(problem.is_camera_constrained(0));
        assert!(!problem.is_camera_constrained(1));
        assert_eq!(problem.num_free_frames(), 1);

        let problem = RigRefineProblem::new(single_view(2), &[0], &opts).unwrap();
        assert!(!problem.is_frame_free(0));
        assert!(RigRefineProblem::new(single_view(2), &[7], &opts).is_err());
    }

    #[test]
    fn nothing_free_returns_input() {
        let opts = RigRefineOptions::default();
        let problem = RigRefineProblem::new(single_view(2), &[0], &opts).unwrap();
        let init = RigRefineParams {
            cam_se3_rig: vec![Iso3::identity(); 2],
            rig_se3_world: vec![Iso3::identity()],
        };
        let result = optimize_rig_extrinsics(&problem, &init, &opts).unwrap();
        assert_eq!(result.params, init);
        assert_eq!(result.report.termination, Termination::Converged);
        assert_eq!(result.before, result.after);
    }

    #[test]
    fn mismatched_initial_guess_is_rejected() {
        let opts = RigRefineOptions::default();
        let problem = RigRefineProblem::new(single_view(5), &[0], &opts).unwrap();
        let init = RigRefineParams {
            cam_se3_rig: vec![Iso3::identity()],
            rig_se3_world: vec![Iso3::identity()],
        };
        assert!(matches!(
            optimize_rig_extrinsics(&problem, &init, &opts),
            Err(RefineError::InvalidProblem(_))
        ));
    }
}
