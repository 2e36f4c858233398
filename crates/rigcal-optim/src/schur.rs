//! Levenberg-Marquardt on bipartite block problems via the Schur complement.
//!
//! Parameters come in two families of 6-DoF blocks: a few *camera* blocks and
//! many *pose* blocks. Every residual touches at most one block of each family,
//! so the Gauss-Newton matrix has the shape
//!
//! ```text
//! [ A   B^T ] [dc]   [-g_c]
//! [ B   P   ] [dp] = [-g_p]
//! ```
//!
//! with `A` and `P` block diagonal. Eliminating the pose blocks gives the
//! reduced camera system `(A - B^T P^-1 B) dc = -g_c + B^T P^-1 g_p`, a small
//! dense matrix, after which each `dp` is recovered independently.

use std::collections::BTreeMap;

use log::{debug, info};
use nalgebra::{DMatrix, DVector, Matrix2x6, Matrix6, Vector2, Vector6};
use rigcal_core::Real;

use crate::{SolveOptions, SolveReport, Termination};

const INITIAL_LAMBDA: Real = 1e-4;
const MIN_LAMBDA: Real = 1e-12;
const MAX_LAMBDA: Real = 1e12;
/// Floor on diagonal entries scaled by the damping term.
const MIN_DIAGONAL: Real = 1e-9;
/// Costs below this are treated as an exact fit.
const ZERO_COST: Real = 1e-20;

/// Weighted normal equations of a bipartite problem at one linearization point.
///
/// Gradients are `J^T W r`, so a step solves `H d = -g`.
#[derive(Debug, Clone)]
pub struct BlockSystem {
    /// Robust cost at the linearization point.
    pub cost: Real,
    pub camera_hessian: Vec<Matrix6<Real>>,
    pub camera_gradient: Vec<Vector6<Real>>,
    pub pose_hessian: Vec<Matrix6<Real>>,
    pub pose_gradient: Vec<Vector6<Real>>,
    /// `B` blocks keyed by `(pose, camera)`: pose rows, camera columns.
    pub coupling: BTreeMap<(usize, usize), Matrix6<Real>>,
}

/// Update for every free block of both families.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStep {
    pub cameras: Vec<Vector6<Real>>,
    pub poses: Vec<Vector6<Real>>,
}

impl BlockStep {
    pub fn norm(&self) -> Real {
        self.cameras
            .iter()
            .chain(self.poses.iter())
            .map(|v| v.norm_squared())
            .sum::<Real>()
            .sqrt()
    }
}

impl BlockSystem {
    pub fn new(num_cameras: usize, num_poses: usize) -> Self {
        Self {
            cost: 0.0,
            camera_hessian: vec![Matrix6::zeros(); num_cameras],
            camera_gradient: vec![Vector6::zeros(); num_cameras],
            pose_hessian: vec![Matrix6::zeros(); num_poses],
            pose_gradient: vec![Vector6::zeros(); num_poses],
            coupling: BTreeMap::new(),
        }
    }

    /// Accumulate one 2-row residual with IRLS weight `weight`.
    ///
    /// `camera` / `pose` are `None` for fixed blocks; their Jacobian is ignored.
    pub fn add_residual(
        &mut self,
        camera: Option<usize>,
        pose: Option<usize>,
        j_camera: &Matrix2x6<Real>,
        j_pose: &Matrix2x6<Real>,
        residual: &Vector2<Real>,
        weight: Real,
    ) {
        if let Some(c) = camera {
            self.camera_hessian[c] += weight * j_camera.transpose() * j_camera;
            self.camera_gradient[c] += weight * j_camera.transpose() * residual;
        }
        if let Some(p) = pose {
            self.pose_hessian[p] += weight * j_pose.transpose() * j_pose;
            self.pose_gradient[p] += weight * j_pose.transpose() * residual;
        }
        if let (Some(c), Some(p)) = (camera, pose) {
            *self
                .coupling
                .entry((p, c))
                .or_insert_with(Matrix6::zeros) += weight * j_pose.transpose() * j_camera;
        }
    }

    /// Largest absolute gradient entry.
    pub fn gradient_inf_norm(&self) -> Real {
        self.camera_gradient
            .iter()
            .chain(self.pose_gradient.iter())
            .map(|g| g.amax())
            .fold(0.0, Real::max)
    }

    /// Solve the damped system `(H + lambda * diag(H)) d = -g`.
    ///
    /// Returns `None` when a pose block or the reduced camera system is singular.
    pub fn solve_damped(&self, lambda: Real) -> Option<BlockStep> {
        let damp = |h: &Matrix6<Real>| {
            let mut d = *h;
            for i in 0..6 {
                d[(i, i)] += lambda * h[(i, i)].max(MIN_DIAGONAL);
            }
            d
        };
        let pose_inv: Vec<Matrix6<Real>> = self
            .pose_hessian
            .iter()
            .map(|h| invert_spd(&damp(h)))
            .collect::<Option<_>>()?;

        let mut per_pose: Vec<Vec<(usize, &Matrix6<Real>)>> = vec![Vec::new(); pose_inv.len()];
        for ((p, c), b) in &self.coupling {
            per_pose[*p].push((*c, b));
        }

        let nc = self.camera_hessian.len();
        let mut s = DMatrix::<Real>::zeros(6 * nc, 6 * nc);
        let mut rhs = DVector::<Real>::zeros(6 * nc);
        for (c, (h, g)) in self
            .camera_hessian
            .iter()
            .zip(self.camera_gradient.iter())
            .enumerate()
        {
            s.fixed_view_mut::<6, 6>(6 * c, 6 * c).copy_from(&damp(h));
            rhs.fixed_rows_mut::<6>(6 * c).copy_from(&(-g));
        }
        for (p, blocks) in per_pose.iter().enumerate() {
            for &(c1, b1) in blocks {
                let a = b1.transpose() * pose_inv[p];
                let mut row = rhs.fixed_rows_mut::<6>(6 * c1);
                row += a * self.pose_gradient[p];
                for &(c2, b2) in blocks {
                    let mut block = s.fixed_view_mut::<6, 6>(6 * c1, 6 * c2);
                    block -= a * b2;
                }
            }
        }

        let dc = if nc == 0 {
            DVector::zeros(0)
        } else {
            match s.clone().cholesky() {
                Some(chol) => chol.solve(&rhs),
                None => s.lu().solve(&rhs)?,
            }
        };
        if dc.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let cameras: Vec<Vector6<Real>> = (0..nc)
            .map(|c| dc.fixed_rows::<6>(6 * c).into_owned())
            .collect();

        let poses = per_pose
            .iter()
            .enumerate()
            .map(|(p, blocks)| {
                let mut rhs_p = -self.pose_gradient[p];
                for &(c, b) in blocks {
                    rhs_p -= b * cameras[c];
                }
                pose_inv[p] * rhs_p
            })
            .collect();

        Some(BlockStep { cameras, poses })
    }
}

fn invert_spd(m: &Matrix6<Real>) -> Option<Matrix6<Real>> {
    match m.cholesky() {
        Some(chol) => Some(chol.inverse()),
        None => m.try_inverse(),
    }
}

/// A least-squares problem exposing the bipartite block structure.
pub trait BlockLeastSquares {
    type Params: Clone;

    /// Normal equations (and cost) at `params`.
    fn linearize(&self, params: &Self::Params) -> BlockSystem;
    /// Robust cost at `params`.
    fn cost(&self, params: &Self::Params) -> Real;
    /// Apply a step to every free block.
    fn retract(&self, params: &Self::Params, step: &BlockStep) -> Self::Params;
}

/// Levenberg-Marquardt with Schur-complement linear solves.
#[derive(Debug, Default, Clone)]
pub struct SchurLmBackend;

impl SchurLmBackend {
    pub fn solve<P: BlockLeastSquares>(
        &self,
        problem: &P,
        params: P::Params,
        opts: &SolveOptions,
    ) -> (P::Params, SolveReport) {
        let mut params = params;
        let mut system = problem.linearize(&params);
        let initial_cost = system.cost;
        let mut cost = initial_cost;
        if !cost.is_finite() {
            return (
                params,
                SolveReport::new(0, initial_cost, cost, Termination::NumericalFailure),
            );
        }

        let mut lambda = INITIAL_LAMBDA;
        let mut iterations = 0;
        let mut termination = Termination::MaxIterations;

        loop {
            if cost <= ZERO_COST {
                termination = Termination::ZeroResidual;
                break;
            }
            if system.gradient_inf_norm() <= opts.gtol {
                termination = Termination::GradientTolerance;
                break;
            }
            if iterations >= opts.max_iters {
                break;
            }
            iterations += 1;

            let Some(step) = system.solve_damped(lambda) else {
                lambda *= 10.0;
                if lambda > MAX_LAMBDA {
                    termination = Termination::NumericalFailure;
                    break;
                }
                continue;
            };
            let step_norm = step.norm();
            let candidate = problem.retract(&params, &step);
            let new_cost = problem.cost(&candidate);

            let accepted = new_cost.is_finite() && new_cost < cost;
            if opts.verbose {
                info!(
                    "lm iter {}: cost {:.6e} -> {:.6e}, |step| {:.3e}, lambda {:.1e}{}",
                    iterations,
                    cost,
                    new_cost,
                    step_norm,
                    lambda,
                    if accepted { "" } else { " (rejected)" }
                );
            } else {
                debug!(
                    "lm iter {}: cost {:.6e} -> {:.6e}, |step| {:.3e}, lambda {:.1e}",
                    iterations, cost, new_cost, step_norm, lambda
                );
            }

            if accepted {
                let relative_decrease = (cost - new_cost) / cost;
                params = candidate;
                cost = new_cost;
                lambda = (lambda * 0.3).max(MIN_LAMBDA);
                if step_norm <= opts.xtol {
                    termination = Termination::ParameterTolerance;
                    break;
                }
                if relative_decrease <= opts.ftol {
                    termination = Termination::CostTolerance;
                    break;
                }
                system = problem.linearize(&params);
            } else {
                if step_norm <= opts.xtol {
                    termination = Termination::ParameterTolerance;
                    break;
                }
                lambda *= 10.0;
                if lambda > MAX_LAMBDA {
                    termination = Termination::Stalled;
                    break;
                }
            }
        }

        (
            params,
            SolveReport::new(iterations, initial_cost, cost, termination),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two camera offsets and three pose offsets observed through `y = c + p`
    /// (camera 0 fixed) plus direct pose priors; linear, so one step solves it.
    struct Offsets {
        truth_c: Vec<Vector6<Real>>,
        truth_p: Vec<Vector6<Real>>,
    }

    #[derive(Clone)]
    struct State {
        c: Vec<Vector6<Real>>,
        p: Vec<Vector6<Real>>,
    }

    impl Offsets {
        fn residuals(&self, s: &State) -> Vec<(Option<usize>, usize, Vector6<Real>)> {
            let mut out = Vec::new();
            for p in 0..s.p.len() {
                // camera 0 fixed at truth
                out.push((None, p, self.truth_c[0] + s.p[p] - (self.truth_c[0] + self.truth_p[p])));
                for c in 1..self.truth_c.len() {
                    let r = s.c[c - 1] + s.p[p] - (self.truth_c[c] + self.truth_p[p]);
                    out.push((Some(c - 1), p, r));
                }
            }
            out
        }
    }

    impl BlockLeastSquares for Offsets {
        type Params = State;

        fn linearize(&self, params: &State) -> BlockSystem {
            let mut sys = BlockSystem::new(params.c.len(), params.p.len());
            for (cam, pose, r) in self.residuals(params) {
                sys.cost += r.norm_squared();
                // split each 6-vector residual into three 2-row residuals
                for k in 0..3 {
                    let mut j = Matrix2x6::zeros();
                    j[(0, 2 * k)] = 1.0;
                    j[(1, 2 * k + 1)] = 1.0;
                    let rk = Vector2::new(r[2 * k], r[2 * k + 1]);
                    sys.add_residual(cam, Some(pose), &j, &j, &rk, 1.0);
                }
            }
            sys
        }

        fn cost(&self, params: &State) -> Real {
            self.residuals(params).iter().map(|(_, _, r)| r.norm_squared()).sum()
        }

        fn retract(&self, params: &State, step: &BlockStep) -> State {
            State {
                c: params.c.iter().zip(&step.cameras).map(|(a, b)| a + b).collect(),
                p: params.p.iter().zip(&step.poses).map(|(a, b)| a + b).collect(),
            }
        }
    }

    #[test]
    fn schur_lm_solves_linear_bipartite_problem() {
        let v = |a: Real| Vector6::new(a, -a, 2.0 * a, 0.5, a * a, 1.0 - a);
        let problem = Offsets {
            truth_c: vec![v(0.0), v(0.3), v(-0.7)],
            truth_p: vec![v(1.0), v(2.0), v(-1.5)],
        };
        let init = State {
            c: vec![Vector6::zeros(); 2],
            p: vec![Vector6::zeros(); 3],
        };

        let (sol, report) = SchurLmBackend.solve(&problem, init, &SolveOptions::default());
        assert!(report.converged, "{:?}", report);
        assert!(report.final_cost < 1e-16, "cost {}", report.final_cost);
        for (c, truth) in sol.c.iter().zip(&problem.truth_c[1..]) {
            assert!((c - truth).norm() < 1e-8);
        }
        for (p, truth) in sol.p.iter().zip(&problem.truth_p) {
            assert!((p - truth).norm() < 1e-8);
        }
    }

    #[test]
    fn iteration_budget_is_reported() {
        let v = |a: Real| Vector6::from_element(a);
        let problem = Offsets {
            truth_c: vec![v(0.0), v(5.0)],
            truth_p: vec![v(3.0)],
        };
        let init = State {
            c: vec![Vector6::zeros()],
            p: vec![Vector6::zeros()],
        };
        let opts = SolveOptions {
            max_iters: 0,
            ..SolveOptions::default()
        };
        let (_, report) = SchurLmBackend.solve(&problem, init, &opts);
        assert_eq!(report.termination, Termination::MaxIterations);
        assert!(!report.converged);
        assert_eq!(report.iterations, 0);
    }
}
