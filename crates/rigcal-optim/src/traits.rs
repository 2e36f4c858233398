use nalgebra::{DMatrix, DVector};
use rigcal_core::Real;
use serde::{Deserialize, Serialize};

/// Least-squares problem over a dense parameter vector, for dense backends.
///
/// Robust losses enter as row scales: `residuals` and `jacobian` multiply each
/// row by `sqrt(w)` evaluated on the unweighted residuals, with `w` held
/// constant for differentiation.
pub trait NllsProblem {
    /// Length of the parameter vector.
    fn num_params(&self) -> usize;
    /// Number of scalar residual rows.
    fn num_residuals(&self) -> usize;

    /// Raw residuals at `x`.
    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real>;
    /// Raw Jacobian at `x`.
    fn jacobian_unweighted(&self, x: &DVector<Real>) -> DMatrix<Real>;

    /// `sqrt(w)` per row; all ones without a robust loss.
    fn robust_row_scales(&self, r_unweighted: &DVector<Real>) -> DVector<Real> {
        DVector::from_element(r_unweighted.len(), 1.0)
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let raw = self.residuals_unweighted(x);
        raw.component_mul(&self.robust_row_scales(&raw))
    }

    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let scales = self.robust_row_scales(&self.residuals_unweighted(x));
        let mut jac = self.jacobian_unweighted(x);
        for (i, &s) in scales.iter().enumerate().filter(|(_, s)| **s != 1.0) {
            jac.row_mut(i).scale_mut(s);
        }
        jac
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveOptions {
    /// Iteration budget.
    ///
    /// The dense LM backend follows the MINPACK convention and caps function
    /// evaluations at `max_iters * (n + 1)`.
    pub max_iters: usize,
    /// Relative tolerance on the cost reduction of an accepted step.
    pub ftol: Real,
    /// Tolerance on the infinity norm of the gradient.
    pub gtol: Real,
    /// Tolerance on the norm of the parameter update.
    pub xtol: Real,
    /// Log every iteration at `info` level instead of `debug`.
    pub verbose: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            ftol: 1e-12,
            gtol: 1e-10,
            xtol: 1e-10,
            verbose: false,
        }
    }
}

/// Why a solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Backend reported success without a more specific reason.
    Converged,
    ParameterTolerance,
    CostTolerance,
    GradientTolerance,
    /// Cost is numerically zero.
    ZeroResidual,
    /// No damping produced a decrease; the current point is a minimum to
    /// working precision.
    Stalled,
    MaxIterations,
    Diverged,
    NumericalFailure,
}

impl Termination {
    pub fn is_converged(self) -> bool {
        matches!(
            self,
            Termination::Converged
                | Termination::ParameterTolerance
                | Termination::CostTolerance
                | Termination::GradientTolerance
                | Termination::ZeroResidual
                | Termination::Stalled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub iterations: usize,
    pub initial_cost: Real,
    pub final_cost: Real,
    pub converged: bool,
    pub termination: Termination,
}

impl SolveReport {
    pub fn new(
        iterations: usize,
        initial_cost: Real,
        final_cost: Real,
        termination: Termination,
    ) -> Self {
        Self {
            iterations,
            initial_cost,
            final_cost,
            converged: termination.is_converged(),
            termination,
        }
    }
}

pub trait NllsSolverBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport);
}
