use crate::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport, Termination};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use log::debug;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use rigcal_core::Real;

struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<Real>,
}

impl<'a, P: NllsProblem> LeastSquaresProblem<Real, Dyn, Dyn> for LmWrapper<'a, P> {
    type ResidualStorage = Owned<Real, Dyn>;
    type JacobianStorage = Owned<Real, Dyn, Dyn>;
    type ParameterStorage = Owned<Real, Dyn>;

    fn set_params(&mut self, x: &DVector<Real>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<Real> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<Real>> {
        Some(self.problem.residuals(&self.params))
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        Some(self.problem.jacobian(&self.params))
    }
}

fn map_termination(reason: &TerminationReason) -> Termination {
    match reason {
        TerminationReason::ResidualsZero => Termination::ZeroResidual,
        TerminationReason::Orthogonal => Termination::GradientTolerance,
        TerminationReason::Converged { ftol: true, .. } => Termination::CostTolerance,
        TerminationReason::Converged { .. } => Termination::ParameterTolerance,
        TerminationReason::NoImprovementPossible(_) => Termination::Stalled,
        TerminationReason::LostPatience => Termination::MaxIterations,
        _ if reason.was_successful() => Termination::Converged,
        _ => Termination::NumericalFailure,
    }
}

/// Dense Levenberg-Marquardt (MINPACK port) over the full Jacobian.
#[derive(Debug, Default, Clone)]
pub struct LmBackend;

impl NllsSolverBackend for LmBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport) {
        let lm = LevenbergMarquardt::new()
            .with_ftol(opts.ftol)
            .with_xtol(opts.xtol)
            .with_gtol(opts.gtol)
            .with_patience(opts.max_iters.max(1));

        let initial_cost = 0.5 * problem.residuals(&x0).norm_squared();
        let wrapper = LmWrapper {
            problem,
            params: x0,
        };

        let (wrapper, report) = lm.minimize(wrapper);
        debug!(
            "dense lm: {:?} after {} evaluations, cost {:.6e}",
            report.termination, report.number_of_evaluations, report.objective_function
        );
        let x_opt = wrapper.params();

        (
            x_opt,
            SolveReport::new(
                report.number_of_evaluations,
                initial_cost,
                report.objective_function,
                map_termination(&report.termination),
            ),
        )
    }
}
