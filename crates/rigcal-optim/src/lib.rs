//! Non-linear least-squares machinery for rig calibration.
//!
//! - [`traits`]: dense problem/backend traits with IRLS row scaling.
//! - [`robust`]: robust loss kernels.
//! - [`schur`]: block Levenberg-Marquardt that eliminates per-frame pose
//!   blocks through the Schur complement.
//! - [`backend_lm`]: dense Levenberg-Marquardt over the `levenberg-marquardt` crate.
//! - [`problems::rig_refine`]: joint refinement of camera extrinsics and rig
//!   trajectory from reprojection residuals.
//!
//! Jacobians are obtained with forward-mode autodiff (`num-dual`) over small
//! local parameter vectors, one correspondence at a time.

pub mod backend_lm;
pub mod factors;
mod jacobian_ad;
pub mod problems;
pub mod robust;
pub mod schur;
pub mod traits;

pub use backend_lm::LmBackend;
pub use problems::rig_refine::*;
pub use robust::RobustKernel;
pub use schur::{BlockLeastSquares, BlockStep, BlockSystem, SchurLmBackend};
pub use traits::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport, Termination};
