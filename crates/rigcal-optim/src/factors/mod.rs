//! Residual functions generic over the scalar type, so the same code is
//! evaluated with `f64` and with dual numbers for Jacobians.

pub mod reprojection;

pub use reprojection::*;
