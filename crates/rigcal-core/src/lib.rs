//! Core math and geometry primitives for `rigcal`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, `Iso3`, ...) and small
//!   SO(3)/SE(3) helpers,
//! - composable camera models (projection + distortion + intrinsics),
//! - the per-frame localization records consumed by the calibration engine,
//! - the shared error taxonomy [`RigCalibError`],
//! - a deterministic synthetic rig generator used by tests across the workspace.
//!
//! Pose naming follows `a_se3_b`: the transform mapping points expressed in
//! frame `b` into frame `a`. A localizer reports `cam_se3_world`.

mod error;
/// Linear algebra type aliases and pose helpers.
pub mod math;
/// Camera models and distortion utilities.
pub mod models;
/// Deterministic synthetic rigs for tests and demos.
pub mod synthetic;
/// Localization records.
pub mod types;

pub use error::*;
pub use math::*;
pub use models::*;
pub use types::*;
