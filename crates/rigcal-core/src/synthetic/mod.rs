//! Deterministic synthetic rigs.
//!
//! Used by tests across the workspace to build localization tracks with known
//! ground-truth extrinsics and trajectory.

pub mod noise;
pub mod rig;

pub use noise::*;
pub use rig::*;
