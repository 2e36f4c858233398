//! Concrete optimization problems.

pub mod rig_refine;
