//! Robust initialization of rig extrinsics from independent per-camera poses.
//!
//! - [`rotation_averaging`]: consensus medoid, geodesic L1 (Weiszfeld) and
//!   chordal rotation means, plus median helpers.
//! - [`relative_pose`]: per-camera extrinsic estimation against the reference
//!   camera with outlier exclusion, and rig trajectory seeding.
//!
//! Nothing here looks at correspondences: only localizer poses are used.

pub mod relative_pose;
pub mod rotation_averaging;

pub use relative_pose::*;
pub use rotation_averaging::*;
