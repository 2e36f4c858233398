//! Rotation averaging and robust location estimates.
//!
//! All rotations are unit quaternions. Angular distances are geodesic
//! (radians).

use nalgebra::{Quaternion, Vector4};
use rigcal_core::{rotation_angle, rotation_log, Quat, Real, Vec3};

/// Above this many samples the medoid search only tests an evenly strided
/// subset of candidates (each still scored against every sample).
const MEDOID_MAX_CANDIDATES: usize = 256;

/// Index of the rotation minimizing the sum of angular distances to all others.
///
/// Returns `None` for an empty set. Ties resolve to the lowest index.
pub fn medoid_rotation(rotations: &[Quat]) -> Option<usize> {
    if rotations.is_empty() {
        return None;
    }
    let stride = rotations.len().div_ceil(MEDOID_MAX_CANDIDATES).max(1);

    let mut best: Option<(usize, Real)> = None;
    for i in (0..rotations.len()).step_by(stride) {
        let cost: Real = rotations
            .iter()
            .map(|q| rotation_angle(&rotations[i], q))
            .sum();
        if best.map_or(true, |(_, c)| cost < c) {
            best = Some((i, cost));
        }
    }
    best.map(|(i, _)| i)
}

/// Geodesic L1 mean of rotations via Weiszfeld iterations on SO(3).
///
/// Each iteration moves the estimate along the weighted mean of the tangent
/// residuals `log(R^T R_i)` with weights `1 / |log(R^T R_i)|`, which bounds
/// the influence of any single sample. Samples coinciding with the current
/// estimate are skipped.
pub fn geodesic_l1_mean(rotations: &[Quat], init: Quat, max_iters: usize) -> Quat {
    let mut estimate = init;
    for _ in 0..max_iters {
        let inv = estimate.inverse();
        let mut num = Vec3::zeros();
        let mut den = 0.0;
        for q in rotations {
            let v = rotation_log(&(inv * q));
            let d = v.norm();
            if d < 1e-12 {
                continue;
            }
            num += v / d;
            den += 1.0 / d;
        }
        if den == 0.0 {
            break;
        }
        let step = num / den;
        estimate *= Quat::from_scaled_axis(step);
        if step.norm() < 1e-12 {
            break;
        }
    }
    estimate
}

/// Chordal (quaternion) mean with hemisphere correction.
///
/// Quaternions are flipped into the hemisphere of the first sample before
/// summation so that `q` and `-q` do not cancel. Not robust to outliers; use
/// it on consistent sets only.
pub fn chordal_mean(rotations: &[Quat]) -> Option<Quat> {
    let q0 = rotations.first()?;
    let mut acc = Vector4::<Real>::zeros();
    for q in rotations {
        let coords = q.coords;
        let sign = if q0.coords.dot(&coords) < 0.0 {
            -1.0
        } else {
            1.0
        };
        acc += coords * sign;
    }
    if acc.norm_squared() == 0.0 {
        return Some(Quat::identity());
    }
    // `UnitQuaternion` stores (i, j, k, w), the layout of `Quaternion::from_vector`.
    Some(Quat::from_quaternion(Quaternion::from_vector(acc)))
}

/// Median of a set of values (mean of the two middle values for even counts).
pub fn median(values: &[Real]) -> Option<Real> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(0.5 * (sorted[mid - 1] + sorted[mid]))
    } else {
        Some(sorted[mid])
    }
}

/// Component-wise median of 3D vectors.
pub fn component_median(points: &[Vec3]) -> Option<Vec3> {
    let axis = |k: usize| median(&points.iter().map(|p| p[k]).collect::<Vec<_>>());
    Some(Vec3::new(axis(0)?, axis(1)?, axis(2)?))
}
