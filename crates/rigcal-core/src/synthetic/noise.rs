//! Deterministic noise helpers for synthetic datasets.
//!
//! The functions here avoid `thread_rng` and do not depend on the internal
//! algorithm of `rand` RNGs. This keeps synthetic datasets stable across
//! versions and platforms.

use crate::{retract_pose, Iso3, Real, Vec2, Vec3, Vec6};

/// Deterministic uniform pixel noise in `[-max_abs_px, +max_abs_px]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UniformPixelNoise {
    /// Base seed controlling the pseudo-random sequence.
    pub seed: u64,
    /// Maximum absolute per-axis noise (pixels).
    pub max_abs_px: Real,
}

impl UniformPixelNoise {
    /// Sample a deterministic 2D noise vector for a `(stream, index)` key.
    #[inline]
    pub fn sample(&self, stream: u64, index: usize) -> Vec2 {
        let max_abs = self.max_abs_px.abs();
        if max_abs == 0.0 {
            return Vec2::zeros();
        }
        let key = mix_key(self.seed, stream, index);
        Vec2::new(
            signed_unit(key, 0) * max_abs,
            signed_unit(key, 1) * max_abs,
        )
    }
}

/// Deterministic pose perturbation applied to reported localizer poses.
///
/// Each axis of the rotation vector and of the translation is drawn uniformly
/// from `[-max_rotation_rad, +max_rotation_rad]` and
/// `[-max_translation, +max_translation]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoseNoise {
    pub seed: u64,
    pub max_rotation_rad: Real,
    pub max_translation: Real,
}

impl PoseNoise {
    /// Sample the `[w, v]` perturbation for a `(camera, frame)` key.
    pub fn sample(&self, camera: usize, frame: usize) -> Vec6 {
        if self.max_rotation_rad == 0.0 && self.max_translation == 0.0 {
            return Vec6::zeros();
        }
        let key = mix_key(self.seed, camera as u64, frame);
        let w = Vec3::new(
            signed_unit(key, 0),
            signed_unit(key, 1),
            signed_unit(key, 2),
        ) * self.max_rotation_rad.abs();
        let v = Vec3::new(
            signed_unit(key, 3),
            signed_unit(key, 4),
            signed_unit(key, 5),
        ) * self.max_translation.abs();
        Vec6::new(w.x, w.y, w.z, v.x, v.y, v.z)
    }

    pub fn apply(&self, camera: usize, frame: usize, pose: &Iso3) -> Iso3 {
        retract_pose(pose, &self.sample(camera, frame))
    }
}

#[inline]
fn mix_key(seed: u64, stream: u64, index: usize) -> u64 {
    seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (index as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9)
}

/// Value in `[-1, 1)` for the `lane`-th draw of a key.
#[inline]
fn signed_unit(key: u64, lane: u64) -> Real {
    let x = splitmix64(key ^ lane.wrapping_mul(0x94D0_49BB_1331_11EB));
    (u64_to_unit_f64(x) - 0.5) * 2.0
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[inline]
fn u64_to_unit_f64(x: u64) -> Real {
    // top 53 bits -> [0, 1)
    let mantissa = x >> 11;
    (mantissa as Real) * (1.0 / ((1u64 << 53) as Real))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_noise_is_deterministic_and_bounded() {
        let noise = UniformPixelNoise {
            seed: 123,
            max_abs_px: 0.5,
        };

        let a = noise.sample(0, 0);
        let b = noise.sample(0, 0);
        let c = noise.sample(0, 1);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.x.abs() <= 0.5);
        assert!(a.y.abs() <= 0.5);
    }

    #[test]
    fn pose_noise_respects_bounds() {
        let noise = PoseNoise {
            seed: 9,
            max_rotation_rad: 0.01,
            max_translation: 0.02,
        };
        for frame in 0..20 {
            let d = noise.sample(1, frame);
            for i in 0..3 {
                assert!(d[i].abs() <= 0.01);
                assert!(d[i + 3].abs() <= 0.02);
            }
        }
        assert_eq!(PoseNoise::default().sample(3, 4), Vec6::zeros());
    }
}
