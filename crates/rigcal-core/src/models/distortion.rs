use nalgebra::{RealField, Vector2};
use serde::{Deserialize, Serialize};

pub trait DistortionModel<S: RealField + Copy> {
    fn distort(&self, n_undist: &Vector2<S>) -> Vector2<S>;
}

/// Brown-Conrady distortion with three radial and two tangential terms.
///
/// A radial-only `K3` model is the special case `p1 = p2 = 0`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct BrownConrady5<S: RealField> {
    pub k1: S,
    pub k2: S,
    pub k3: S,
    pub p1: S,
    pub p2: S,
}

impl<S: RealField + Copy> DistortionModel<S> for BrownConrady5<S> {
    fn distort(&self, n_undist: &Vector2<S>) -> Vector2<S> {
        let (x, y) = (n_undist.x, n_undist.y);
        let r2 = x * x + y * y;
        let radial = S::one() + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));

        let two = S::one() + S::one();
        let xy = x * y;
        let x_tan = two * self.p1 * xy + self.p2 * (r2 + two * x * x);
        let y_tan = self.p1 * (r2 + two * y * y) + two * self.p2 * xy;

        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_coefficients_are_identity() {
        let d = BrownConrady5::<f64>::default();
        let n = Vector2::new(0.2, -0.1);
        assert_eq!(d.distort(&n), n);
    }

    #[test]
    fn radial_and_tangential_terms() {
        let n = Vector2::new(0.2, -0.1);
        let radial = BrownConrady5 {
            k1: -0.1,
            k2: 0.02,
            ..Default::default()
        };
        // r2 = 0.05: 1 - 0.005 + 0.00005
        let expected = n * 0.99505;
        assert!((radial.distort(&n) - expected).norm() < 1e-15);

        let tangential = BrownConrady5 {
            p1: 0.01,
            ..Default::default()
        };
        let d = tangential.distort(&n);
        assert!((d - Vector2::new(0.1996, -0.0993)).norm() < 1e-15, "{}", d);
    }
}
