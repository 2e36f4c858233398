use rigcal_core::Real;
use serde::{Deserialize, Serialize};

/// Per-correspondence robust loss, applied to squared pixel errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RobustKernel {
    /// Plain squared error.
    #[default]
    None,
    /// Quadratic up to `delta` pixels, linear beyond.
    Huber { delta: Real },
    /// `c^2 ln(1 + e^2 / c^2)`.
    Cauchy { c: Real },
}

impl RobustKernel {
    /// Loss `rho(e^2)` and IRLS weight for a squared error `e2`.
    ///
    /// The weight multiplies both rows of a correspondence and is frozen at
    /// the current estimate; solvers do not differentiate it.
    pub fn rho_and_weight(self, e2: Real) -> (Real, Real) {
        match self {
            RobustKernel::None => (e2, 1.0),
            RobustKernel::Huber { delta } => {
                let e = e2.sqrt();
                if e <= delta {
                    (e2, 1.0)
                } else {
                    (2.0 * delta * e - delta * delta, delta / e)
                }
            }
            RobustKernel::Cauchy { c } => {
                let c2 = c * c;
                let ratio = e2 / c2;
                (c2 * ratio.ln_1p(), 1.0 / (1.0 + ratio))
            }
        }
    }

    /// Reject non-positive scale parameters.
    pub fn validate(self) -> Result<(), String> {
        match self {
            RobustKernel::None => Ok(()),
            RobustKernel::Huber { delta } if delta > 0.0 => Ok(()),
            RobustKernel::Cauchy { c } if c > 0.0 => Ok(()),
            other => Err(format!("robust kernel scale must be positive: {:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn huber_is_continuous_at_threshold() {
        let kernel = RobustKernel::Huber { delta: 2.0 };
        let (inside, w_inside) = kernel.rho_and_weight(1.0);
        assert_eq!((inside, w_inside), (1.0, 1.0));

        let (below, _) = kernel.rho_and_weight(4.0 - 1e-9);
        let (above, _) = kernel.rho_and_weight(4.0 + 1e-9);
        assert!((below - above).abs() < 1e-8);

        // 10 px error: linear branch
        let (rho, w) = kernel.rho_and_weight(100.0);
        assert!((rho - 36.0).abs() < 1e-12);
        assert!((w - 0.2).abs() < 1e-12);
    }

    #[test]
    fn cauchy_downweights_gross_errors() {
        let kernel = RobustKernel::Cauchy { c: 1.0 };
        let (rho_small, w_small) = kernel.rho_and_weight(0.01);
        let (_, w_large) = kernel.rho_and_weight(400.0);
        assert!((rho_small - 0.01).abs() < 1e-4);
        assert!(w_small > 0.99, "w_small = {}", w_small);
        assert!(w_large < 0.003, "w_large = {}", w_large);
    }

    #[test]
    fn reweighted_mean_ignores_outlier_offsets() {
        // pixel offsets of one landmark seen in many frames, two mismatches
        let offsets = [0.2, -0.1, 0.05, 0.15, -0.2, 0.0, 12.0, -9.0];
        let fit = |kernel: RobustKernel| {
            let mut x = 0.0;
            for _ in 0..20 {
                let (num, den) = offsets.iter().fold((0.0, 0.0), |(n, d), &o| {
                    let (_, w) = kernel.rho_and_weight((x - o) * (x - o));
                    (n + w * o, d + w)
                });
                x = num / den;
            }
            x
        };
        let plain = fit(RobustKernel::None);
        let huber = fit(RobustKernel::Huber { delta: 0.5 });
        let cauchy = fit(RobustKernel::Cauchy { c: 0.5 });
        assert!((plain - 0.3875).abs() < 1e-12);
        assert!(huber.abs() < 0.25, "huber = {}", huber);
        assert!(cauchy.abs() < plain.abs());
    }

    #[test]
    fn kernels_serialize_with_kind_tag() {
        let json = serde_json::to_string(&RobustKernel::Huber { delta: 2.0 }).unwrap();
        assert_eq!(json, r#"{"kind":"huber","delta":2.0}"#);
        let back: RobustKernel = serde_json::from_str(r#"{"kind":"none"}"#).unwrap();
        assert_eq!(back, RobustKernel::None);
        assert!(RobustKernel::Cauchy { c: 0.0 }.validate().is_err());
        assert!(RobustKernel::Huber { delta: 1.0 }.validate().is_ok());
    }
}
