//! Activation functions applied elementwise to a propagated layer output.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Width of a Gaussian activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Sigma {
    /// One sigma shared by every neuron.
    Global(f64),
    /// One sigma per neuron, indexed like the layer output.
    PerNeuron(Vec<f64>),
}

/// The activation applied after a propagation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActivationKind {
    /// Leaves the vector untouched.
    Identity,
    /// Normal density `exp(-(v-mu)^2 / (2 s^2)) / (sqrt(2 pi) s)`.
    Gaussian {
        /// Center of the bell.
        mu: f64,
        /// Width, global or per neuron.
        sigma: Sigma,
    },
    /// Logistic function `1 / (1 + exp(-slope * v))`.
    Sigmoid {
        /// Steepness at the origin.
        slope: f64,
    },
}

impl ActivationKind {
    /// Gaussian activation with one width per neuron.
    pub fn gaussian(mu: f64, sigmas: Vec<f64>) -> Self {
        ActivationKind::Gaussian {
            mu,
            sigma: Sigma::PerNeuron(sigmas),
        }
    }

    /// Applies the activation in place.
    ///
    /// Returns false only when a per-neuron sigma vector is shorter than
    /// `values`.
    pub fn apply(&self, values: &mut [f64]) -> bool {
        match self {
            ActivationKind::Identity => true,
            ActivationKind::Gaussian { mu, sigma } => match sigma {
                Sigma::Global(s) => {
                    for v in values.iter_mut() {
                        *v = gaussian(*v, *mu, *s);
                    }
                    true
                }
                Sigma::PerNeuron(sigmas) => {
                    if sigmas.len() < values.len() {
                        return false;
                    }
                    for (v, s) in values.iter_mut().zip(sigmas.iter()) {
                        *v = gaussian(*v, *mu, *s);
                    }
                    true
                }
            },
            ActivationKind::Sigmoid { slope } => {
                for v in values.iter_mut() {
                    *v = 1.0 / (1.0 + (-slope * *v).exp());
                }
                true
            }
        }
    }
}

/// Slope of a sigmoid that reaches `high` at an input of `1.0`.
#[inline]
pub fn sigmoid_slope(high: f64) -> f64 {
    -(1.0 / high - 1.0).ln()
}

#[inline]
fn gaussian(x: f64, mu: f64, sigma: f64) -> f64 {
    let tmp = x - mu;
    (-tmp * tmp / (2.0 * sigma * sigma)).exp() / ((2.0 * PI).sqrt() * sigma)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let mut v = vec![1.0, -2.0, 3.5];
        assert!(ActivationKind::Identity.apply(&mut v));
        assert_eq!(v, vec![1.0, -2.0, 3.5]);
    }

    #[test]
    fn test_gaussian_global_peak() {
        let act = ActivationKind::Gaussian {
            mu: 0.0,
            sigma: Sigma::Global(1.0),
        };
        let mut v = vec![0.0, 1.0];
        assert!(act.apply(&mut v));
        let peak = 1.0 / (2.0 * PI).sqrt();
        assert!((v[0] - peak).abs() < 1e-12);
        assert!((v[1] - peak * (-0.5f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_gaussian_per_neuron() {
        let act = ActivationKind::gaussian(0.0, vec![1.0, 2.0]);
        let mut v = vec![2.0, 2.0];
        assert!(act.apply(&mut v));
        // Wider bell decays less at the same distance
        assert!(v[1] > v[0]);
        let expected = (-0.5f64).exp() / ((2.0 * PI).sqrt() * 2.0);
        assert!((v[1] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_gaussian_short_sigma_vector() {
        let act = ActivationKind::gaussian(0.0, vec![1.0]);
        let mut v = vec![0.0, 0.0];
        assert!(!act.apply(&mut v));
    }

    #[test]
    fn test_sigmoid_slope_from_high() {
        let act = ActivationKind::Sigmoid {
            slope: sigmoid_slope(0.99),
        };
        let mut v = vec![1.0, 0.0, -1.0];
        assert!(act.apply(&mut v));
        assert!((v[0] - 0.99).abs() < 1e-12);
        assert!((v[1] - 0.5).abs() < 1e-12);
        assert!((v[2] - 0.01).abs() < 1e-12);
    }
}
