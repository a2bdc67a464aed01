//! Configuration for the RBF network classifier.

use crate::error::{RbfError, Result};
use crate::lvq::{LvqKind, PrototypeInit, TrainerSettings};
use crate::propagation::DistanceKind;
use crate::rbf::LeastSquares;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Hyperparameters of an RBF network and of its training schedule.
///
/// Training runs in two LVQ phases over the hidden layer. Phase A is a
/// coarse positioning of the prototypes (LVQ1 or OLVQ1), phase B refines
/// them (usually LVQ3 or OLVQ3). Either phase can be disabled by setting
/// its trainer to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbfConfig {
    /// Number of hidden neurons (prototypes) per class.
    /// Default: 5.
    pub hidden_per_class: usize,

    /// Number of epochs of the first LVQ phase.
    /// Default: 0.
    pub presentations_a: usize,

    /// Number of epochs of the second LVQ phase.
    /// Default: 20.
    pub presentations_b: usize,

    /// Learning rate of the first LVQ phase.
    /// Default: 0.3.
    pub learn_rate_a: f64,

    /// Learning rate of the second LVQ phase.
    /// Default: 0.1.
    pub learn_rate_b: f64,

    /// Extra factor applied to updates where both winners share a class
    /// (LVQ3 family) and to the LVQ4 repulsion.
    /// Default: 0.3.
    pub learn_factor: f64,

    /// Relative window around the decision border for LVQ3/OLVQ3/LVQ4.
    /// Default: 0.2.
    pub window_size: f64,

    /// Scale from nearest foreign prototype distance to Gaussian width.
    /// Default: 0.7.
    pub sigma_factor: f64,

    /// Smoothness weight of the output layer regularization.
    /// Default: 0.0.
    pub lambda: f64,

    /// Output sigmoid value reached at an activation of 1.0, in (0, 1).
    /// Default: 0.99.
    pub high: f64,

    /// Distance used for propagation and prototype selection.
    /// Default: L2.
    pub distance: DistanceKind,

    /// Prototype initialization strategy.
    /// Default: MaxDistance.
    pub prototype_init: PrototypeInit,

    /// Trainer of the first phase: `None`, LVQ1 or OLVQ1.
    /// Default: OLVQ1.
    pub trainer_a: Option<LvqKind>,

    /// Trainer of the second phase.
    /// Default: OLVQ3.
    pub trainer_b: Option<LvqKind>,

    /// Solver for the output layer normal equations.
    /// Default: SVD.
    pub least_squares: LeastSquares,

    /// Random seed for prototype sampling and epoch shuffles.
    /// Default: None (random).
    pub seed: Option<u64>,
}

impl Default for RbfConfig {
    fn default() -> Self {
        Self {
            hidden_per_class: 5,
            presentations_a: 0,
            presentations_b: 20,
            learn_rate_a: 0.3,
            learn_rate_b: 0.1,
            learn_factor: 0.3,
            window_size: 0.2,
            sigma_factor: 0.7,
            lambda: 0.0,
            high: 0.99,
            distance: DistanceKind::L2,
            prototype_init: PrototypeInit::MaxDistance,
            trainer_a: Some(LvqKind::Olvq1),
            trainer_b: Some(LvqKind::Olvq3),
            least_squares: LeastSquares::Svd,
            seed: None,
        }
    }
}

impl RbfConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// Missing fields take their default values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RbfError::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Checks every hyperparameter and their combinations.
    pub fn validate(&self) -> Result<()> {
        if self.hidden_per_class == 0 {
            return Err(RbfError::Config(
                "hidden_per_class must be at least 1".to_string(),
            ));
        }
        if !(self.high > 0.0 && self.high < 1.0) {
            return Err(RbfError::Config(format!(
                "high must lie in (0, 1), got {}",
                self.high
            )));
        }
        if !(self.sigma_factor > 0.0 && self.sigma_factor.is_finite()) {
            return Err(RbfError::Config(format!(
                "sigma_factor must be positive, got {}",
                self.sigma_factor
            )));
        }
        if !self.lambda.is_finite() {
            return Err(RbfError::Config("lambda must be finite".to_string()));
        }

        self.phase_a()?;
        self.phase_b()?;
        Ok(())
    }

    /// Trainer settings of the first phase, if enabled.
    pub fn phase_a(&self) -> Result<Option<TrainerSettings>> {
        match self.trainer_a {
            None => Ok(None),
            Some(kind @ (LvqKind::Lvq1 | LvqKind::Olvq1)) => {
                TrainerSettings::new(kind, self.learn_rate_a, 0.0, 0.0).map(Some)
            }
            Some(kind) => Err(RbfError::Config(format!(
                "{} cannot be used in the first training phase (LVQ1 or OLVQ1 only)",
                kind
            ))),
        }
    }

    /// Trainer settings of the second phase, if enabled.
    pub fn phase_b(&self) -> Result<Option<TrainerSettings>> {
        match self.trainer_b {
            None => Ok(None),
            Some(kind) => TrainerSettings::new(
                kind,
                self.learn_rate_b,
                self.learn_factor,
                self.window_size,
            )
            .map(Some),
        }
    }

    /// Slope of the output sigmoid.
    #[inline]
    pub fn sigmoid_slope(&self) -> f64 {
        crate::activation::sigmoid_slope(self.high)
    }

    /// Number of progress steps a full training run reports.
    #[inline]
    pub fn progress_steps(&self) -> u64 {
        (self.presentations_a + self.presentations_b + 3) as u64
    }
}
