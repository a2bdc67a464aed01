//! The hidden layer: class-blocked prototypes with Gaussian activations.

use crate::activation::{ActivationKind, Sigma};
use crate::error::{RbfError, Result};
use crate::lvq::{LvqScratch, LvqTrainer, PrototypeInit, TrainerSettings, TrainingSet};
use crate::propagation::{euclidean, DistanceKind, DistancePropagation};
use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Prototype matrix, per-prototype classes and Gaussian widths.
///
/// The widths live inside the layer's distance propagation, which is
/// rebuilt only when the sigmas change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiddenLayer {
    propagation: DistancePropagation,
    weights: Array2<f64>,
    out_ids: Vec<usize>,
}

impl HiddenLayer {
    /// Creates a zero-filled layer of `num_classes * hidden_per_class`
    /// prototypes laid out in class blocks.
    pub fn new(num_classes: usize, hidden_per_class: usize, dim: usize, distance: DistanceKind) -> Self {
        let neurons = num_classes * hidden_per_class;
        Self {
            propagation: gaussian_propagation(distance, vec![0.0; neurons]),
            weights: Array2::zeros((neurons, dim)),
            out_ids: (0..neurons).map(|i| i / hidden_per_class.max(1)).collect(),
        }
    }

    /// Assembles a layer from existing prototypes, classes and widths.
    pub fn from_parts(
        weights: Array2<f64>,
        out_ids: Vec<usize>,
        sigmas: Vec<f64>,
        distance: DistanceKind,
    ) -> Result<Self> {
        if out_ids.len() != weights.nrows() {
            return Err(RbfError::DimensionMismatch {
                expected: weights.nrows(),
                found: out_ids.len(),
            });
        }
        if sigmas.len() != weights.nrows() {
            return Err(RbfError::DimensionMismatch {
                expected: weights.nrows(),
                found: sigmas.len(),
            });
        }
        Ok(Self {
            propagation: gaussian_propagation(distance, sigmas),
            weights,
            out_ids,
        })
    }

    /// Distance used for propagation.
    #[inline]
    pub fn distance(&self) -> DistanceKind {
        self.propagation.distance
    }

    /// Prototype matrix, one row per neuron.
    #[inline]
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    /// Class id of every prototype.
    #[inline]
    pub fn out_ids(&self) -> &[usize] {
        &self.out_ids
    }

    /// Gaussian width of every prototype.
    #[inline]
    ///
    /// Empty if the propagation does not carry per-prototype widths, which
    /// only happens for a hand-edited model file.
    pub fn sigmas(&self) -> &[f64] {
        match &self.propagation.activation {
            ActivationKind::Gaussian {
                sigma: Sigma::PerNeuron(sigmas),
                ..
            } => sigmas,
            _ => &[],
        }
    }

    /// Number of prototypes.
    #[inline]
    pub fn neurons(&self) -> usize {
        self.weights.nrows()
    }

    /// Input dimensionality.
    #[inline]
    pub fn dim(&self) -> usize {
        self.weights.ncols()
    }

    /// Length of the first class block in `out_ids`.
    pub fn block_size(&self) -> usize {
        match self.out_ids.first() {
            Some(&first) => self.out_ids.iter().take_while(|&&id| id == first).count(),
            None => 0,
        }
    }

    /// Sets every sigma to `factor` times the Euclidean distance to the
    /// nearest prototype of another class block.
    ///
    /// A prototype with no foreign neighbour gets `factor * f64::MAX`.
    pub fn compute_sigmas(&mut self, factor: f64) {
        let neurons = self.neurons();
        let block = self.block_size().max(1);
        let mut sigmas = vec![f64::MAX; neurons];

        for (i, sigma) in sigmas.iter_mut().enumerate() {
            let row = self.weights.row(i);
            for j in 0..neurons {
                if i / block != j / block {
                    let d = euclidean(row, self.weights.row(j));
                    if d < *sigma {
                        *sigma = d;
                    }
                }
            }
            *sigma *= factor;
        }

        debug!("Computed {} sigmas with block size {}", neurons, block);
        self.propagation = gaussian_propagation(self.propagation.distance, sigmas);
    }

    /// Distance layer followed by the per-prototype Gaussian.
    #[inline]
    pub fn propagation(&self) -> &DistancePropagation {
        &self.propagation
    }

    /// Activation of every prototype for one input.
    pub fn propagate(&self, input: ArrayView1<f64>) -> Result<Array1<f64>> {
        self.propagation.propagate(input, self.weights.view())
    }

    /// Design matrix `H`: row `i` is the activation vector of sample `i`.
    pub fn design_matrix(&self, features: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.activations_of(features)
    }

    /// Self-activation matrix `Htilde`: row `i` is the activation vector of
    /// prototype `i`.
    pub fn self_activation(&self) -> Result<Array2<f64>> {
        self.activations_of(self.weights.view())
    }

    fn activations_of(&self, inputs: ArrayView2<f64>) -> Result<Array2<f64>> {
        let propagation = &self.propagation;
        let mut out = Array2::zeros((inputs.nrows(), self.neurons()));
        let mut buffer = Array1::zeros(self.neurons());
        for (i, input) in inputs.outer_iter().enumerate() {
            propagation.propagate_into(input, self.weights.view(), &mut buffer)?;
            out.row_mut(i).assign(&buffer);
        }
        Ok(out)
    }

    /// Online training of single vectors is not supported.
    pub fn train_single(&mut self, _input: ArrayView1<f64>, _label: usize) -> Result<()> {
        Err(RbfError::Training(
            "Training for RBF nets is not implemented! Initialization is sufficient for use".to_string(),
        ))
    }
}

fn gaussian_propagation(distance: DistanceKind, sigmas: Vec<f64>) -> DistancePropagation {
    DistancePropagation::new(distance, ActivationKind::gaussian(0.0, sigmas))
}

/// Where a [`HiddenLayerTrainer`] stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    /// Prototypes not yet initialized.
    Uninitialized,
    /// Prototypes initialized, no epoch run.
    Initialized,
    /// At least one epoch run and the last one moved a prototype.
    Training {
        /// Number of epochs run so far.
        step: usize,
    },
    /// An epoch moved no prototype; further epochs are skipped.
    Converged,
}

/// Drives initialization and LVQ epochs over a [`HiddenLayer`].
#[derive(Debug, Clone)]
pub struct HiddenLayerTrainer {
    init: PrototypeInit,
    hidden_per_class: usize,
    settings: Option<TrainerSettings>,
    trainer: Option<LvqTrainer>,
    changed: bool,
    modified: bool,
    step: usize,
    state: TrainingState,
    order: Vec<usize>,
}

impl HiddenLayerTrainer {
    /// Creates a trainer using `init` for the first step.
    pub fn new(init: PrototypeInit, hidden_per_class: usize) -> Self {
        Self {
            init,
            hidden_per_class,
            settings: None,
            trainer: None,
            changed: false,
            modified: false,
            step: 0,
            state: TrainingState::Uninitialized,
            order: Vec::new(),
        }
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> TrainingState {
        self.state
    }

    /// Number of epochs run so far, skipped ones excluded.
    #[inline]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Selects the update rule for the following epochs.
    ///
    /// The rule is rebuilt (and OLVQ rates reset) on the next epoch.
    pub fn set_trainer(&mut self, settings: TrainerSettings) {
        self.settings = Some(settings);
        self.changed = true;
    }

    /// Performs one step: initialization on the first call, one LVQ epoch
    /// on every later call.
    ///
    /// Returns whether any prototype changed during the step.
    pub fn advance<R: Rng>(
        &mut self,
        layer: &mut HiddenLayer,
        set: &TrainingSet<'_>,
        rng: &mut R,
    ) -> Result<bool> {
        match self.state {
            TrainingState::Uninitialized => {
                let mut out_ids = vec![0usize; layer.neurons()];
                self.init.initialize(
                    set,
                    self.hidden_per_class,
                    layer.distance(),
                    &mut layer.weights,
                    &mut out_ids,
                    rng,
                )?;
                layer.out_ids = out_ids;
                self.order = (0..set.len()).collect();
                self.modified = true;
                self.state = TrainingState::Initialized;
                Ok(true)
            }
            TrainingState::Converged => Ok(false),
            TrainingState::Initialized | TrainingState::Training { .. } => {
                if !self.modified {
                    self.state = TrainingState::Converged;
                    return Ok(false);
                }
                self.epoch(layer, set, rng)
            }
        }
    }

    fn epoch<R: Rng>(&mut self, layer: &mut HiddenLayer, set: &TrainingSet<'_>, rng: &mut R) -> Result<bool> {
        if self.changed || self.trainer.is_none() {
            let settings = self
                .settings
                .ok_or_else(|| RbfError::Training("no LVQ trainer selected".to_string()))?;
            self.trainer = Some(LvqTrainer::new(settings, layer.distance(), layer.neurons()));
            self.changed = false;
        }
        let trainer = self
            .trainer
            .as_mut()
            .ok_or_else(|| RbfError::Training("no LVQ trainer selected".to_string()))?;

        self.order.shuffle(rng);

        let mut scratch = LvqScratch::new(set.dim(), layer.neurons());
        let mut any_modified = false;
        for &idx in &self.order {
            let moved = trainer.present(
                set.features.row(idx),
                &mut layer.weights,
                &layer.out_ids,
                set.classes[idx],
                &mut scratch,
            )?;
            any_modified |= moved;
        }

        self.step += 1;
        self.modified = any_modified;
        self.state = if any_modified {
            TrainingState::Training { step: self.step }
        } else {
            TrainingState::Converged
        };
        debug!(
            "LVQ epoch {} with {}: modified = {}",
            self.step,
            trainer.settings().kind,
            any_modified
        );
        Ok(any_modified)
    }
}
