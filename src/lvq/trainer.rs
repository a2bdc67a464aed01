//! LVQ update rules.
//!
//! Every rule follows the same contract: propagate one input through the
//! prototype matrix with a plain distance layer, pick the winner (smallest
//! distance) and possibly the runner-up, then nudge those prototypes toward
//! or away from the input depending on their class.

use crate::error::{RbfError, Result};
use crate::propagation::{DistanceKind, DistancePropagation};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The supported LVQ variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LvqKind {
    /// Attract the winner on a match, repel it otherwise.
    Lvq1,
    /// LVQ1 with per-neuron adaptive learning rates.
    Olvq1,
    /// Two-winner update inside a window around the decision border.
    Lvq3,
    /// LVQ3 with per-neuron adaptive learning rates.
    Olvq3,
    /// LVQ3 variant that also repels a wrong winner outside the window.
    Lvq4,
}

impl LvqKind {
    /// True for the variants that keep one learning rate per neuron.
    #[inline]
    pub fn is_optimized(&self) -> bool {
        matches!(self, LvqKind::Olvq1 | LvqKind::Olvq3)
    }

    /// True for the variants that use the window test.
    #[inline]
    pub fn uses_window(&self) -> bool {
        matches!(self, LvqKind::Lvq3 | LvqKind::Olvq3 | LvqKind::Lvq4)
    }
}

impl fmt::Display for LvqKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LvqKind::Lvq1 => "LVQ1",
            LvqKind::Olvq1 => "OLVQ1",
            LvqKind::Lvq3 => "LVQ3",
            LvqKind::Olvq3 => "OLVQ3",
            LvqKind::Lvq4 => "LVQ4",
        };
        f.write_str(name)
    }
}

/// Validated hyperparameters of one training phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainerSettings {
    /// Update rule.
    pub kind: LvqKind,
    /// Base learning rate.
    pub learn_rate: f64,
    /// Extra scale for same-class updates and LVQ4 repulsion.
    pub learn_factor: f64,
    /// Relative window width as configured.
    pub window_size: f64,
    /// `(1 - window_size) / (1 + window_size)`, the ratio a pair of
    /// distances has to exceed to be inside the window.
    pub window_threshold: f64,
}

impl TrainerSettings {
    /// Checks the parameter combination for `kind`.
    ///
    /// LVQ3 and LVQ4 need a non-zero window. LVQ1 and OLVQ1 accept neither a
    /// learn factor nor a window.
    pub fn new(kind: LvqKind, learn_rate: f64, learn_factor: f64, window_size: f64) -> Result<Self> {
        if !learn_rate.is_finite() {
            return Err(RbfError::Config(format!(
                "{} learning rate must be finite, got {}",
                kind, learn_rate
            )));
        }
        if window_size == 0.0 && matches!(kind, LvqKind::Lvq3 | LvqKind::Lvq4) {
            return Err(RbfError::Config(format!(
                "{} needs a learn factor and a window size",
                kind
            )));
        }
        if (learn_factor != 0.0 || window_size != 0.0) && !kind.uses_window() {
            return Err(RbfError::Config(format!(
                "{} takes a learning rate only; learn factor and window size must be 0",
                kind
            )));
        }

        Ok(Self {
            kind,
            learn_rate,
            learn_factor,
            window_size,
            window_threshold: (1.0 - window_size) / (1.0 + window_size),
        })
    }
}

/// Working buffers shared by all presentations of an epoch.
#[derive(Debug, Clone)]
pub struct LvqScratch {
    /// Distance of the current input to every prototype.
    pub activations: Array1<f64>,
    delta: Array1<f64>,
    delta2: Array1<f64>,
}

impl LvqScratch {
    /// Allocates buffers for `neurons` prototypes of dimension `dim`.
    pub fn new(dim: usize, neurons: usize) -> Self {
        Self {
            activations: Array1::zeros(neurons),
            delta: Array1::zeros(dim),
            delta2: Array1::zeros(dim),
        }
    }

    fn ensure(&mut self, dim: usize) {
        if self.delta.len() != dim {
            self.delta = Array1::zeros(dim);
            self.delta2 = Array1::zeros(dim);
        }
    }
}

/// One configured LVQ update rule.
#[derive(Debug, Clone)]
pub struct LvqTrainer {
    settings: TrainerSettings,
    propagation: DistancePropagation,
    /// Per-neuron rates of the optimized variants, empty otherwise.
    rates: Vec<f64>,
}

impl LvqTrainer {
    /// Creates a trainer for a layer of `neurons` prototypes.
    ///
    /// Optimized variants start every neuron at the base learning rate.
    pub fn new(settings: TrainerSettings, distance: DistanceKind, neurons: usize) -> Self {
        let rates = if settings.kind.is_optimized() {
            vec![settings.learn_rate; neurons]
        } else {
            Vec::new()
        };
        Self {
            settings,
            propagation: DistancePropagation::plain(distance),
            rates,
        }
    }

    /// The settings this trainer was built with.
    #[inline]
    pub fn settings(&self) -> &TrainerSettings {
        &self.settings
    }

    /// Current per-neuron learning rates (empty for non-optimized rules).
    #[inline]
    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    /// Presents one labelled input and updates `weights` in place.
    ///
    /// Returns whether any prototype was moved.
    pub fn present(
        &mut self,
        input: ArrayView1<f64>,
        weights: &mut Array2<f64>,
        out_ids: &[usize],
        label: usize,
        scratch: &mut LvqScratch,
    ) -> Result<bool> {
        if out_ids.len() != weights.nrows() {
            return Err(RbfError::DimensionMismatch {
                expected: weights.nrows(),
                found: out_ids.len(),
            });
        }
        if weights.nrows() == 0 {
            return Err(RbfError::EmptyInput("no prototypes to train".to_string()));
        }
        if self.settings.kind.is_optimized() && self.rates.len() != weights.nrows() {
            self.rates = vec![self.settings.learn_rate; weights.nrows()];
        }

        self.propagation
            .propagate_into(input, weights.view(), &mut scratch.activations)?;
        scratch.ensure(input.len());

        let modified = match self.settings.kind {
            kind if kind.uses_window() => self.two_winner(input, weights, out_ids, label, scratch),
            LvqKind::Olvq1 => self.olvq1(input, weights, out_ids, label, scratch),
            _ => self.lvq1(input, weights, out_ids, label, scratch),
        };
        Ok(modified)
    }

    fn lvq1(
        &mut self,
        input: ArrayView1<f64>,
        weights: &mut Array2<f64>,
        out_ids: &[usize],
        label: usize,
        scratch: &mut LvqScratch,
    ) -> bool {
        let winner = first_min_index(&scratch.activations);
        fill_delta(&mut scratch.delta, input, weights, winner, self.settings.learn_rate);

        if out_ids[winner] == label {
            move_row(weights, winner, &scratch.delta, 1.0);
        } else {
            move_row(weights, winner, &scratch.delta, -1.0);
        }
        true
    }

    fn olvq1(
        &mut self,
        input: ArrayView1<f64>,
        weights: &mut Array2<f64>,
        out_ids: &[usize],
        label: usize,
        scratch: &mut LvqScratch,
    ) -> bool {
        let winner = first_min_index(&scratch.activations);
        fill_delta(&mut scratch.delta, input, weights, winner, self.rates[winner]);

        if out_ids[winner] == label {
            move_row(weights, winner, &scratch.delta, 1.0);
            self.shrink_rate(winner);
        } else {
            move_row(weights, winner, &scratch.delta, -1.0);
            self.grow_rate(winner);
        }
        true
    }

    /// LVQ3, OLVQ3 and LVQ4 share the window test and the branch layout.
    fn two_winner(
        &mut self,
        input: ArrayView1<f64>,
        weights: &mut Array2<f64>,
        out_ids: &[usize],
        label: usize,
        scratch: &mut LvqScratch,
    ) -> bool {
        let kind = self.settings.kind;
        let optimized = kind.is_optimized();
        let factor = self.settings.learn_factor;

        let (winner, second) = two_min_index(&scratch.activations);
        let (rate_w, rate_s) = if optimized {
            (self.rates[winner], self.rates[second])
        } else {
            (self.settings.learn_rate, self.settings.learn_rate)
        };

        // Both deltas come from the prototypes before any update
        fill_delta(&mut scratch.delta, input, weights, winner, rate_w);
        fill_delta(&mut scratch.delta2, input, weights, second, rate_s);

        let winner_matches = out_ids[winner] == label;
        let second_matches = out_ids[second] == label;

        if (winner_matches || second_matches)
            && in_window(
                scratch.activations[winner],
                scratch.activations[second],
                self.settings.window_threshold,
            )
        {
            if out_ids[winner] != out_ids[second] {
                if winner_matches {
                    move_row(weights, winner, &scratch.delta, 1.0);
                    move_row(weights, second, &scratch.delta2, -1.0);
                    if optimized {
                        self.shrink_rate(winner);
                        self.grow_rate(second);
                    }
                } else {
                    move_row(weights, second, &scratch.delta2, 1.0);
                    move_row(weights, winner, &scratch.delta, -1.0);
                    if optimized {
                        self.shrink_rate(second);
                        self.grow_rate(winner);
                    }
                }
            } else if winner_matches {
                move_row(weights, winner, &scratch.delta, factor);
                // LVQ4 only pulls the winner of a same-class pair
                if kind != LvqKind::Lvq4 {
                    move_row(weights, second, &scratch.delta2, factor);
                }
                if optimized {
                    self.shrink_rate(winner);
                    self.shrink_rate(second);
                }
            }
            return true;
        }

        if kind == LvqKind::Lvq4 && !winner_matches {
            move_row(weights, winner, &scratch.delta, -factor);
            return true;
        }

        false
    }

    #[inline]
    fn shrink_rate(&mut self, neuron: usize) {
        let lr = self.rates[neuron];
        self.rates[neuron] = lr / (1.0 + lr);
    }

    #[inline]
    fn grow_rate(&mut self, neuron: usize) {
        let lr = self.rates[neuron];
        self.rates[neuron] = (lr / (1.0 - lr)).min(self.settings.learn_rate);
    }
}

/// Indices of the smallest and second smallest value.
///
/// Both start at element 0. Element 1 takes the first place only when
/// strictly smaller than element 0, otherwise the second. Later elements
/// move in only when strictly smaller than the current second minimum, so
/// ties keep the earlier index. With a single element both indices are 0.
pub fn two_min_index<'a, I>(values: I) -> (usize, usize)
where
    I: IntoIterator<Item = &'a f64>,
{
    let mut iter = values.into_iter().enumerate();
    let (mut first, mut second) = (0usize, 0usize);
    let (mut min1, mut min2) = match iter.next() {
        Some((_, &v)) => (v, v),
        None => return (0, 0),
    };

    if let Some((_, &v)) = iter.next() {
        if v < min1 {
            min2 = min1;
            min1 = v;
            first = 1;
        } else {
            min2 = v;
            second = 1;
        }
    }

    for (i, &v) in iter {
        if v < min2 {
            if v < min1 {
                second = first;
                min2 = min1;
                first = i;
                min1 = v;
            } else {
                second = i;
                min2 = v;
            }
        }
    }

    (first, second)
}

fn first_min_index(values: &Array1<f64>) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v < values[best] {
            best = i;
        }
    }
    best
}

/// Ratio of the smaller to the larger distance against the threshold.
/// A NaN ratio (both distances zero) fails the test.
#[inline]
fn in_window(dw: f64, ds: f64, threshold: f64) -> bool {
    let ratio = if dw < ds { dw / ds } else { ds / dw };
    ratio > threshold
}

#[inline]
fn fill_delta(delta: &mut Array1<f64>, input: ArrayView1<f64>, weights: &Array2<f64>, row: usize, rate: f64) {
    delta.assign(&input);
    *delta -= &weights.row(row);
    *delta *= rate;
}

#[inline]
fn move_row(weights: &mut Array2<f64>, row: usize, delta: &Array1<f64>, scale: f64) {
    weights.row_mut(row).scaled_add(scale, delta);
}
