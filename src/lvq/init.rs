//! Prototype initialization for the hidden layer.
//!
//! Prototypes are laid out in contiguous class blocks: neuron `i` belongs
//! to class `i / hidden_per_class`.

use super::TrainingSet;
use crate::error::{RbfError, Result};
use crate::propagation::DistanceKind;
use log::{debug, warn};
use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the hidden layer prototypes are chosen before LVQ training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrototypeInit {
    /// Random training vectors of each class.
    Random,
    /// Training vectors spread as far apart as possible within each class.
    MaxDistance,
}

impl PrototypeInit {
    /// Fills `weights` and `out_ids` from the training set.
    ///
    /// `weights` must have `num_classes * hidden_per_class` rows and as many
    /// columns as the training vectors, `out_ids` one entry per row.
    pub fn initialize<R: Rng>(
        &self,
        set: &TrainingSet<'_>,
        hidden_per_class: usize,
        distance: DistanceKind,
        weights: &mut Array2<f64>,
        out_ids: &mut [usize],
        rng: &mut R,
    ) -> Result<()> {
        let neurons = set.num_classes() * hidden_per_class;
        if weights.nrows() != neurons || out_ids.len() != neurons {
            return Err(RbfError::DimensionMismatch {
                expected: neurons,
                found: weights.nrows(),
            });
        }
        if weights.ncols() != set.dim() {
            return Err(RbfError::DimensionMismatch {
                expected: set.dim(),
                found: weights.ncols(),
            });
        }

        // Class ids follow the block layout even where a block stays short
        for (i, id) in out_ids.iter_mut().enumerate() {
            *id = i / hidden_per_class;
        }

        match self {
            PrototypeInit::Random => random_init(set, hidden_per_class, weights, rng),
            PrototypeInit::MaxDistance => max_distance_init(set, hidden_per_class, distance, weights),
        }

        Ok(())
    }
}

/// Draws `count.min(available)` distinct indices from `0..available`.
///
/// Each draw removes the picked index from the pool by swapping in the last
/// remaining one. The result is sorted ascending.
pub fn sample_without_replacement<R: Rng>(available: usize, count: usize, rng: &mut R) -> Vec<usize> {
    let take = count.min(available);
    let mut pool: Vec<usize> = (0..available).collect();
    let mut chosen = Vec::with_capacity(take);

    for j in 0..take {
        let remaining = available - j;
        let k = rng.gen_range(0..remaining);
        chosen.push(pool[k]);
        pool[k] = pool[remaining - 1];
    }

    chosen.sort_unstable();
    chosen
}

fn random_init<R: Rng>(
    set: &TrainingSet<'_>,
    hidden_per_class: usize,
    weights: &mut Array2<f64>,
    rng: &mut R,
) {
    let num_classes = set.num_classes();

    // Ordinal positions (within each class) of the vectors to copy
    let picks: Vec<Vec<usize>> = set
        .views_per_class
        .iter()
        .map(|&available| sample_without_replacement(available, hidden_per_class, rng))
        .collect();

    for (class, &available) in set.views_per_class.iter().enumerate() {
        if available < hidden_per_class {
            warn!(
                "Class {} has only {} training vectors for {} prototypes; {} prototypes keep their zero fill",
                class,
                available,
                hidden_per_class,
                hidden_per_class - available
            );
        }
    }

    let mut seen = vec![0usize; num_classes];
    let mut filled = vec![0usize; num_classes];

    for (row, &class) in set.classes.iter().enumerate() {
        let slot = filled[class];
        if slot < picks[class].len() && picks[class][slot] == seen[class] {
            weights
                .row_mut(class * hidden_per_class + slot)
                .assign(&set.features.row(row));
            filled[class] += 1;
        }
        seen[class] += 1;
    }

    debug!("Random initialization filled {:?} prototypes per class", filled);
}

fn max_distance_init(
    set: &TrainingSet<'_>,
    hidden_per_class: usize,
    distance: DistanceKind,
    weights: &mut Array2<f64>,
) {
    for class in 0..set.num_classes() {
        let members = set.class_members(class);
        let views = members.len();
        if views == 0 {
            continue;
        }

        // First prototype: the vector with the smallest squared norm
        let first = arg_min(members.iter().map(|&m| {
            let row = set.features.row(m);
            row.dot(&row)
        }));

        let block = class * hidden_per_class;
        weights.row_mut(block).assign(&set.features.row(members[first]));

        let mut pairwise = Array2::<f64>::zeros((views, views));
        for i in 0..views {
            for j in (i + 1)..views {
                let d = distance.between(set.features.row(members[i]), set.features.row(members[j]));
                pairwise[[i, j]] = d;
                pairwise[[j, i]] = d;
            }
        }

        // Running product of distances to every prototype chosen so far
        let mut cumulative: Array1<f64> = pairwise.row(first).to_owned();
        for slot in 1..hidden_per_class {
            let farthest = arg_max(cumulative.iter().copied());
            weights
                .row_mut(block + slot)
                .assign(&set.features.row(members[farthest]));
            cumulative *= &pairwise.row(farthest);
        }
    }
}

/// Index of the first minimum.
fn arg_min<I: Iterator<Item = f64>>(values: I) -> usize {
    let mut best_idx = 0;
    let mut best = f64::INFINITY;
    for (i, v) in values.enumerate() {
        if i == 0 || v < best {
            best = v;
            best_idx = i;
        }
    }
    best_idx
}

/// Index of the first maximum.
fn arg_max<I: Iterator<Item = f64>>(values: I) -> usize {
    let mut best_idx = 0;
    let mut best = f64::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if i == 0 || v > best {
            best = v;
            best_idx = i;
        }
    }
    best_idx
}
