//! Learning Vector Quantization for the hidden layer prototypes.
//!
//! This module provides the two halves of competitive learning:
//!
//! - **Initialization** (init.rs): random sampling or farthest-point
//!   selection of training vectors as starting prototypes
//! - **Training** (trainer.rs): the LVQ1, OLVQ1, LVQ3, OLVQ3 and LVQ4
//!   update rules

mod init;
mod trainer;

pub use init::{sample_without_replacement, PrototypeInit};
pub use trainer::{two_min_index, LvqKind, LvqScratch, LvqTrainer, TrainerSettings};

use crate::error::{RbfError, Result};
use ndarray::ArrayView2;

/// Training vectors together with their dense internal class ids.
#[derive(Debug, Clone)]
pub struct TrainingSet<'a> {
    /// One training vector per row.
    pub features: ArrayView2<'a, f64>,
    /// Internal class id (0..num_classes) of every row.
    pub classes: &'a [usize],
    /// Number of rows belonging to each class.
    pub views_per_class: Vec<usize>,
}

impl<'a> TrainingSet<'a> {
    /// Creates a training set, counting the rows of each class.
    pub fn new(features: ArrayView2<'a, f64>, classes: &'a [usize], num_classes: usize) -> Result<Self> {
        if features.nrows() == 0 {
            return Err(RbfError::EmptyInput("no training vectors".to_string()));
        }
        if classes.len() != features.nrows() {
            return Err(RbfError::DimensionMismatch {
                expected: features.nrows(),
                found: classes.len(),
            });
        }

        let mut views_per_class = vec![0usize; num_classes];
        for &class in classes {
            if class >= num_classes {
                return Err(RbfError::Training(format!(
                    "class id {} out of range for {} classes",
                    class, num_classes
                )));
            }
            views_per_class[class] += 1;
        }

        Ok(Self {
            features,
            classes,
            views_per_class,
        })
    }

    /// Number of training vectors.
    #[inline]
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    /// Returns true if the set holds no vectors.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }

    /// Dimensionality of the training vectors.
    #[inline]
    pub fn dim(&self) -> usize {
        self.features.ncols()
    }

    /// Number of classes.
    #[inline]
    pub fn num_classes(&self) -> usize {
        self.views_per_class.len()
    }

    /// Row indices of the vectors of one class, in training order.
    pub fn class_members(&self, class: usize) -> Vec<usize> {
        self.classes
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c == class)
            .map(|(i, _)| i)
            .collect()
    }
}
