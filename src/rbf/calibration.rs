//! Label remapping and the calibrated probability table.

use crate::error::{RbfError, Result};
use log::warn;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bijection between external labels and dense internal class ids.
///
/// Internal ids are assigned in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<i32>", into = "Vec<i32>")]
pub struct LabelMap {
    labels: Vec<i32>,
    index: HashMap<i32, usize>,
}

impl LabelMap {
    /// Builds the map from a label sequence and returns the internal id of
    /// every element.
    pub fn from_labels(labels: &[i32]) -> (Self, Vec<usize>) {
        let mut map = Self::default();
        let ids = labels.iter().map(|&label| map.insert(label)).collect();
        (map, ids)
    }

    fn insert(&mut self, label: i32) -> usize {
        if let Some(&id) = self.index.get(&label) {
            return id;
        }
        let id = self.labels.len();
        self.labels.push(label);
        self.index.insert(label, id);
        id
    }

    /// Internal id of an external label.
    #[inline]
    pub fn internal(&self, label: i32) -> Option<usize> {
        self.index.get(&label).copied()
    }

    /// External label of an internal id.
    #[inline]
    pub fn external(&self, id: usize) -> Option<i32> {
        self.labels.get(id).copied()
    }

    /// External labels indexed by internal id.
    #[inline]
    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    /// Number of classes.
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True if no label was seen.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl From<Vec<i32>> for LabelMap {
    fn from(labels: Vec<i32>) -> Self {
        let mut map = Self::default();
        for label in labels {
            map.insert(label);
        }
        map
    }
}

impl From<LabelMap> for Vec<i32> {
    fn from(map: LabelMap) -> Self {
        map.labels
    }
}

/// For every output unit, the distribution of true classes among the
/// training samples it won.
///
/// Rows are sparse lists of `(internal class, probability)`; an empty row
/// belongs to a unit that never won.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityTable {
    rows: Vec<Vec<(usize, f64)>>,
}

impl ProbabilityTable {
    /// Assembles a table from explicit rows.
    pub fn from_rows(rows: Vec<Vec<(usize, f64)>>, num_classes: usize) -> Result<Self> {
        for row in &rows {
            if let Some(&(class, _)) = row.iter().find(|(c, _)| *c >= num_classes) {
                return Err(RbfError::DimensionMismatch {
                    expected: num_classes,
                    found: class + 1,
                });
            }
        }
        Ok(Self { rows })
    }

    /// Normalizes each row of a `[output winner][true class]` count matrix.
    ///
    /// Returns the table and the rows whose counts sum to zero.
    pub fn from_confusion(confusion: &Array2<f64>) -> (Self, Vec<usize>) {
        let mut rows = Vec::with_capacity(confusion.nrows());
        let mut empty = Vec::new();

        for (i, counts) in confusion.outer_iter().enumerate() {
            let sum = counts.sum();
            if sum == 0.0 {
                empty.push(i);
                rows.push(Vec::new());
                continue;
            }
            rows.push(
                counts
                    .iter()
                    .enumerate()
                    .filter(|&(_, &n)| n != 0.0)
                    .map(|(class, &n)| (class, n / sum))
                    .collect(),
            );
        }

        (Self { rows }, empty)
    }

    /// Sparse rows, one per output unit.
    #[inline]
    pub fn rows(&self) -> &[Vec<(usize, f64)>] {
        &self.rows
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Mixes the rows weighted by the output activations.
    pub fn apply(&self, outputs: ArrayView1<f64>, num_classes: usize) -> Array1<f64> {
        let mut result = Array1::zeros(num_classes);
        for (weight, row) in outputs.iter().zip(self.rows.iter()) {
            for &(class, p) in row {
                if class < num_classes {
                    result[class] += weight * p;
                }
            }
        }
        result
    }
}

/// Counts `[winner][true class]` pairs.
pub fn confusion_matrix(winners: &[usize], truth: &[usize], num_classes: usize) -> Array2<f64> {
    let mut counts = Array2::zeros((num_classes, num_classes));
    for (&w, &t) in winners.iter().zip(truth.iter()) {
        if w < num_classes && t < num_classes {
            counts[[w, t]] += 1.0;
        }
    }
    counts
}

/// Builds the table and reports output units that never won, as external
/// labels.
pub fn calibrate(
    winners: &[usize],
    truth: &[usize],
    labels: &LabelMap,
) -> (ProbabilityTable, Vec<i32>) {
    let confusion = confusion_matrix(winners, truth, labels.len());
    let (table, empty) = ProbabilityTable::from_confusion(&confusion);

    let inactive: Vec<i32> = empty.iter().filter_map(|&i| labels.external(i)).collect();
    if !inactive.is_empty() {
        warn!("Classes never selected as winner during calibration: {:?}", inactive);
    }
    (table, inactive)
}
