//! Layer propagation: distance and dot-product layers.
//!
//! A propagation maps an input vector through a weight matrix (one row per
//! neuron) and then applies an [`ActivationKind`] to the whole result.

use crate::activation::ActivationKind;
use crate::error::{RbfError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Distance used between inputs and prototypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceKind {
    /// Manhattan (city block) distance.
    L1,
    /// Euclidean distance.
    L2,
}

impl DistanceKind {
    /// Computes the distance between two vectors of equal length.
    #[inline]
    pub fn between(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            DistanceKind::L1 => manhattan(a, b),
            DistanceKind::L2 => euclidean(a, b),
        }
    }
}

/// Manhattan distance.
#[inline]
pub fn manhattan(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

/// Euclidean distance.
#[inline]
pub fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Distance of an input to every row of a weight matrix, then activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistancePropagation {
    /// Distance between the input and each row.
    pub distance: DistanceKind,
    /// Activation applied to the distance vector.
    pub activation: ActivationKind,
}

impl DistancePropagation {
    /// Creates a new distance propagation.
    pub fn new(distance: DistanceKind, activation: ActivationKind) -> Self {
        Self {
            distance,
            activation,
        }
    }

    /// Raw distances, no activation.
    pub fn plain(distance: DistanceKind) -> Self {
        Self::new(distance, ActivationKind::Identity)
    }

    /// Propagates `input` into a reusable output buffer.
    ///
    /// The buffer is reallocated only when its length differs from the
    /// number of rows in `weights`.
    pub fn propagate_into(
        &self,
        input: ArrayView1<f64>,
        weights: ArrayView2<f64>,
        output: &mut Array1<f64>,
    ) -> Result<()> {
        check_input(input, weights)?;

        if output.len() != weights.nrows() {
            *output = Array1::zeros(weights.nrows());
        }

        for (out, row) in output.iter_mut().zip(weights.outer_iter()) {
            *out = self.distance.between(input, row);
        }

        activate(&self.activation, output)
    }

    /// Propagates `input` and returns a freshly allocated output.
    pub fn propagate(&self, input: ArrayView1<f64>, weights: ArrayView2<f64>) -> Result<Array1<f64>> {
        let mut output = Array1::zeros(weights.nrows());
        self.propagate_into(input, weights, &mut output)?;
        Ok(output)
    }
}

/// Matrix-vector product followed by an activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DotPropagation {
    /// Activation applied to the product.
    pub activation: ActivationKind,
}

impl DotPropagation {
    /// Creates a new dot propagation.
    pub fn new(activation: ActivationKind) -> Self {
        Self { activation }
    }

    /// Computes `activation(weights * input)`.
    pub fn propagate(&self, input: ArrayView1<f64>, weights: ArrayView2<f64>) -> Result<Array1<f64>> {
        check_input(input, weights)?;
        let mut output = weights.dot(&input);
        activate(&self.activation, &mut output)?;
        Ok(output)
    }
}

#[inline]
fn check_input(input: ArrayView1<f64>, weights: ArrayView2<f64>) -> Result<()> {
    if input.len() != weights.ncols() {
        return Err(RbfError::DimensionMismatch {
            expected: weights.ncols(),
            found: input.len(),
        });
    }
    Ok(())
}

fn activate(activation: &ActivationKind, output: &mut Array1<f64>) -> Result<()> {
    let applied = match output.as_slice_mut() {
        Some(values) => activation.apply(values),
        None => {
            let mut values = output.to_vec();
            let ok = activation.apply(&mut values);
            output.assign(&ArrayView1::from(&values[..]));
            ok
        }
    };

    if applied {
        Ok(())
    } else {
        Err(RbfError::Config(format!(
            "activation parameters do not cover {} neurons",
            output.len()
        )))
    }
}
