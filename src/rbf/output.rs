//! Output layer: regularized least squares over the hidden activations.
//!
//! With `H` the sample activations and `Htilde` the prototype
//! self-activations, the weights solve
//!
//! ```text
//! (HᵗH - lambda * Htilde) W2ᵗ = Hᵗ Y
//! ```
//!
//! where `Y` holds `+1` at the true class of each sample and `-1` elsewhere.

use crate::activation::ActivationKind;
use crate::error::{RbfError, Result};
use crate::propagation::DotPropagation;
use log::debug;
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Singular values below this are treated as zero.
pub const SVD_EPS: f64 = 1e-12;

/// Solver for the normal equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeastSquares {
    /// Singular value decomposition, robust to rank deficiency.
    Svd,
    /// QR decomposition; fails on singular systems.
    Qr,
}

/// Weights from the hidden layer to one sigmoid unit per class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputLayer {
    weights: Array2<f64>,
    out_ids: Vec<usize>,
    slope: f64,
}

impl OutputLayer {
    /// Assembles a layer from a `classes x hidden` weight matrix.
    ///
    /// Output ids are `0..classes`.
    pub fn new(weights: Array2<f64>, slope: f64) -> Self {
        let out_ids = (0..weights.nrows()).collect();
        Self {
            weights,
            out_ids,
            slope,
        }
    }

    /// Solves for the output weights.
    ///
    /// `classes[i]` is the internal class of row `i` of `h`.
    pub fn solve(
        h: ArrayView2<f64>,
        htilde: ArrayView2<f64>,
        classes: &[usize],
        num_classes: usize,
        lambda: f64,
        method: LeastSquares,
        slope: f64,
    ) -> Result<Self> {
        let k = h.ncols();
        if htilde.dim() != (k, k) {
            return Err(RbfError::DimensionMismatch {
                expected: k,
                found: htilde.nrows(),
            });
        }
        if classes.len() != h.nrows() {
            return Err(RbfError::DimensionMismatch {
                expected: h.nrows(),
                found: classes.len(),
            });
        }

        let y = target_matrix(classes, num_classes)?;
        let hty = h.t().dot(&y);
        let m = normal_matrix(h, htilde, lambda);
        // Zero-width prototypes turn activations into NaN; nalgebra's SVD panics on those
        if m.iter().chain(hty.iter()).any(|v| !v.is_finite()) {
            return Err(RbfError::Solver("normal equations are not finite".to_string()));
        }

        let a = DMatrix::from_fn(k, k, |i, j| m[[i, j]]);
        let b = DMatrix::from_fn(k, num_classes, |i, j| hty[[i, j]]);

        let x = match method {
            LeastSquares::Svd => {
                let svd = a
                    .try_svd(true, true, f64::EPSILON, 0)
                    .ok_or_else(|| RbfError::Solver("SVD did not converge".to_string()))?;
                svd.solve(&b, SVD_EPS)
                    .map_err(|e| RbfError::Solver(e.to_string()))?
            }
            LeastSquares::Qr => a
                .qr()
                .solve(&b)
                .ok_or_else(|| RbfError::Solver("normal matrix is singular".to_string()))?,
        };

        if x.iter().any(|v| !v.is_finite()) {
            return Err(RbfError::Solver("output weights are not finite".to_string()));
        }

        debug!("Solved {}x{} output layer with {:?}", num_classes, k, method);

        // X is hidden x classes, the layer stores its transpose
        let weights = Array2::from_shape_fn((num_classes, k), |(c, i)| x[(i, c)]);
        Ok(Self::new(weights, slope))
    }

    /// Weight matrix, one row per class.
    #[inline]
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    /// Class id of every output unit.
    #[inline]
    pub fn out_ids(&self) -> &[usize] {
        &self.out_ids
    }

    /// Slope of the output sigmoid.
    #[inline]
    pub fn slope(&self) -> f64 {
        self.slope
    }

    /// Sigmoid outputs for a hidden activation vector, normalized to sum 1
    /// when the sum is non-zero.
    pub fn propagate(&self, hidden: ArrayView1<f64>) -> Result<Array1<f64>> {
        let mut out = DotPropagation::new(ActivationKind::Sigmoid { slope: self.slope })
            .propagate(hidden, self.weights.view())?;
        let sum = out.sum();
        if sum != 0.0 {
            out /= sum;
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

/// One-vs-rest targets: `+1` at the sample's class, `-1` elsewhere.
pub fn target_matrix(classes: &[usize], num_classes: usize) -> Result<Array2<f64>> {
    let mut y = Array2::from_elem((classes.len(), num_classes), -1.0);
    for (i, &c) in classes.iter().enumerate() {
        if c >= num_classes {
            return Err(RbfError::Training(format!(
                "class id {} out of range for {} classes",
                c, num_classes
            )));
        }
        y[[i, c]] = 1.0;
    }
    Ok(y)
}

/// `HᵗH - lambda * Htilde` from column dot products, lower triangle
/// mirrored to the upper.
pub fn normal_matrix(h: ArrayView2<f64>, htilde: ArrayView2<f64>, lambda: f64) -> Array2<f64> {
    let k = h.ncols();
    let mut m = Array2::zeros((k, k));
    for i in 0..k {
        let ci = h.column(i);
        for j in 0..=i {
            let v = ci.dot(&h.column(j)) - lambda * htilde[[i, j]];
            m[[i, j]] = v;
            m[[j, i]] = v;
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_target_matrix() {
        let y = target_matrix(&[0, 2, 1], 3).unwrap();
        assert_eq!(y, array![[1.0, -1.0, -1.0], [-1.0, -1.0, 1.0], [-1.0, 1.0, -1.0]]);
        assert!(target_matrix(&[3], 3).is_err());
    }

    #[test]
    fn test_normal_matrix_matches_product() {
        let h = array![[1.0, 2.0], [0.5, -1.0], [3.0, 0.0]];
        let htilde = array![[1.0, 0.2], [0.2, 1.0]];
        let m = normal_matrix(h.view(), htilde.view(), 0.5);
        let expected = h.t().dot(&h) - &(0.5 * &htilde);
        for (a, b) in m.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_solve_identity_design() {
        // With H = I the weights reproduce the targets
        let h = Array2::<f64>::eye(2);
        let htilde = Array2::<f64>::eye(2);
        for method in [LeastSquares::Svd, LeastSquares::Qr] {
            let layer = OutputLayer::solve(h.view(), htilde.view(), &[0, 1], 2, 0.0, method, 1.0).unwrap();
            let w = layer.weights();
            assert!((w[[0, 0]] - 1.0).abs() < 1e-9);
            assert!((w[[0, 1]] + 1.0).abs() < 1e-9);
            assert!((w[[1, 0]] + 1.0).abs() < 1e-9);
            assert!((w[[1, 1]] - 1.0).abs() < 1e-9);
            assert_eq!(layer.out_ids(), &[0, 1]);
        }
    }

    #[test]
    fn test_qr_rejects_singular() {
        let h = Array2::<f64>::zeros((3, 2));
        let htilde = Array2::<f64>::zeros((2, 2));
        let result = OutputLayer::solve(h.view(), htilde.view(), &[0, 1, 0], 2, 0.0, LeastSquares::Qr, 1.0);
        assert!(matches!(result, Err(RbfError::Solver(_))));
    }

    #[test]
    fn test_solve_rejects_non_finite_activations() {
        let h = array![[f64::NAN, 0.0], [0.0, 1.0]];
        let htilde = Array2::<f64>::eye(2);
        for method in [LeastSquares::Svd, LeastSquares::Qr] {
            let result = OutputLayer::solve(h.view(), htilde.view(), &[0, 1], 2, 0.0, method, 1.0);
            assert!(matches!(result, Err(RbfError::Solver(_))));
        }
    }

    #[test]
    fn test_svd_handles_rank_deficiency() {
        // Two identical columns
        let h = array![[1.0, 1.0], [0.0, 0.0]];
        let htilde = Array2::<f64>::zeros((2, 2));
        let layer = OutputLayer::solve(h.view(), htilde.view(), &[0, 1], 2, 0.0, LeastSquares::Svd, 1.0).unwrap();
        assert!(layer.weights().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_propagate_normalizes() {
        let layer = OutputLayer::new(array![[1.0, 0.0], [0.0, 1.0]], 2.0);
        let out = layer.propagate(array![1.0, 0.0].view()).unwrap();
        assert!((out.sum() - 1.0).abs() < 1e-12);
        assert!(out[0] > out[1]);
    }

    #[test]
    fn test_propagate_dimension_mismatch() {
        let layer = OutputLayer::new(array![[1.0, 0.0]], 1.0);
        assert!(layer.propagate(array![1.0].view()).is_err());
    }
}
