//! # rbfnet - RBF Network Classifier
//!
//! rbfnet is a radial basis function network classifier whose hidden layer
//! is placed by Learning Vector Quantization.
//!
//! ## Overview
//!
//! Every class gets a fixed block of prototypes. The prototypes are picked
//! from the training vectors (randomly or as far apart as possible), then
//! refined by up to two LVQ phases. Each prototype becomes a Gaussian unit
//! whose width follows from the distance to the nearest prototype of
//! another class. The output layer is a regularized least squares fit of
//! one sigmoid unit per class, and a confusion table gathered on the
//! training set turns output activations into label probabilities.
//!
//! ## Key Features
//!
//! - **Five LVQ rules**: LVQ1, OLVQ1, LVQ3, OLVQ3 and LVQ4
//! - **Two prototype initializations**: random and max-distance
//! - **SVD or QR** least squares for the output layer
//! - **Calibrated probabilities** per external label
//! - **JSON and binary** persistence
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rbfnet::{RbfClassifier, RbfConfig};
//!
//! let mut net = RbfClassifier::new(RbfConfig::default())?;
//! net.train(features.view(), &labels)?;
//!
//! let result = net.classify(sample.view())?;
//! println!("{:?} ({:.3})", result.winner_label(), result.winner_probability());
//!
//! net.save_json("model.json")?;
//! ```
//!
//! ## Architecture
//!
//! - [`activation`] - Identity, Gaussian and sigmoid activations
//! - [`propagation`] - Distance and dot-product layers
//! - [`lvq`] - Prototype initialization and LVQ update rules
//! - [`rbf`] - Hidden layer, output layer, calibration and the classifier
//! - [`storage`] - JSON and binary persistence
//! - [`data`] - Plain-text sample files

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod activation;
pub mod config;
pub mod data;
pub mod error;
pub mod lvq;
pub mod progress;
pub mod propagation;
pub mod rbf;
pub mod storage;

// Re-export commonly used types
pub use activation::{ActivationKind, Sigma};
pub use config::RbfConfig;
pub use data::{parse_dataset, read_dataset, Dataset, LabelColumn};
pub use error::{RbfError, Result};
pub use lvq::{LvqKind, PrototypeInit, TrainerSettings};
pub use progress::{LogProgress, NoProgress, ProgressSink};
pub use propagation::{DistanceKind, DistancePropagation, DotPropagation};
pub use rbf::{Classification, LeastSquares, RbfClassifier};
pub use storage::{ModelFormat, ModelHeader};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_config_builds_classifier() {
        let net = RbfClassifier::new(RbfConfig::default()).unwrap();
        assert!(!net.is_trained());
    }
}
