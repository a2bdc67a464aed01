//! Radial basis function network.
//!
//! - **Hidden layer** (hidden.rs): class-blocked Gaussian prototypes and
//!   the epoch-driven LVQ trainer
//! - **Output layer** (output.rs): regularized least squares weights
//! - **Calibration** (calibration.rs): label remapping and the
//!   winner-to-label probability table
//! - **Classifier** (classifier.rs): training schedule, inference and
//!   persistence

mod calibration;
mod classifier;
mod hidden;
mod output;

pub use calibration::{calibrate, confusion_matrix, LabelMap, ProbabilityTable};
pub use classifier::{Classification, RbfClassifier};
pub use hidden::{HiddenLayer, HiddenLayerTrainer, TrainingState};
pub use output::{normal_matrix, target_matrix, LeastSquares, OutputLayer, SVD_EPS};
