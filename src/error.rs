//! Error types for the RBF network classifier.

use thiserror::Error;

/// The main error type for RBF network operations.
#[derive(Error, Debug)]
pub enum RbfError {
    /// Invalid configuration or hyperparameter combination.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Empty input.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Vector or matrix dimensions do not agree.
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// The dimension that was expected.
        expected: usize,
        /// The dimension that was supplied.
        found: usize,
    },

    /// Training error.
    #[error("Training error: {0}")]
    Training(String),

    /// Some output classes never won on the training set.
    ///
    /// The network is trained and usable when this is returned, but the
    /// calibrated probability rows of the listed labels are empty.
    #[error("Very bad training! Classes never activated: {0:?}")]
    InactiveClasses(Vec<i32>),

    /// The least squares solver failed.
    #[error("Solver error: {0}")]
    Solver(String),

    /// The classifier has not been trained yet.
    #[error("Classifier has not been trained")]
    NotTrained,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid model file.
    #[error("Invalid model format: {0}")]
    InvalidModelFormat(String),

    /// Malformed data file.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type alias for RBF network operations.
pub type Result<T> = std::result::Result<T, RbfError>;

impl From<bincode::Error> for RbfError {
    fn from(err: bincode::Error) -> Self {
        RbfError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for RbfError {
    fn from(err: serde_json::Error) -> Self {
        RbfError::Serialization(err.to_string())
    }
}
