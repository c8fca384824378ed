//! Error types for the datasets core library.

#[cfg(feature = "python")]
use pyo3::exceptions::{PyIOError, PyValueError};
#[cfg(feature = "python")]
use pyo3::PyErr;

/// Top-level error enum for the datasets core library.
#[derive(Debug, thiserror::Error)]
pub enum DatasetsError {
    /// Malformed `Hash` / `Product` text.
    #[error("Format error: {0}")]
    Format(String),

    /// Invalid constructor arguments.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Structural analysis error: {0}")]
    Structural(#[from] StructuralError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reasons a script does not follow the dataset registration convention.
///
/// Every variant is fatal for the analysis run that produced it and carries
/// the counts observed so the script author can locate the problem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    #[error("no assignment statements found in the top-level block")]
    NoAssignmentsFound,

    #[error("no dataset registrations found among {assignments} assignment(s)")]
    NoRegistrationsFound { assignments: usize },

    #[error("no dataset saves found for {registrations} registration(s)")]
    NoSavesFound { registrations: usize },

    #[error(
        "number of dataset saves ({saves}) does not match number of registrations ({registrations})"
    )]
    CardinalityMismatch { registrations: usize, saves: usize },

    #[error("symbol '{symbol}' is registered twice (statements {first} and {second})")]
    DuplicateRegistration {
        symbol: String,
        first: usize,
        second: usize,
    },

    #[error("symbol '{symbol}' is saved {saves} times, expected exactly once")]
    DuplicateSave { symbol: String, saves: usize },
}

#[cfg(feature = "python")]
impl From<DatasetsError> for PyErr {
    fn from(err: DatasetsError) -> PyErr {
        match &err {
            DatasetsError::Io(_) => PyIOError::new_err(err.to_string()),
            DatasetsError::Format(_)
            | DatasetsError::Validation(_)
            | DatasetsError::Structural(_)
            | DatasetsError::Parse(_)
            | DatasetsError::Json(_) => PyValueError::new_err(err.to_string()),
        }
    }
}

pub type DatasetsResult<T> = Result<T, DatasetsError>;
