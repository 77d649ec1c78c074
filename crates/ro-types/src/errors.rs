use thiserror::Error;

/// Main error type for reoptimize runs.
///
/// Only configuration and wiring problems surface as `Err`. Failures that
/// happen while a run is in flight (penalised evaluations, unstable steps,
/// stagnation) are reported through the run status instead so the best
/// solution and history are never lost.
#[derive(Error, Debug)]
pub enum OptError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Batch-level failures raised by an evaluation backend.
///
/// A single candidate failing is not a `BackendError`; it is reported as a
/// failed [`crate::EvaluationOutcome`] and penalised.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("batch submission failed: {message}")]
    SubmissionFailed { message: String },

    #[error("backend returned {returned} outcomes for a batch of {expected}")]
    BatchSizeMismatch { expected: usize, returned: usize },

    #[error("backend internal error: {message}")]
    Internal { message: String },
}

/// Failures while turning a raw outcome into a scalar.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("evaluation reported failure: {message}")]
    EvaluationFailed { message: String },

    #[error("no value present in outcome")]
    MissingValue,

    #[error("field not found at {pointer}")]
    FieldNotFound { pointer: String },

    #[error("field at {pointer} is not a number")]
    NotANumber { pointer: String },

    #[error("extracted value is not finite: {value}")]
    NonFinite { value: f64 },

    #[error("extractor error: {message}")]
    Custom { message: String },
}

/// Result type alias for reoptimize operations
pub type OptResult<T> = Result<T, OptError>;

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::OptError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::OptError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::OptError::Config(format!($($arg)*))
    };
}
