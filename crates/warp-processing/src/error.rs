//! Error types for the radial-velocity cleaning pipeline.
//!
//! This module provides the error hierarchy using `thiserror`. Errors carry a
//! stable code (see [`RvError::error_code`]) and serialize as `{code, message}`
//! so that a front end or a JSON report can tell failure classes apart.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

use crate::config::ConfigValidationError;

/// The main error type for the cleaning pipeline.
#[derive(Error, Debug)]
pub enum RvError {
    /// A per-row condition or a paired input did not match the expected length.
    #[error("Length mismatch: expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A weighted mean was requested over inputs whose weights sum to zero.
    #[error("Sum of weights is zero or undefined; cannot compute a weighted mean")]
    ZeroWeight,

    /// Parallax is not strictly positive, so no distance can be derived.
    #[error("Invalid parallax: {0} mas (must be > 0)")]
    InvalidParallax(f64),

    /// An external lookup returned nothing (identity, data rows).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Column was not found in the measurement table.
    #[error("Column '{0}' not found in measurement table")]
    ColumnNotFound(String),

    /// Per-row filtering was requested after nightly binning replaced the rows.
    #[error("Collection has been binned; per-observation filtering is no longer possible")]
    AlreadyBinned,

    /// Not enough data points to perform the requested computation.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An external collaborator (catalog, archive, model) failed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Configuration validation error wrapper.
    #[error(transparent)]
    Config(#[from] ConfigValidationError),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<RvError>,
    },
}

impl RvError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        RvError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::LengthMismatch { .. } => "LENGTH_MISMATCH",
            Self::ZeroWeight => "ZERO_WEIGHT",
            Self::InvalidParallax(_) => "INVALID_PARALLAX",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::AlreadyBinned => "ALREADY_BINNED",
            Self::InsufficientData(_) => "INSUFFICIENT_DATA",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::Config(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error means that a lookup came back empty.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

impl Serialize for RvError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("RvError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, RvError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| RvError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(RvError::ZeroWeight.error_code(), "ZERO_WEIGHT");
        assert_eq!(
            RvError::LengthMismatch {
                expected: 3,
                actual: 2
            }
            .error_code(),
            "LENGTH_MISMATCH"
        );
    }

    #[test]
    fn test_is_not_found() {
        assert!(RvError::NotFound("HD 1".to_string()).is_not_found());
        assert!(
            RvError::NotFound("HD 1".to_string())
                .with_context("resolving identity")
                .is_not_found()
        );
        assert!(!RvError::AlreadyBinned.is_not_found());
    }

    #[test]
    fn test_error_serialization() {
        let error = RvError::InvalidParallax(-1.5);
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("INVALID_PARALLAX"));
        assert!(json.contains("-1.5"));
    }

    #[test]
    fn test_with_context() {
        let error = RvError::ColumnNotFound("spectro_ccf_rv".to_string()).with_context("During load");
        assert!(error.to_string().contains("During load"));
        assert_eq!(error.error_code(), "COLUMN_NOT_FOUND");
    }
}
