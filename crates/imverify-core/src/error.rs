//! Error types for imverify
//!
//! Only structural problems are errors. A statistic that cannot be computed
//! because the sample is too small or a denominator vanishes is reported as
//! [`BAD_DATA`](crate::BAD_DATA) in that one field instead.

use thiserror::Error;

/// Main error type for verification tasks
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerifyError {
    /// Caller-supplied inputs violate a structural invariant
    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Structural violations in the inputs to a compute call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreconditionError {
    /// Parallel sequences differ in length
    #[error("Length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    /// Category thresholds overlap or leave gaps
    #[error("Category thresholds do not partition the real line: {message}")]
    NonCoveringThresholds { message: String },

    /// Thresholds must increase strictly
    #[error("Thresholds are not strictly increasing: {message}")]
    NonMonotonicThresholds { message: String },

    /// Forecast probability outside [0, 1]
    #[error("Probability value {value} at index {index} is outside [0, 1]")]
    ProbabilityOutOfRange { index: usize, value: f64 },

    /// Threshold cannot be applied to a probability field
    #[error("Threshold '{thresh}' is incompatible with a probability field: {message}")]
    IncompatibleProbThreshold { thresh: String, message: String },

    /// Interval threshold with reversed bounds
    #[error("Invalid interval threshold: lower {lower} exceeds upper {upper}")]
    InvalidInterval { lower: f64, upper: f64 },

    /// Percentile threshold evaluated before resolution
    #[error("Percentile threshold '{thresh}' has not been resolved against a sample")]
    UnresolvedPercentile { thresh: String },

    /// Neighborhood window wider than the field can use
    #[error("Neighborhood width {width} exceeds {limit} for a {shape:?} grid")]
    WindowTooWide {
        width: usize,
        limit: usize,
        shape: (usize, usize),
    },

    /// Two gridded fields differ in shape
    #[error("Grid shape mismatch: {expected:?} vs {actual:?}")]
    GridShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

/// Errors in configuration values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Alpha values must lie in (0, 1)
    #[error("Invalid alpha value {0}: must lie in (0, 1)")]
    InvalidAlpha(f64),

    /// Value is out of valid range
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// Threshold string did not parse
    #[error("Failed to parse threshold '{input}': {message}")]
    ThresholdParse { input: String, message: String },

    /// TOML or JSON document did not parse
    #[error("Failed to parse configuration: {0}")]
    Document(String),

    /// Threshold kind not supported where it was configured
    #[error("Threshold '{thresh}' is not supported here: {message}")]
    UnsupportedThreshold { thresh: String, message: String },
}

/// Result type alias for verification operations
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Validation utilities
pub mod validation {
    use super::*;

    /// Validate that a parallel sequence has the expected length
    pub fn validate_length(what: &str, expected: usize, actual: usize) -> VerifyResult<()> {
        if expected != actual {
            return Err(PreconditionError::LengthMismatch {
                what: what.to_string(),
                expected,
                actual,
            }
            .into());
        }
        Ok(())
    }

    /// Validate a list of significance levels
    pub fn validate_alphas(alphas: &[f64]) -> VerifyResult<()> {
        for &a in alphas {
            if !(a > 0.0 && a < 1.0) {
                return Err(ConfigError::InvalidAlpha(a).into());
            }
        }
        Ok(())
    }

    /// Validate two grid shapes match
    pub fn validate_shape(expected: (usize, usize), actual: (usize, usize)) -> VerifyResult<()> {
        if expected != actual {
            return Err(PreconditionError::GridShapeMismatch { expected, actual }.into());
        }
        Ok(())
    }
}
