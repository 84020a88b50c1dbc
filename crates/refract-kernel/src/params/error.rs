//! Parameter validation errors.
//!
//! These never surface to clients: the processor reacts by substituting the
//! registered default or dropping the tuple with a warning. They exist so the
//! drop reason is precise in logs and debug output.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum ParameterError {
    /// No registry entry for this name or alias.
    #[error("unknown parameter '{0}'")]
    Unknown(String),

    /// The value's variant does not match the registry entry's kind.
    #[error("parameter '{name}' expects {expected}, got {got}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        got: &'static str,
    },

    /// Numeric value outside the registered range.
    #[error("parameter '{name}' value {value} is outside [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Enum value not in the registered `allowed_values` set.
    #[error("parameter '{name}' value '{value}' is not allowed")]
    NotAllowed { name: String, value: String },

    /// The raw string could not be coerced into the registered kind.
    #[error("parameter '{name}' could not be parsed from '{raw}': {reason}")]
    Malformed {
        name: String,
        raw: String,
        reason: String,
    },

    /// An overlay entry inside `draw` failed its structural checks.
    #[error("overlay rejected: {0}")]
    Overlay(#[from] crate::params::overlay::OverlayError),
}
