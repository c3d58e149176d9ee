//! Errors raised by domain primitives.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Failure of a domain primitive: a malformed value or a broken invariant.
///
/// Ledger rule violations (insufficient funds, pool limits, ...) are not
/// expressed here; `fintrack-ledger` has its own error type for those.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// An amount carried more fractional digits than money allows.
    #[error("amount {value} has more than {max_scale} fractional digits")]
    ExcessPrecision { value: String, max_scale: u32 },

    /// Checked money arithmetic left the representable range.
    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}
