//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, availability, workflow rules). Infrastructure concerns belong elsewhere.
/// Variants carry enough context for a caller to build a user-facing message
/// without re-querying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input, non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A cutting order with the same number already exists.
    #[error("cutting order number already exists: {0}")]
    DuplicateOrderNumber(String),

    /// Availability would go negative.
    #[error("insufficient stock for {target}: requested {requested}, available {available}")]
    InsufficientStock {
        target: String,
        requested: Decimal,
        available: Decimal,
    },

    /// Workflow rule violation.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// A derived value diverged from its source of truth (operator attention required).
    #[error("consistency fault: {0}")]
    ConsistencyFault(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn insufficient_stock(target: impl ToString, requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientStock {
            target: target.to_string(),
            requested,
            available,
        }
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::ConsistencyFault(msg.into())
    }

    /// Whether the caller can act on this error (4xx-equivalent).
    ///
    /// Consistency faults are internal and must reach operators instead.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::ConsistencyFault(_) | Self::InvariantViolation(_))
    }
}
