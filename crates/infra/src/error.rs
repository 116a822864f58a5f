//! Errors returned by the engine's service operations.

use thiserror::Error;

use stockcut_core::DomainError;

use crate::store::StoreError;

/// Error surfaced to callers of the ledger, reservation and workflow services.
///
/// Domain errors keep their own variant so callers can build a user-facing
/// message; storage and encoding failures are server-side and carry no
/// business meaning.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("failed to encode event payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl EngineError {
    /// 4xx-equivalent: the caller can fix the request (or retry later).
    pub fn is_client_error(&self) -> bool {
        match self {
            EngineError::Domain(e) => e.is_client_error(),
            EngineError::Store(_) | EngineError::Encode(_) => false,
        }
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn business_failures_are_client_errors() {
        let err: EngineError = DomainError::insufficient_stock("component c", dec!(25), dec!(20)).into();
        assert!(err.is_client_error());

        let err: EngineError = DomainError::invalid_transition("completed", "in_process").into();
        assert!(err.is_client_error());
    }

    #[test]
    fn faults_and_storage_failures_are_server_errors() {
        let err: EngineError = DomainError::consistency("composite drift").into();
        assert!(!err.is_client_error());

        let err: EngineError = StoreError::LockPoisoned.into();
        assert!(!err.is_client_error());
        assert!(err.domain().is_none());
    }
}
