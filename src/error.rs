use thiserror::Error;

use crate::core::claims::ClaimError;
use crate::services::{CacheError, StoreError};

/// Faults that end a matching attempt or an API call
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Claim error: {0}")]
    Claim(#[from] ClaimError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl MatchError {
    /// Short machine-readable code exposed in API errors
    pub fn code(&self) -> &'static str {
        match self {
            MatchError::Store(_) => "store_unavailable",
            MatchError::Cache(_) => "cache_unavailable",
            MatchError::Claim(_) => "claim_failed",
            MatchError::InvalidRequest(_) => "invalid_request",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            MatchError::Store(e) => e.is_retryable(),
            MatchError::Cache(CacheError::Store(e)) => e.is_retryable(),
            MatchError::Cache(_) => false,
            MatchError::Claim(e) => e.is_retryable(),
            MatchError::InvalidRequest(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_outage_is_retryable() {
        let err = MatchError::from(ClaimError::Store(StoreError::Unavailable("down".to_string())));
        assert!(err.is_retryable());
        assert_eq!(err.code(), "claim_failed");

        let invalid = MatchError::InvalidRequest("radius".to_string());
        assert!(!invalid.is_retryable());
    }
}
