//! Helper Match - real-time matching engine for an on-demand services marketplace
//!
//! Finds nearby available helpers for a job through a hex-grid index, ranks
//! them on four weighted factors, offers the job in waves and awards it to
//! exactly one claimant.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{ClaimArbitrator, ClaimOutcome, Dispatcher, GeoIndex, HelperRanker, MatchEngine, MatchOrchestrator};
pub use error::MatchError;
pub use models::{CandidateHelper, MatchRequest, MatchResult, MatchStatus, ScoringWeights};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let request = MatchRequest::new("job-1", "req-1", 40.7128, -74.0060);
        assert_eq!(request.max_helpers_to_notify, 5);
        assert!(ScoringWeights::default().is_normalized());
    }
}
