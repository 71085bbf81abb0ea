// Model exports
pub mod domain;
pub mod events;
pub mod requests;
pub mod responses;

pub use domain::{CandidateHelper, ClaimRecord, HelperLocationRecord, HelperProfile, HelperStatus, ScoreBreakdown, ScoringWeights};
pub use events::{
    offer_channel, FailureType, JobAssignedEvent, JobOfferNotification, MatchFailedEvent, OfferLocation,
    JOB_ASSIGNED_CHANNEL, MATCH_FAILED_CHANNEL,
};
pub use requests::{ClaimJobRequest, DeclineJobRequest, LocationUpdateRequest, MatchRequest, ProfileUpdateRequest, ReleaseJobRequest, RetryMatchRequest};
pub use responses::{ClaimResponse, ClaimStatus, ErrorResponse, HealthResponse, LocationResponse, MatchResult, MatchStatus, MatchTimings, MatchedHelper, ReleaseResponse};
