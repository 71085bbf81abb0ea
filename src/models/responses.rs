use serde::{Deserialize, Serialize};

use crate::models::ClaimRecord;

/// Terminal outcome of one matching attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Matched,
    NoHelpers,
    AllDeclined,
    Timeout,
    Cancelled,
    Error,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Matched => "matched",
            MatchStatus::NoHelpers => "no_helpers",
            MatchStatus::AllDeclined => "all_declined",
            MatchStatus::Timeout => "timeout",
            MatchStatus::Cancelled => "cancelled",
            MatchStatus::Error => "error",
        }
    }
}

/// Summary of the helper a job was awarded to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedHelper {
    pub helper_id: String,
    pub distance_km: Option<f64>,
    pub eta_minutes: Option<f64>,
    pub score: Option<f64>,
    /// False when the claimant was not among the notified candidates
    pub was_notified: bool,
}

/// Counters and timing for one attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTimings {
    pub duration_ms: u64,
    pub candidates_found: usize,
    pub candidates_ranked: usize,
    pub helpers_notified: usize,
}

/// Response for a matching attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub match_id: String,
    pub job_id: String,
    pub status: MatchStatus,
    pub message: String,
    pub matched_helper: Option<MatchedHelper>,
    pub search_radius_km: f64,
    pub timings: MatchTimings,
}

impl MatchResult {
    pub fn is_matched(&self) -> bool {
        self.status == MatchStatus::Matched
    }
}

/// Outcome reported back to a helper who tried to claim a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Claimed,
    AlreadyClaimed,
    Expired,
    InvalidJob,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub status: ClaimStatus,
    pub job_id: String,
    pub holder_id: Option<String>,
    pub claim: Option<ClaimRecord>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseResponse {
    pub job_id: String,
    pub released: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationResponse {
    pub helper_id: String,
    pub cell_id: String,
    pub available: bool,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
