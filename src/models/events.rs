use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const JOB_ASSIGNED_CHANNEL: &str = "events:job.assigned";
pub const MATCH_FAILED_CHANNEL: &str = "events:match.failed";

/// Per-helper channel that job offers are published to
pub fn offer_channel(helper_id: &str) -> String {
    format!("helper:{}:offers", helper_id)
}

/// Published once a helper has been awarded a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAssignedEvent {
    pub job_id: String,
    pub helper_id: String,
    pub requester_id: String,
    pub assigned_at: DateTime<Utc>,
    pub estimated_arrival_minutes: Option<u32>,
    pub match_score: Option<f64>,
    pub match_id: String,
    pub duration_ms: u64,
    pub candidates_considered: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    NoHelpersAvailable,
    AllHelpersDeclined,
    MatchingTimeout,
    SystemError,
    JobCancelled,
}

/// Published for every attempt that ends without an assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFailedEvent {
    pub job_id: String,
    pub requester_id: String,
    pub failure_type: FailureType,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub search_radius_km: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OfferLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Fire-and-forget offer pushed to a single helper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOfferNotification {
    pub job_id: String,
    pub helper_id: String,
    pub requester_id: String,
    pub skill: Option<String>,
    pub estimated_price: Option<f64>,
    pub location: OfferLocation,
    pub timeout_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_channel_is_per_helper() {
        assert_eq!(offer_channel("h-42"), "helper:h-42:offers");
    }

    #[test]
    fn test_failure_type_wire_format() {
        let json = serde_json::to_string(&FailureType::NoHelpersAvailable).unwrap();
        assert_eq!(json, "\"NO_HELPERS_AVAILABLE\"");
    }
}
