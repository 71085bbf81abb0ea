use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::HelperStatus;

/// Request to match a newly created job with a helper
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    #[validate(length(min = 1))]
    pub job_id: String,
    #[validate(length(min = 1))]
    pub requester_id: String,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[serde(default = "default_max_search_radius_km")]
    #[validate(range(min = 0.1, max = 200.0))]
    pub max_search_radius_km: f64,
    #[serde(default = "default_max_helpers_to_notify")]
    #[validate(range(min = 1, max = 100))]
    pub max_helpers_to_notify: usize,
    #[serde(default = "default_max_wait_time_seconds")]
    #[validate(range(min = 1, max = 600))]
    pub max_wait_time_seconds: u64,
    #[serde(default = "default_priority")]
    #[validate(range(min = 1, max = 5))]
    pub priority: u8,
    /// Shown to helpers in the job offer
    #[serde(default)]
    pub estimated_price: Option<f64>,
}

impl MatchRequest {
    pub fn new(job_id: impl Into<String>, requester_id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            job_id: job_id.into(),
            requester_id: requester_id.into(),
            required_skills: Vec::new(),
            latitude,
            longitude,
            max_search_radius_km: default_max_search_radius_km(),
            max_helpers_to_notify: default_max_helpers_to_notify(),
            max_wait_time_seconds: default_max_wait_time_seconds(),
            priority: default_priority(),
            estimated_price: None,
        }
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_skills = skills.into_iter().map(Into::into).collect();
        self
    }

    /// Skill shown on the offer: the first required one, if any
    pub fn primary_skill(&self) -> Option<&str> {
        self.required_skills.first().map(String::as_str)
    }
}

fn default_max_search_radius_km() -> f64 { 10.0 }
fn default_max_helpers_to_notify() -> usize { 5 }
fn default_max_wait_time_seconds() -> u64 { 15 }
fn default_priority() -> u8 { 3 }

/// Widening retry of an earlier match request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RetryMatchRequest {
    #[validate(nested)]
    pub request: MatchRequest,
    /// Defaults to the current radius times the configured retry multiplier
    #[serde(default)]
    pub expanded_radius_km: Option<f64>,
}

/// Location heartbeat, also used for explicit online/offline registration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdateRequest {
    #[validate(length(min = 1))]
    pub helper_id: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    pub status: HelperStatus,
    #[serde(default)]
    pub current_job_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A helper's attempt to take a job
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ClaimJobRequest {
    pub helper_id: String,
    #[serde(default)]
    #[validate(range(max = 600))]
    pub estimated_arrival_minutes: Option<u32>,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseJobRequest {
    #[validate(length(min = 1))]
    pub helper_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeclineJobRequest {
    #[validate(length(min = 1))]
    pub helper_id: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Profile fields a collaborator can push into the ranking cache
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdateRequest {
    #[validate(range(min = 0.0, max = 5.0))]
    pub rating: f64,
    pub review_count: u32,
    #[validate(range(min = 0.0))]
    pub avg_response_secs: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub completion_rate: f64,
    #[serde(default)]
    pub skills: Vec<String>,
}
