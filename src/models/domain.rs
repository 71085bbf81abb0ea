use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Presence state reported by a helper's location heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HelperStatus {
    Available,
    Busy,
    Offline,
}

impl HelperStatus {
    pub fn is_available(self) -> bool {
        matches!(self, HelperStatus::Available)
    }
}

/// Last known position of a helper, as held in the geo index
///
/// Ephemeral: the record carries a TTL and disappears if heartbeats stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelperLocationRecord {
    pub helper_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub cell_id: String,
    pub status: HelperStatus,
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    #[serde(default)]
    pub current_job_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    pub last_seen: DateTime<Utc>,
}

/// Ranking inputs cached per helper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelperProfile {
    pub helper_id: String,
    pub rating: f64,
    pub review_count: u32,
    /// Average time to respond to an offer, in seconds
    pub avg_response_secs: f64,
    pub completion_rate: f64,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl HelperProfile {
    pub const NEUTRAL_RATING: f64 = 4.0;
    pub const NEUTRAL_REVIEW_COUNT: u32 = 0;
    pub const NEUTRAL_RESPONSE_SECS: f64 = 60.0;
    pub const NEUTRAL_COMPLETION_RATE: f64 = 0.8;

    /// Stand-in used when no profile is cached or the cache is unreachable
    pub fn neutral(helper_id: impl Into<String>) -> Self {
        Self {
            helper_id: helper_id.into(),
            rating: Self::NEUTRAL_RATING,
            review_count: Self::NEUTRAL_REVIEW_COUNT,
            avg_response_secs: Self::NEUTRAL_RESPONSE_SECS,
            completion_rate: Self::NEUTRAL_COMPLETION_RATE,
            skills: Vec::new(),
        }
    }
}

/// The four ranking sub-scores and their weighted total, all in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub proximity: f64,
    pub rating: f64,
    pub response_time: f64,
    pub skill: f64,
    pub total: f64,
}

/// A helper considered for one match attempt
///
/// Built by the candidate finder with location data only; the ranker fills
/// in profile data and scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateHelper {
    pub helper_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_km: f64,
    pub eta_minutes: f64,
    pub rating: f64,
    pub review_count: u32,
    pub avg_response_secs: f64,
    pub completion_rate: f64,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub scores: ScoreBreakdown,
}

impl CandidateHelper {
    pub fn new(helper_id: impl Into<String>, latitude: f64, longitude: f64, distance_km: f64, eta_minutes: f64) -> Self {
        Self {
            helper_id: helper_id.into(),
            latitude,
            longitude,
            distance_km,
            eta_minutes,
            rating: HelperProfile::NEUTRAL_RATING,
            review_count: HelperProfile::NEUTRAL_REVIEW_COUNT,
            avg_response_secs: HelperProfile::NEUTRAL_RESPONSE_SECS,
            completion_rate: HelperProfile::NEUTRAL_COMPLETION_RATE,
            matched_skills: Vec::new(),
            missing_skills: Vec::new(),
            scores: ScoreBreakdown::default(),
        }
    }

    pub fn total_score(&self) -> f64 {
        self.scores.total
    }
}

/// Current holder of a job's claim slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    pub job_id: String,
    pub helper_id: String,
    pub claimed_at: DateTime<Utc>,
    #[serde(default)]
    pub estimated_arrival_minutes: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Scoring weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringWeights {
    pub proximity: f64,
    pub rating: f64,
    pub response_time: f64,
    pub skill_match: f64,
}

impl ScoringWeights {
    const TOLERANCE: f64 = 1e-6;

    pub fn sum(&self) -> f64 {
        self.proximity + self.rating + self.response_time + self.skill_match
    }

    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() <= Self::TOLERANCE
    }

    /// Rescale so the four weights sum to 1.0
    ///
    /// Negative weights are clamped to zero first; an all-zero set falls back
    /// to the defaults.
    pub fn normalized(&self) -> Self {
        let clamped = Self {
            proximity: self.proximity.max(0.0),
            rating: self.rating.max(0.0),
            response_time: self.response_time.max(0.0),
            skill_match: self.skill_match.max(0.0),
        };
        let sum = clamped.sum();
        if sum <= Self::TOLERANCE || !sum.is_finite() {
            return Self::default();
        }
        if clamped.is_normalized() {
            return clamped;
        }

        tracing::warn!("Scoring weights sum to {:.4}, normalizing", sum);
        Self {
            proximity: clamped.proximity / sum,
            rating: clamped.rating / sum,
            response_time: clamped.response_time / sum,
            skill_match: clamped.skill_match / sum,
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            proximity: 0.35,
            rating: 0.25,
            response_time: 0.20,
            skill_match: 0.20,
        }
    }
}
