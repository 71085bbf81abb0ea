use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use validator::{Validate, ValidationErrors};

use crate::config::Settings;
use crate::core::scoring::ScoringParams;
use crate::models::ScoringWeights;

/// Knobs that can change at runtime without a redeploy
///
/// Components take a snapshot at the start of each operation, so an update
/// never changes an attempt midway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Tuning {
    pub weights: ScoringWeights,
    #[validate(range(min = 0.0, max = 5.0))]
    pub min_rating_threshold: f64,
    #[validate(range(min = 0.1))]
    pub max_distance_km: f64,
    #[validate(range(min = 1.0))]
    pub max_response_time_secs: f64,
    /// Upper bound on any request's wait timeout
    #[validate(range(min = 1, max = 600))]
    pub match_wait_secs: u64,
    /// Upper bound on any request's notify count
    #[validate(range(min = 1, max = 100))]
    pub max_helpers_to_notify: usize,
    #[validate(range(min = 1, max = 50))]
    pub batch_size: usize,
    #[validate(range(max = 60_000))]
    pub inter_batch_delay_ms: u64,
    #[validate(range(min = 1.0, max = 10.0))]
    pub retry_radius_multiplier: f64,
    #[validate(range(min = 1))]
    pub claim_lock_ttl_secs: u64,
}

impl Tuning {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            weights: ScoringWeights::from(&settings.scoring.weights).normalized(),
            min_rating_threshold: settings.scoring.min_rating_threshold,
            max_distance_km: settings.scoring.max_distance_km,
            max_response_time_secs: settings.scoring.max_response_time_secs,
            match_wait_secs: settings.matching.match_wait_secs,
            max_helpers_to_notify: settings.matching.max_helpers_to_notify,
            batch_size: settings.dispatch.batch_size,
            inter_batch_delay_ms: settings.dispatch.inter_batch_delay_ms,
            retry_radius_multiplier: settings.matching.retry_radius_multiplier,
            claim_lock_ttl_secs: settings.claims.lock_ttl_secs,
        }
    }

    pub fn scoring_params(&self) -> ScoringParams {
        ScoringParams {
            weights: self.weights,
            min_rating_threshold: self.min_rating_threshold,
            max_distance_km: self.max_distance_km,
            max_response_time_secs: self.max_response_time_secs,
        }
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            min_rating_threshold: 3.0,
            max_distance_km: 10.0,
            max_response_time_secs: 300.0,
            match_wait_secs: 15,
            max_helpers_to_notify: 10,
            batch_size: 3,
            inter_batch_delay_ms: 2_000,
            retry_radius_multiplier: 2.0,
            claim_lock_ttl_secs: 300,
        }
    }
}

/// Shared, replaceable tuning
#[derive(Debug, Clone, Default)]
pub struct TuningHandle {
    inner: Arc<RwLock<Tuning>>,
}

impl TuningHandle {
    pub fn new(tuning: Tuning) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Tuning {
                weights: tuning.weights.normalized(),
                ..tuning
            })),
        }
    }

    pub fn snapshot(&self) -> Tuning {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Validate and swap in new values, normalizing the weights
    pub fn replace(&self, tuning: Tuning) -> Result<Tuning, ValidationErrors> {
        tuning.validate()?;
        let tuning = Tuning {
            weights: tuning.weights.normalized(),
            ..tuning
        };

        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = tuning.clone();
        tracing::info!(
            weights = ?tuning.weights,
            batch_size = tuning.batch_size,
            max_helpers_to_notify = tuning.max_helpers_to_notify,
            "Tuning updated"
        );
        Ok(tuning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_normalizes_weights() {
        let handle = TuningHandle::default();
        let updated = handle
            .replace(Tuning {
                weights: ScoringWeights {
                    proximity: 0.4,
                    rating: 0.3,
                    response_time: 0.2,
                    skill_match: 0.2,
                },
                ..Tuning::default()
            })
            .unwrap();

        assert!(updated.weights.is_normalized());
        assert_eq!(handle.snapshot(), updated);
    }

    #[test]
    fn test_replace_rejects_invalid_values() {
        let handle = TuningHandle::default();
        let result = handle.replace(Tuning {
            batch_size: 0,
            ..Tuning::default()
        });

        assert!(result.is_err());
        assert_eq!(handle.snapshot().batch_size, 3);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_updates() {
        let handle = TuningHandle::default();
        let before = handle.snapshot();
        handle
            .replace(Tuning {
                max_helpers_to_notify: 20,
                ..Tuning::default()
            })
            .unwrap();

        assert_eq!(before.max_helpers_to_notify, 10);
        assert_eq!(handle.snapshot().max_helpers_to_notify, 20);
    }
}
