//! Exactly-once job award.
//!
//! The claim slot `claim:{job}` is written with a single SET NX EX, which is
//! the linearization point: whichever caller creates the key holds the job.
//! Releases go through an atomic compare-and-delete so a stale request can
//! never evict a newer holder.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

use crate::core::tuning::TuningHandle;
use crate::models::ClaimRecord;
use crate::services::{KeyValueStore, StoreError};

pub const DEFAULT_HISTORY_TTL_SECS: u64 = 86_400;

/// Set-if-absent attempts before giving up on a slot that keeps vanishing
const MAX_CLAIM_ROUNDS: usize = 3;

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("Claim store error: {0}")]
    Store(#[from] StoreError),

    #[error("Claim slot for job {0} kept changing hands")]
    Contended(String),
}

impl ClaimError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ClaimError::Store(e) => e.is_retryable(),
            ClaimError::Contended(_) => true,
        }
    }
}

/// Result of a claim attempt that reached the store
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed(ClaimRecord),
    AlreadyClaimed { holder: String },
    /// The job was closed and no longer takes claims
    Expired,
    InvalidJob,
}

fn claim_key(job_id: &str) -> String {
    format!("claim:{}", job_id)
}

fn attempts_key(job_id: &str) -> String {
    format!("claim:{}:attempts", job_id)
}

fn declined_key(job_id: &str) -> String {
    format!("claim:{}:declined", job_id)
}

fn dispatched_key(job_id: &str) -> String {
    format!("claim:{}:dispatched", job_id)
}

fn closed_key(job_id: &str) -> String {
    format!("claim:{}:closed", job_id)
}

pub struct ClaimArbitrator {
    store: Arc<dyn KeyValueStore>,
    tuning: TuningHandle,
    history_ttl_secs: u64,
}

impl ClaimArbitrator {
    pub fn new(store: Arc<dyn KeyValueStore>, tuning: TuningHandle, history_ttl_secs: u64) -> Self {
        Self {
            store,
            tuning,
            history_ttl_secs,
        }
    }

    /// Try to take the job for `helper_id`
    ///
    /// Exactly one concurrent caller per job gets `Claimed`; everyone else
    /// gets the winner's id. Store faults are returned as errors, never
    /// guessed into an outcome.
    pub async fn claim(
        &self,
        job_id: &str,
        helper_id: &str,
        estimated_arrival_minutes: Option<u32>,
        notes: Option<String>,
    ) -> Result<ClaimOutcome, ClaimError> {
        if job_id.trim().is_empty() || helper_id.trim().is_empty() {
            return Ok(ClaimOutcome::InvalidJob);
        }
        if self.store.get(&closed_key(job_id)).await?.is_some() {
            tracing::debug!("Rejected claim by {} for closed job {}", helper_id, job_id);
            return Ok(ClaimOutcome::Expired);
        }

        let record = ClaimRecord {
            job_id: job_id.to_string(),
            helper_id: helper_id.to_string(),
            claimed_at: Utc::now(),
            estimated_arrival_minutes,
            notes,
        };
        let json = serde_json::to_string(&record).map_err(StoreError::from)?;
        let lock_ttl = self.tuning.snapshot().claim_lock_ttl_secs;

        for _ in 0..MAX_CLAIM_ROUNDS {
            if self.store.set_nx_ex(&claim_key(job_id), &json, lock_ttl).await? {
                self.record_attempt(job_id, helper_id).await;
                tracing::info!(job_id = %job_id, helper_id = %helper_id, "Job claimed");
                return Ok(ClaimOutcome::Claimed(record));
            }

            // Holder may have released or expired between the two calls
            if let Some(current) = self.current_claim(job_id).await? {
                self.record_attempt(job_id, helper_id).await;
                tracing::debug!(
                    "Claim by {} for job {} lost to {}",
                    helper_id,
                    job_id,
                    current.helper_id
                );
                return Ok(ClaimOutcome::AlreadyClaimed {
                    holder: current.helper_id,
                });
            }
        }

        Err(ClaimError::Contended(job_id.to_string()))
    }

    /// Drop the claim only if `helper_id` still holds it
    pub async fn release(&self, job_id: &str, helper_id: &str) -> Result<bool, ClaimError> {
        let key = claim_key(job_id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(false);
        };

        let current: ClaimRecord = serde_json::from_str(&raw).map_err(StoreError::from)?;
        if current.helper_id != helper_id {
            tracing::debug!(
                "Ignoring release of job {} by {}, held by {}",
                job_id,
                helper_id,
                current.helper_id
            );
            return Ok(false);
        }

        let released = self.store.compare_and_delete(&key, &raw).await?;
        if released {
            tracing::info!(job_id = %job_id, helper_id = %helper_id, "Claim released");
        }
        Ok(released)
    }

    /// Idempotently record that a helper turned the job down
    pub async fn decline(&self, job_id: &str, helper_id: &str) -> Result<(), ClaimError> {
        self.add_to_history(&declined_key(job_id), &[helper_id.to_string()]).await?;
        Ok(())
    }

    pub async fn record_dispatched(&self, job_id: &str, helper_ids: &[String]) -> Result<(), ClaimError> {
        if helper_ids.is_empty() {
            return Ok(());
        }
        self.add_to_history(&dispatched_key(job_id), helper_ids).await?;
        Ok(())
    }

    /// True when nobody holds the job right now
    pub async fn is_available(&self, job_id: &str) -> Result<bool, ClaimError> {
        Ok(self.store.get(&claim_key(job_id)).await?.is_none())
    }

    pub async fn current_claim(&self, job_id: &str) -> Result<Option<ClaimRecord>, ClaimError> {
        match self.store.get(&claim_key(job_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw).map_err(StoreError::from)?)),
            None => Ok(None),
        }
    }

    pub async fn attempts(&self, job_id: &str) -> Result<Vec<String>, ClaimError> {
        self.sorted_members(&attempts_key(job_id)).await
    }

    pub async fn declined(&self, job_id: &str) -> Result<Vec<String>, ClaimError> {
        self.sorted_members(&declined_key(job_id)).await
    }

    pub async fn dispatched(&self, job_id: &str) -> Result<Vec<String>, ClaimError> {
        self.sorted_members(&dispatched_key(job_id)).await
    }

    /// Remove all per-job state once the job is terminal
    ///
    /// Leaves a closed marker for the history TTL so late claims read as
    /// expired instead of winning a fresh slot.
    pub async fn cleanup(&self, job_id: &str) -> Result<(), ClaimError> {
        let keys = vec![
            claim_key(job_id),
            attempts_key(job_id),
            declined_key(job_id),
            dispatched_key(job_id),
        ];
        let removed = self.store.delete(&keys).await?;
        self.store
            .set_ex(&closed_key(job_id), &Utc::now().to_rfc3339(), self.history_ttl_secs)
            .await?;

        tracing::info!(job_id = %job_id, removed, "Claim state cleaned up");
        Ok(())
    }

    async fn record_attempt(&self, job_id: &str, helper_id: &str) {
        // Analytics only; the claim decision already stands
        if let Err(e) = self.add_to_history(&attempts_key(job_id), &[helper_id.to_string()]).await {
            tracing::warn!("Failed to record claim attempt by {} on {}: {}", helper_id, job_id, e);
        }
    }

    async fn add_to_history(&self, key: &str, members: &[String]) -> Result<(), StoreError> {
        self.store.sadd(key, members).await?;
        self.store.expire(key, self.history_ttl_secs).await?;
        Ok(())
    }

    async fn sorted_members(&self, key: &str) -> Result<Vec<String>, ClaimError> {
        let mut members = self.store.smembers(key).await?;
        members.sort();
        Ok(members)
    }
}
