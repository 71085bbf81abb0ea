use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use uuid::Uuid;

use crate::core::dispatcher::{Dispatcher, WaitOutcome};
use crate::core::finder::CandidateFinder;
use crate::core::metrics::MatchMetrics;
use crate::core::ranker::HelperRanker;
use crate::core::tuning::TuningHandle;
use crate::error::MatchError;
use crate::models::{
    ClaimRecord, FailureType, JobAssignedEvent, MatchFailedEvent, MatchRequest, MatchResult, MatchStatus,
    MatchTimings, MatchedHelper, JOB_ASSIGNED_CHANNEL, MATCH_FAILED_CHANNEL,
};
use crate::services::{publish_json, EventPublisher};

/// Message returned for infrastructure faults; details go to the log only
const INTERNAL_ERROR_MESSAGE: &str = "Matching failed due to an internal error";

/// Terminal classification of one attempt before timing is attached
struct Attempt {
    status: MatchStatus,
    message: String,
    matched_helper: Option<MatchedHelper>,
    claim: Option<ClaimRecord>,
}

impl Attempt {
    fn failed(status: MatchStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            matched_helper: None,
            claim: None,
        }
    }
}

/// Marks a job as having a running attempt until dropped
///
/// Dropping also clears the job's dispatch tracking, so an attempt whose
/// future is abandoned mid-wait does not leave state behind.
struct InFlight<'a> {
    jobs: &'a Mutex<HashSet<String>>,
    dispatcher: &'a Dispatcher,
    job_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.dispatcher.cancel_dispatch(&self.job_id);
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.job_id);
    }
}

/// Single entry point for matching a job to a helper
///
/// # Pipeline
/// 1. Progressive-radius candidate search
/// 2. Parallel scoring and ranking
/// 3. Top-N selection
/// 4. Wave dispatch raced against the first claim
/// 5. Outcome classification, one event, metrics
///
/// At most one attempt per job runs at a time in this process; a second
/// one is turned away without touching the first.
pub struct MatchOrchestrator {
    finder: CandidateFinder,
    ranker: HelperRanker,
    dispatcher: Arc<Dispatcher>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<MatchMetrics>,
    tuning: TuningHandle,
    in_flight: Mutex<HashSet<String>>,
}

impl MatchOrchestrator {
    pub fn new(
        finder: CandidateFinder,
        ranker: HelperRanker,
        dispatcher: Arc<Dispatcher>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<MatchMetrics>,
        tuning: TuningHandle,
    ) -> Self {
        Self {
            finder,
            ranker,
            dispatcher,
            publisher,
            metrics,
            tuning,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Run one matching attempt to a terminal outcome
    ///
    /// Never fails: infrastructure faults come back as `MatchStatus::Error`.
    pub async fn match_task(&self, request: &MatchRequest) -> MatchResult {
        let notify_cap = self.tuning.snapshot().max_helpers_to_notify;
        self.execute(request, notify_cap).await
    }

    /// Re-run the pipeline over a wider radius with a doubled notify count
    ///
    /// Without an explicit radius the current one is scaled by the tuned
    /// retry multiplier. The radius never shrinks.
    pub async fn retry_match(&self, request: &MatchRequest, expanded_radius_km: Option<f64>) -> MatchResult {
        let tuning = self.tuning.snapshot();
        let radius = expanded_radius_km
            .unwrap_or(request.max_search_radius_km * tuning.retry_radius_multiplier)
            .max(request.max_search_radius_km);

        let mut widened = request.clone();
        widened.max_search_radius_km = radius;
        widened.max_helpers_to_notify = request.max_helpers_to_notify.saturating_mul(2);

        tracing::info!(
            job_id = %request.job_id,
            from_km = request.max_search_radius_km,
            to_km = radius,
            "Retrying match with a wider radius"
        );
        self.execute(&widened, tuning.max_helpers_to_notify.saturating_mul(2)).await
    }

    /// Stop waiting on a job's in-flight attempt, which then ends CANCELLED
    pub fn cancel_match(&self, job_id: &str) -> bool {
        let cancelled = self.dispatcher.cancel_dispatch(job_id);
        if cancelled {
            tracing::info!(job_id = %job_id, "Match cancelled");
        }
        cancelled
    }

    pub fn metrics(&self) -> &MatchMetrics {
        &self.metrics
    }

    /// Whether an attempt for the job is currently running
    pub fn is_matching(&self, job_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(job_id)
    }

    fn begin(&self, job_id: &str) -> Option<InFlight<'_>> {
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id.to_string());
        inserted.then(|| InFlight {
            jobs: &self.in_flight,
            dispatcher: self.dispatcher.as_ref(),
            job_id: job_id.to_string(),
        })
    }

    async fn execute(&self, request: &MatchRequest, notify_cap: usize) -> MatchResult {
        let started = Instant::now();
        let match_id = Uuid::new_v4().to_string();
        let mut timings = MatchTimings::default();

        // The running attempt publishes the job's outcome; this one only reports back
        let Some(_in_flight) = self.begin(&request.job_id) else {
            tracing::warn!(
                job_id = %request.job_id,
                match_id = %match_id,
                "Match attempt rejected, another is already running"
            );
            return MatchResult {
                match_id,
                job_id: request.job_id.clone(),
                status: MatchStatus::Error,
                message: format!("A match attempt is already in progress for job {}", request.job_id),
                matched_helper: None,
                search_radius_km: request.max_search_radius_km,
                timings,
            };
        };

        let attempt = match self.run(request, notify_cap, &mut timings).await {
            Ok(attempt) => attempt,
            Err(e) => {
                tracing::error!(
                    job_id = %request.job_id,
                    match_id = %match_id,
                    retryable = e.is_retryable(),
                    "Matching failed: {}",
                    e
                );
                Attempt::failed(MatchStatus::Error, INTERNAL_ERROR_MESSAGE)
            }
        };

        self.dispatcher.cancel_dispatch(&request.job_id);
        timings.duration_ms = started.elapsed().as_millis() as u64;

        let result = MatchResult {
            match_id,
            job_id: request.job_id.clone(),
            status: attempt.status,
            message: attempt.message,
            matched_helper: attempt.matched_helper,
            search_radius_km: request.max_search_radius_km,
            timings,
        };

        self.publish_outcome(request, &result, attempt.claim.as_ref()).await;
        self.metrics.record(&result);

        tracing::info!(
            job_id = %result.job_id,
            match_id = %result.match_id,
            status = result.status.as_str(),
            duration_ms = result.timings.duration_ms,
            candidates = result.timings.candidates_found,
            notified = result.timings.helpers_notified,
            "Match attempt finished"
        );
        result
    }

    async fn run(&self, request: &MatchRequest, notify_cap: usize, timings: &mut MatchTimings) -> Result<Attempt, MatchError> {
        let search = self.finder.find_candidates(request).await?;
        timings.candidates_found = search.candidates.len();
        if search.is_empty() {
            return Ok(Attempt::failed(
                MatchStatus::NoHelpers,
                format!("No helpers available within {} km", request.max_search_radius_km),
            ));
        }

        let ranked = self.ranker.rank_candidates(search.candidates, request).await;
        timings.candidates_ranked = ranked.len();
        if ranked.is_empty() {
            return Ok(Attempt::failed(MatchStatus::NoHelpers, "No suitable helpers after ranking"));
        }

        let top = HelperRanker::top_n(&ranked, request.max_helpers_to_notify.min(notify_cap));
        let helper_ids: Vec<String> = top.iter().map(|c| c.helper_id.clone()).collect();

        let waited = self.dispatcher.dispatch_and_wait(request, &helper_ids).await;
        timings.helpers_notified = self.dispatcher.notified(&request.job_id).len();
        let all_declined = self.dispatcher.all_helpers_declined(&request.job_id);

        let attempt = match waited? {
            WaitOutcome::Claimed(claim) => {
                let matched_helper = match top.iter().find(|c| c.helper_id == claim.helper_id) {
                    Some(candidate) => MatchedHelper {
                        helper_id: candidate.helper_id.clone(),
                        distance_km: Some(candidate.distance_km),
                        eta_minutes: Some(candidate.eta_minutes),
                        score: Some(candidate.total_score()),
                        was_notified: true,
                    },
                    None => {
                        tracing::warn!(
                            "Job {} claimed by {} who was not among the notified candidates",
                            request.job_id,
                            claim.helper_id
                        );
                        MatchedHelper {
                            helper_id: claim.helper_id.clone(),
                            distance_km: None,
                            eta_minutes: None,
                            score: None,
                            was_notified: false,
                        }
                    }
                };
                Attempt {
                    status: MatchStatus::Matched,
                    message: format!("Job assigned to helper {}", claim.helper_id),
                    matched_helper: Some(matched_helper),
                    claim: Some(claim),
                }
            }
            WaitOutcome::AllDeclined => Attempt::failed(MatchStatus::AllDeclined, "All notified helpers declined"),
            WaitOutcome::Expired if all_declined => {
                Attempt::failed(MatchStatus::AllDeclined, "All notified helpers declined")
            }
            WaitOutcome::Expired => Attempt::failed(
                MatchStatus::Timeout,
                format!("No helper accepted within {} seconds", request.max_wait_time_seconds),
            ),
            WaitOutcome::Cancelled => Attempt::failed(MatchStatus::Cancelled, "Matching was cancelled"),
        };
        Ok(attempt)
    }

    /// Publish exactly one event for a terminal outcome
    async fn publish_outcome(&self, request: &MatchRequest, result: &MatchResult, claim: Option<&ClaimRecord>) {
        if let (MatchStatus::Matched, Some(claim)) = (result.status, claim) {
            let matched = result.matched_helper.as_ref();
            let computed_eta = matched
                .and_then(|m| m.eta_minutes)
                .map(|eta| eta.ceil() as u32);

            let event = JobAssignedEvent {
                job_id: request.job_id.clone(),
                helper_id: claim.helper_id.clone(),
                requester_id: request.requester_id.clone(),
                assigned_at: claim.claimed_at,
                estimated_arrival_minutes: claim.estimated_arrival_minutes.or(computed_eta),
                match_score: matched.and_then(|m| m.score),
                match_id: result.match_id.clone(),
                duration_ms: result.timings.duration_ms,
                candidates_considered: result.timings.candidates_found,
            };
            publish_json(self.publisher.as_ref(), JOB_ASSIGNED_CHANNEL, &event).await;
            return;
        }

        let failure_type = match result.status {
            MatchStatus::NoHelpers => FailureType::NoHelpersAvailable,
            MatchStatus::AllDeclined => FailureType::AllHelpersDeclined,
            MatchStatus::Timeout => FailureType::MatchingTimeout,
            MatchStatus::Cancelled => FailureType::JobCancelled,
            MatchStatus::Error | MatchStatus::Matched => FailureType::SystemError,
        };
        let event = MatchFailedEvent {
            job_id: request.job_id.clone(),
            requester_id: request.requester_id.clone(),
            failure_type,
            reason: result.message.clone(),
            failed_at: Utc::now(),
            duration_ms: result.timings.duration_ms,
            search_radius_km: request.max_search_radius_km,
        };
        publish_json(self.publisher.as_ref(), MATCH_FAILED_CHANNEL, &event).await;
    }
}
