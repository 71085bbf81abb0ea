use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

use crate::core::claims::{ClaimArbitrator, ClaimError};
use crate::core::tuning::TuningHandle;
use crate::models::{offer_channel, ClaimRecord, JobOfferNotification, MatchRequest, OfferLocation};
use crate::services::{publish_json, EventPublisher};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a dispatch-and-wait ended
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    Claimed(ClaimRecord),
    /// Every notified helper declined after the last wave went out
    AllDeclined,
    /// Wait window elapsed without a claim
    Expired,
    Cancelled,
}

/// In-memory tracking for one job's dispatch, local to this process
#[derive(Debug)]
struct DispatchState {
    targets: Vec<String>,
    notified: Vec<String>,
    declined: HashSet<String>,
    deadline: Instant,
    dispatch_complete: bool,
}

impl DispatchState {
    fn all_declined(&self) -> bool {
        !self.declined.is_empty() && self.notified.iter().all(|id| self.declined.contains(id))
    }
}

/// Snapshot of a job's dispatch progress
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchProgress {
    pub targets: usize,
    pub notified: Vec<String>,
    pub declined: usize,
    pub dispatch_complete: bool,
    pub remaining: Duration,
}

/// Sends offers in waves and watches for the first claim
pub struct Dispatcher {
    claims: Arc<ClaimArbitrator>,
    publisher: Arc<dyn EventPublisher>,
    tuning: TuningHandle,
    poll_interval: Duration,
    offer_timeout_secs: u64,
    states: Mutex<HashMap<String, DispatchState>>,
}

impl Dispatcher {
    pub fn new(
        claims: Arc<ClaimArbitrator>,
        publisher: Arc<dyn EventPublisher>,
        tuning: TuningHandle,
        poll_interval: Duration,
        offer_timeout_secs: u64,
    ) -> Self {
        Self {
            claims,
            publisher,
            tuning,
            poll_interval,
            offer_timeout_secs,
            states: Mutex::new(HashMap::new()),
        }
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, DispatchState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Notify `helper_ids` in ranked order, `batch_size` at a time
    ///
    /// Stops before a wave if the job has been claimed or the dispatch was
    /// cancelled. Offers are fire-and-forget. Returns the helpers notified.
    pub async fn dispatch(
        &self,
        request: &MatchRequest,
        helper_ids: &[String],
        batch_size: usize,
        inter_batch_delay: Duration,
    ) -> Result<Vec<String>, ClaimError> {
        let job_id = request.job_id.as_str();
        let tracked = self.is_dispatching(job_id);
        let mut notified = Vec::new();

        for (index, batch) in helper_ids.chunks(batch_size.max(1)).enumerate() {
            if index > 0 {
                tokio::time::sleep(inter_batch_delay).await;
            }
            if tracked && !self.is_dispatching(job_id) {
                tracing::debug!("Dispatch for job {} cancelled before wave {}", job_id, index + 1);
                break;
            }
            if !self.claims.is_available(job_id).await? {
                tracing::debug!("Job {} already claimed, stopping dispatch", job_id);
                break;
            }

            for helper_id in batch {
                let offer = JobOfferNotification {
                    job_id: request.job_id.clone(),
                    helper_id: helper_id.clone(),
                    requester_id: request.requester_id.clone(),
                    skill: request.primary_skill().map(str::to_string),
                    estimated_price: request.estimated_price,
                    location: OfferLocation {
                        latitude: request.latitude,
                        longitude: request.longitude,
                    },
                    timeout_seconds: self.offer_timeout_secs,
                };
                publish_json(self.publisher.as_ref(), &offer_channel(helper_id), &offer).await;

                if let Some(state) = self.states().get_mut(job_id) {
                    state.notified.push(helper_id.clone());
                }
                notified.push(helper_id.clone());
            }

            // Recorded per wave so a dispatch stopped early keeps its history
            self.claims.record_dispatched(job_id, batch).await?;

            tracing::debug!(
                job_id = %job_id,
                wave = index + 1,
                sent = batch.len(),
                "Offer wave sent"
            );
        }

        if let Some(state) = self.states().get_mut(job_id) {
            state.dispatch_complete = true;
        }
        Ok(notified)
    }

    /// Dispatch offers while polling for a claim, bounded by the wait window
    ///
    /// The window is the request's wait time capped by the tuned maximum.
    /// The sender stops as soon as the poller sees a claim.
    pub async fn dispatch_and_wait(&self, request: &MatchRequest, helper_ids: &[String]) -> Result<WaitOutcome, ClaimError> {
        let tuning = self.tuning.snapshot();
        let wait = Duration::from_secs(request.max_wait_time_seconds.min(tuning.match_wait_secs));
        let job_id = request.job_id.as_str();

        self.states().insert(
            job_id.to_string(),
            DispatchState {
                targets: helper_ids.to_vec(),
                notified: Vec::new(),
                declined: HashSet::new(),
                deadline: Instant::now() + wait,
                dispatch_complete: false,
            },
        );

        let sender = self.dispatch(
            request,
            helper_ids,
            tuning.batch_size,
            Duration::from_millis(tuning.inter_batch_delay_ms),
        );
        let poller = self.wait_for_claim(job_id);

        let race = async {
            tokio::pin!(sender);
            tokio::pin!(poller);
            let mut sending = true;
            loop {
                tokio::select! {
                    sent = &mut sender, if sending => {
                        sending = false;
                        if let Err(e) = sent {
                            return Err(e);
                        }
                    }
                    outcome = &mut poller => return outcome,
                }
            }
        };

        let outcome = match tokio::time::timeout(wait, race).await {
            Ok(outcome) => outcome,
            // A claim may have landed between the last poll and the deadline
            Err(_) => self.claims.current_claim(job_id).await.map(|claim| match claim {
                Some(claim) => WaitOutcome::Claimed(claim),
                None => WaitOutcome::Expired,
            }),
        };

        // The sender may have been dropped between an offer and its wave record
        let notified = self.notified(job_id);
        if let Err(e) = self.claims.record_dispatched(job_id, &notified).await {
            tracing::warn!("Failed to record dispatched helpers for job {}: {}", job_id, e);
        }
        outcome
    }

    async fn wait_for_claim(&self, job_id: &str) -> Result<WaitOutcome, ClaimError> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Some(claim) = self.claims.current_claim(job_id).await? {
                return Ok(WaitOutcome::Claimed(claim));
            }

            let states = self.states();
            match states.get(job_id) {
                None => return Ok(WaitOutcome::Cancelled),
                Some(state) if state.dispatch_complete && state.all_declined() => {
                    return Ok(WaitOutcome::AllDeclined);
                }
                Some(_) => {}
            }
        }
    }

    /// Record a decline centrally and in local tracking
    ///
    /// Declines for jobs this process is not dispatching are still recorded
    /// with the arbitrator.
    pub async fn handle_decline(&self, job_id: &str, helper_id: &str, reason: Option<&str>) -> Result<(), ClaimError> {
        self.claims.decline(job_id, helper_id).await?;

        if let Some(state) = self.states().get_mut(job_id) {
            state.declined.insert(helper_id.to_string());
        }
        tracing::info!(
            job_id = %job_id,
            helper_id = %helper_id,
            reason = reason.unwrap_or("none"),
            "Offer declined"
        );
        Ok(())
    }

    /// True once every notified helper has declined
    pub fn all_helpers_declined(&self, job_id: &str) -> bool {
        self.states()
            .get(job_id)
            .map(DispatchState::all_declined)
            .unwrap_or(false)
    }

    pub fn notified(&self, job_id: &str) -> Vec<String> {
        self.states()
            .get(job_id)
            .map(|state| state.notified.clone())
            .unwrap_or_default()
    }

    pub fn progress(&self, job_id: &str) -> Option<DispatchProgress> {
        self.states().get(job_id).map(|state| DispatchProgress {
            targets: state.targets.len(),
            notified: state.notified.clone(),
            declined: state.declined.len(),
            dispatch_complete: state.dispatch_complete,
            remaining: state.deadline.saturating_duration_since(Instant::now()),
        })
    }

    pub fn is_dispatching(&self, job_id: &str) -> bool {
        self.states().contains_key(job_id)
    }

    /// Drop local tracking; offers already sent stay sent
    pub fn cancel_dispatch(&self, job_id: &str) -> bool {
        let removed = self.states().remove(job_id).is_some();
        if removed {
            tracing::debug!("Dispatch tracking dropped for job {}", job_id);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::claims::{ClaimOutcome, DEFAULT_HISTORY_TTL_SECS};
    use crate::core::tuning::Tuning;
    use crate::services::{MemoryStore, RecordingPublisher};

    struct Fixture {
        claims: Arc<ClaimArbitrator>,
        publisher: Arc<RecordingPublisher>,
        dispatcher: Arc<Dispatcher>,
    }

    fn fixture(batch_size: usize, inter_batch_delay_ms: u64) -> Fixture {
        let tuning = TuningHandle::new(Tuning {
            batch_size,
            inter_batch_delay_ms,
            ..Tuning::default()
        });
        let claims = Arc::new(ClaimArbitrator::new(
            Arc::new(MemoryStore::new()),
            tuning.clone(),
            DEFAULT_HISTORY_TTL_SECS,
        ));
        let publisher = Arc::new(RecordingPublisher::new());
        let dispatcher = Arc::new(Dispatcher::new(
            claims.clone(),
            publisher.clone(),
            tuning,
            Duration::from_millis(10),
            30,
        ));
        Fixture {
            claims,
            publisher,
            dispatcher,
        }
    }

    fn helpers(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("h-{}", i)).collect()
    }

    fn request(wait_secs: u64) -> MatchRequest {
        let mut request = MatchRequest::new("job-1", "req-1", 40.7128, -74.0060).with_skills(["plumbing"]);
        request.max_wait_time_seconds = wait_secs;
        request
    }

    #[tokio::test]
    async fn test_dispatch_sends_every_wave_in_order() {
        let f = fixture(2, 5);
        let notified = f
            .dispatcher
            .dispatch(&request(5), &helpers(5), 2, Duration::from_millis(5))
            .await
            .unwrap();

        assert_eq!(notified, helpers(5));
        let channels: Vec<String> = f.publisher.messages().into_iter().map(|m| m.channel).collect();
        let expected: Vec<String> = helpers(5).iter().map(|id| offer_channel(id)).collect();
        assert_eq!(channels, expected);
        assert_eq!(f.claims.dispatched("job-1").await.unwrap().len(), 5);

        let offer: JobOfferNotification = serde_json::from_str(&f.publisher.messages()[0].payload).unwrap();
        assert_eq!(offer.skill.as_deref(), Some("plumbing"));
        assert_eq!(offer.timeout_seconds, 30);
    }

    #[tokio::test]
    async fn test_dispatch_stops_once_claimed() {
        let f = fixture(2, 5);
        f.claims.claim("job-1", "h-9", None, None).await.unwrap();

        let notified = f
            .dispatcher
            .dispatch(&request(5), &helpers(4), 2, Duration::from_millis(5))
            .await
            .unwrap();

        assert!(notified.is_empty());
        assert!(f.publisher.messages().is_empty());
    }

    #[tokio::test]
    async fn test_claim_during_wait_ends_dispatch() {
        let f = fixture(1, 200);
        let claims = f.claims.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            claims.claim("job-1", "h-0", Some(4), None).await
        });

        let outcome = f.dispatcher.dispatch_and_wait(&request(5), &helpers(6)).await.unwrap();
        let WaitOutcome::Claimed(claim) = outcome else {
            panic!("expected a claim");
        };
        assert_eq!(claim.helper_id, "h-0");
        assert_eq!(claim.estimated_arrival_minutes, Some(4));
        // Later waves never went out, the first is still on record
        assert!(f.publisher.messages().len() < 6);
        assert_eq!(f.claims.dispatched("job-1").await.unwrap(), vec!["h-0"]);
    }

    #[tokio::test]
    async fn test_all_declined_exits_before_timeout() {
        let f = fixture(3, 0);
        let dispatcher = f.dispatcher.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            for id in helpers(3) {
                dispatcher.handle_decline("job-1", &id, Some("too far")).await.unwrap();
            }
        });

        let started = Instant::now();
        let outcome = f.dispatcher.dispatch_and_wait(&request(15), &helpers(3)).await.unwrap();

        assert_eq!(outcome, WaitOutcome::AllDeclined);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(f.dispatcher.all_helpers_declined("job-1"));
        assert_eq!(f.claims.declined("job-1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_wait_expires_without_claim() {
        let f = fixture(3, 0);
        let outcome = f.dispatcher.dispatch_and_wait(&request(1), &helpers(2)).await.unwrap();

        assert_eq!(outcome, WaitOutcome::Expired);
        assert_eq!(f.dispatcher.notified("job-1"), helpers(2));
        assert!(!f.dispatcher.all_helpers_declined("job-1"));
    }

    #[tokio::test]
    async fn test_cancel_stops_waiting() {
        let f = fixture(1, 100);
        let dispatcher = f.dispatcher.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            dispatcher.cancel_dispatch("job-1")
        });

        let outcome = f.dispatcher.dispatch_and_wait(&request(10), &helpers(5)).await.unwrap();
        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert!(!f.dispatcher.is_dispatching("job-1"));
        assert_eq!(f.claims.dispatched("job-1").await.unwrap(), vec!["h-0"]);
    }

    #[tokio::test]
    async fn test_late_claim_after_cancel_still_wins() {
        let f = fixture(1, 0);
        f.dispatcher.cancel_dispatch("job-1");

        let outcome = f.claims.claim("job-1", "h-3", None, None).await.unwrap();
        assert!(matches!(outcome, ClaimOutcome::Claimed(_)));
    }

    #[tokio::test]
    async fn test_partial_decline_is_not_all_declined() {
        let f = fixture(3, 0);
        f.dispatcher.handle_decline("job-1", "h-0", None).await.unwrap();
        assert!(!f.dispatcher.all_helpers_declined("job-1"));
        // Recorded centrally even without local tracking
        assert_eq!(f.claims.declined("job-1").await.unwrap(), vec!["h-0"]);
    }
}
