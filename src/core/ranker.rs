use futures::stream::{self, StreamExt};
use std::cmp::Ordering;
use std::time::Duration;

use crate::core::scoring::{score_candidate, ScoringParams};
use crate::core::tuning::TuningHandle;
use crate::models::{CandidateHelper, HelperProfile, MatchRequest};
use crate::services::ProfileCache;

pub const DEFAULT_SCORING_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_SCORING_CONCURRENCY: usize = 16;

/// Scores candidates in parallel and orders them best first
pub struct HelperRanker {
    profiles: ProfileCache,
    tuning: TuningHandle,
    scoring_timeout: Duration,
    concurrency: usize,
}

impl HelperRanker {
    pub fn new(profiles: ProfileCache, tuning: TuningHandle, scoring_timeout: Duration, concurrency: usize) -> Self {
        Self {
            profiles,
            tuning,
            scoring_timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Score every candidate and sort descending by total
    ///
    /// At most `concurrency` candidates are scored at once. A candidate whose
    /// scoring exceeds the timeout is dropped; an unreachable profile falls
    /// back to neutral values. Equal totals keep their collection order, and
    /// non-positive totals are excluded.
    pub async fn rank_candidates(&self, candidates: Vec<CandidateHelper>, request: &MatchRequest) -> Vec<CandidateHelper> {
        let params = self.tuning.snapshot().scoring_params();
        let params = &params;
        let timeout = self.scoring_timeout;
        let total = candidates.len();

        // `buffered` yields in input order, which keeps ties stable
        let scored: Vec<Option<CandidateHelper>> = stream::iter(candidates)
            .map(|candidate| async move {
                let helper_id = candidate.helper_id.clone();
                match tokio::time::timeout(timeout, self.score_one(candidate, request, params)).await {
                    Ok(scored) => Some(scored),
                    Err(_) => {
                        tracing::warn!("Scoring timed out for helper {}, dropping", helper_id);
                        None
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut ranked: Vec<CandidateHelper> = scored
            .into_iter()
            .flatten()
            .filter(|candidate| candidate.total_score() > 0.0)
            .collect();

        ranked.sort_by(|a, b| {
            b.total_score()
                .partial_cmp(&a.total_score())
                .unwrap_or(Ordering::Equal)
        });

        tracing::debug!(
            job_id = %request.job_id,
            "Ranked {} of {} candidates",
            ranked.len(),
            total
        );
        ranked
    }

    async fn score_one(&self, mut candidate: CandidateHelper, request: &MatchRequest, params: &ScoringParams) -> CandidateHelper {
        let profile = match self.profiles.get(&candidate.helper_id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!("Profile unavailable for {}, using neutral defaults: {}", candidate.helper_id, e);
                None
            }
        };

        let (scores, skills) = score_candidate(&candidate, profile.as_ref(), request, params);
        let effective = profile.unwrap_or_else(|| HelperProfile::neutral(candidate.helper_id.as_str()));

        candidate.rating = effective.rating;
        candidate.review_count = effective.review_count;
        candidate.avg_response_secs = effective.avg_response_secs;
        candidate.completion_rate = effective.completion_rate;
        candidate.matched_skills = skills.matched;
        candidate.missing_skills = skills.missing;
        candidate.scores = scores;
        candidate
    }

    pub fn top_n(ranked: &[CandidateHelper], n: usize) -> Vec<CandidateHelper> {
        ranked.iter().take(n).cloned().collect()
    }

    pub fn filter_min_score(ranked: &[CandidateHelper], min_score: f64) -> Vec<CandidateHelper> {
        ranked
            .iter()
            .filter(|candidate| candidate.total_score() >= min_score)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tuning::Tuning;
    use crate::models::ScoringWeights;
    use crate::services::{CacheManager, KeyValueStore, MemoryStore, StoreError};
    use async_trait::async_trait;
    use std::sync::Arc;

    const LAT: f64 = 40.7128;
    const LNG: f64 = -74.0060;

    /// Memory store whose reads of one key stall
    struct StallingStore {
        inner: MemoryStore,
        stalled_key: String,
    }

    #[async_trait]
    impl KeyValueStore for StallingStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            if key == self.stalled_key {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            self.inner.get(key).await
        }
        async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
            self.inner.mget(keys).await
        }
        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.inner.set(key, value).await
        }
        async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
            self.inner.set_ex(key, value, ttl_secs).await
        }
        async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError> {
            self.inner.set_nx_ex(key, value, ttl_secs).await
        }
        async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
            self.inner.compare_and_delete(key, expected).await
        }
        async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
            self.inner.delete(keys).await
        }
        async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
            self.inner.expire(key, ttl_secs).await
        }
        async fn sadd(&self, key: &str, members: &[String]) -> Result<u64, StoreError> {
            self.inner.sadd(key, members).await
        }
        async fn srem(&self, key: &str, members: &[String]) -> Result<u64, StoreError> {
            self.inner.srem(key, members).await
        }
        async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
            self.inner.smembers(key).await
        }
        async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
            self.inner.sismember(key, member).await
        }
        async fn scard(&self, key: &str) -> Result<u64, StoreError> {
            self.inner.scard(key).await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            self.inner.ping().await
        }
    }

    fn ranker_over(store: Arc<dyn KeyValueStore>) -> (ProfileCache, HelperRanker) {
        let profiles = ProfileCache::new(Arc::new(CacheManager::new(store, 100, 60)));
        let ranker = HelperRanker::new(
            profiles.clone(),
            TuningHandle::default(),
            DEFAULT_SCORING_TIMEOUT,
            DEFAULT_SCORING_CONCURRENCY,
        );
        (profiles, ranker)
    }

    fn candidate(id: &str, distance_km: f64) -> CandidateHelper {
        CandidateHelper::new(id, LAT, LNG, distance_km, distance_km * 3.0)
    }

    fn profile(id: &str, rating: f64, reviews: u32, response_secs: f64, skills: &[&str]) -> HelperProfile {
        HelperProfile {
            helper_id: id.to_string(),
            rating,
            review_count: reviews,
            avg_response_secs: response_secs,
            completion_rate: 0.95,
            skills: skills.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_strong_candidate_ranks_first() {
        let (profiles, ranker) = ranker_over(Arc::new(MemoryStore::new()));
        profiles.put(&profile("star", 4.8, 120, 8.0, &["plumbing"])).await.unwrap();
        profiles.put(&profile("far", 4.9, 200, 20.0, &["plumbing"])).await.unwrap();
        profiles.put(&profile("slow", 4.5, 40, 250.0, &["plumbing"])).await.unwrap();

        let request = MatchRequest::new("job-1", "req-1", LAT, LNG).with_skills(["plumbing"]);
        let ranked = ranker
            .rank_candidates(
                vec![candidate("far", 6.0), candidate("slow", 1.5), candidate("newbie", 2.0), candidate("star", 0.5)],
                &request,
            )
            .await;

        assert_eq!(ranked[0].helper_id, "star");
        assert!(ranked[0].total_score() > 0.9);
        assert_eq!(ranked[0].matched_skills, vec!["plumbing".to_string()]);
        assert_eq!(ranked[0].review_count, 120);
    }

    #[tokio::test]
    async fn test_ranking_is_deterministic() {
        let (profiles, ranker) = ranker_over(Arc::new(MemoryStore::new()));
        profiles.put(&profile("a", 4.2, 30, 30.0, &[])).await.unwrap();

        let request = MatchRequest::new("job-1", "req-1", LAT, LNG);
        let pool = || vec![candidate("a", 1.0), candidate("b", 1.0), candidate("c", 1.0), candidate("d", 3.0)];

        let first: Vec<String> = ranker.rank_candidates(pool(), &request).await.into_iter().map(|c| c.helper_id).collect();
        for _ in 0..5 {
            let again: Vec<String> = ranker.rank_candidates(pool(), &request).await.into_iter().map(|c| c.helper_id).collect();
            assert_eq!(first, again);
        }
        // b and c have identical neutral scores and keep collection order
        let b = first.iter().position(|id| id == "b").unwrap();
        let c = first.iter().position(|id| id == "c").unwrap();
        assert!(b < c);
    }

    #[tokio::test]
    async fn test_zero_score_candidates_are_excluded() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let profiles = ProfileCache::new(Arc::new(CacheManager::new(store, 100, 60)));
        let tuning = TuningHandle::new(Tuning {
            weights: ScoringWeights {
                proximity: 1.0,
                rating: 0.0,
                response_time: 0.0,
                skill_match: 0.0,
            },
            ..Tuning::default()
        });
        let ranker = HelperRanker::new(profiles, tuning, DEFAULT_SCORING_TIMEOUT, DEFAULT_SCORING_CONCURRENCY);

        let request = MatchRequest::new("job-1", "req-1", LAT, LNG);
        let ranked = ranker
            .rank_candidates(vec![candidate("beyond", 12.0), candidate("inside", 2.0)], &request)
            .await;

        let ids: Vec<&str> = ranked.iter().map(|c| c.helper_id.as_str()).collect();
        assert_eq!(ids, vec!["inside"]);
    }

    #[tokio::test]
    async fn test_slow_candidate_is_dropped() {
        let store = Arc::new(StallingStore {
            inner: MemoryStore::new(),
            stalled_key: "profile:slow".to_string(),
        });
        let (_, ranker) = ranker_over(store);

        let request = MatchRequest::new("job-1", "req-1", LAT, LNG);
        let ranked = ranker
            .rank_candidates(vec![candidate("slow", 0.5), candidate("quick", 1.0)], &request)
            .await;

        let ids: Vec<&str> = ranked.iter().map(|c| c.helper_id.as_str()).collect();
        assert_eq!(ids, vec!["quick"]);
    }

    #[tokio::test]
    async fn test_unreachable_profiles_fall_back_to_neutral() {
        let store = Arc::new(MemoryStore::new());
        let (_, ranker) = ranker_over(store.clone());
        store.set_unavailable(true);

        let request = MatchRequest::new("job-1", "req-1", LAT, LNG);
        let ranked = ranker.rank_candidates(vec![candidate("h-1", 1.0)], &request).await;

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].rating, HelperProfile::NEUTRAL_RATING);
        assert_eq!(ranked[0].avg_response_secs, HelperProfile::NEUTRAL_RESPONSE_SECS);
    }

    #[test]
    fn test_top_n_and_min_score() {
        let mut pool = vec![candidate("a", 1.0), candidate("b", 1.0), candidate("c", 1.0)];
        for (candidate, total) in pool.iter_mut().zip([0.9, 0.6, 0.3]) {
            candidate.scores.total = total;
        }

        let top: Vec<String> = HelperRanker::top_n(&pool, 2).into_iter().map(|c| c.helper_id).collect();
        assert_eq!(top, vec!["a", "b"]);
        assert_eq!(HelperRanker::top_n(&pool, 10).len(), 3);
        assert_eq!(HelperRanker::filter_min_score(&pool, 0.5).len(), 2);
    }
}
