use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::core::claims::ClaimArbitrator;
use crate::core::dispatcher::Dispatcher;
use crate::core::finder::CandidateFinder;
use crate::core::geo_index::GeoIndex;
use crate::core::hexgrid::{GridError, HexGrid};
use crate::core::metrics::MatchMetrics;
use crate::core::orchestrator::MatchOrchestrator;
use crate::core::ranker::HelperRanker;
use crate::core::tuning::{Tuning, TuningHandle};
use crate::services::{CacheManager, EventPublisher, KeyValueStore, ProfileCache};

/// Every matching component wired over one store and one publisher
pub struct MatchEngine {
    pub store: Arc<dyn KeyValueStore>,
    pub cache: Arc<CacheManager>,
    pub profiles: ProfileCache,
    pub geo: Arc<GeoIndex>,
    pub claims: Arc<ClaimArbitrator>,
    pub dispatcher: Arc<Dispatcher>,
    pub orchestrator: Arc<MatchOrchestrator>,
    pub metrics: Arc<MatchMetrics>,
    pub tuning: TuningHandle,
}

impl MatchEngine {
    pub fn build(
        settings: &Settings,
        store: Arc<dyn KeyValueStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self, GridError> {
        let tuning = TuningHandle::new(Tuning::from_settings(settings));
        let metrics = Arc::new(MatchMetrics::new());

        let cache = Arc::new(CacheManager::new(
            store.clone(),
            settings.cache.l1_cache_size,
            settings.cache.ttl_secs,
        ));
        let profiles = ProfileCache::new(cache.clone());

        let grid = HexGrid::new(settings.geo.resolution)?;
        let geo = Arc::new(GeoIndex::new(
            store.clone(),
            grid,
            settings.geo.location_ttl_secs,
            settings.geo.max_ring_k,
        ));

        let claims = Arc::new(ClaimArbitrator::new(
            store.clone(),
            tuning.clone(),
            settings.claims.history_ttl_secs,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            claims.clone(),
            publisher.clone(),
            tuning.clone(),
            Duration::from_millis(settings.dispatch.poll_interval_ms.max(1)),
            settings.dispatch.offer_timeout_secs,
        ));

        let finder = CandidateFinder::new(
            geo.clone(),
            profiles.clone(),
            settings.matching.max_candidates,
            settings.matching.average_speed_kmh,
        );
        let ranker = HelperRanker::new(
            profiles.clone(),
            tuning.clone(),
            Duration::from_millis(settings.matching.scoring_timeout_ms),
            settings.matching.scoring_concurrency,
        );
        let orchestrator = Arc::new(MatchOrchestrator::new(
            finder,
            ranker,
            dispatcher.clone(),
            publisher,
            metrics.clone(),
            tuning.clone(),
        ));

        tracing::info!(
            resolution = settings.geo.resolution,
            max_ring_k = settings.geo.max_ring_k,
            "Matching engine initialized"
        );

        Ok(Self {
            store,
            cache,
            profiles,
            geo,
            claims,
            dispatcher,
            orchestrator,
            metrics,
            tuning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{MemoryStore, RecordingPublisher};

    #[test]
    fn test_build_rejects_bad_resolution() {
        let mut settings = Settings::default();
        settings.geo.resolution = 16;

        let result = MatchEngine::build(&settings, Arc::new(MemoryStore::new()), Arc::new(RecordingPublisher::new()));
        assert!(matches!(result, Err(GridError::InvalidResolution(16))));
    }

    #[test]
    fn test_build_shares_tuning() {
        let engine = MatchEngine::build(
            &Settings::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingPublisher::new()),
        )
        .unwrap();

        assert_eq!(engine.tuning.snapshot().batch_size, 3);
        assert_eq!(engine.geo.max_ring_k(), 3);
    }
}
