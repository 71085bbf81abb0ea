use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

use crate::core::distance::{estimate_eta_minutes, haversine_distance};
use crate::core::geo_index::GeoIndex;
use crate::core::hexgrid::HexGrid;
use crate::core::scoring::match_skills;
use crate::models::{CandidateHelper, MatchRequest};
use crate::services::{ProfileCache, StoreError};

pub const DEFAULT_MAX_CANDIDATES: usize = 50;

/// Candidates plus how far the search had to widen
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub candidates: Vec<CandidateHelper>,
    /// Rings visited, counting the centre cell as ring 0
    pub rings_searched: u32,
    /// Distinct helpers found in the index before record checks
    pub helpers_seen: usize,
}

impl SearchOutcome {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Progressive-radius search over the geo index
pub struct CandidateFinder {
    geo: Arc<GeoIndex>,
    profiles: ProfileCache,
    max_candidates: usize,
    average_speed_kmh: f64,
}

impl CandidateFinder {
    pub fn new(geo: Arc<GeoIndex>, profiles: ProfileCache, max_candidates: usize, average_speed_kmh: f64) -> Self {
        Self {
            geo,
            profiles,
            max_candidates,
            average_speed_kmh,
        }
    }

    /// Find available helpers around the request location
    ///
    /// Rings are walked outward from the centre cell; a helper first seen at
    /// ring k is never counted again further out. The walk stops once enough
    /// helpers are collected, the ring covers the requested radius, or the
    /// ring limit is reached.
    pub async fn find_candidates(&self, request: &MatchRequest) -> Result<SearchOutcome, StoreError> {
        let grid = self.geo.grid();
        let center = self.geo.cell_for(request.latitude, request.longitude);

        let mut seen = HashSet::new();
        let mut helper_ids = Vec::new();
        let mut rings_searched = 0;

        for k in 0..=self.geo.max_ring_k() {
            rings_searched += 1;

            let ring = HexGrid::ring(center, k);
            for members in self.geo.helpers_in_cells(&ring).await? {
                for helper_id in members {
                    if seen.insert(helper_id.clone()) {
                        helper_ids.push(helper_id);
                    }
                }
            }

            if helper_ids.len() >= self.max_candidates {
                break;
            }
            if grid.ring_radius_km(k, request.latitude) >= request.max_search_radius_km {
                break;
            }
        }

        let helpers_seen = helper_ids.len();
        let records = if helper_ids.is_empty() {
            Vec::new()
        } else {
            self.geo.locations(&helper_ids).await?
        };

        let expired: Vec<String> = helper_ids
            .iter()
            .zip(&records)
            .filter(|(_, record)| record.is_none())
            .map(|(helper_id, _)| helper_id.clone())
            .collect();
        if let Err(e) = self.geo.prune_stale(&expired).await {
            tracing::warn!("Failed to prune {} expired helpers: {}", expired.len(), e);
        }

        let mut candidates: Vec<CandidateHelper> = records
            .into_iter()
            .flatten()
            // Status may have changed since the index lookup
            .filter(|record| record.status.is_available())
            .filter_map(|record| {
                let distance_km =
                    haversine_distance(request.latitude, request.longitude, record.latitude, record.longitude);
                if distance_km > request.max_search_radius_km {
                    return None;
                }
                let eta_minutes = estimate_eta_minutes(distance_km, self.average_speed_kmh);
                Some(CandidateHelper::new(
                    record.helper_id,
                    record.latitude,
                    record.longitude,
                    distance_km,
                    eta_minutes,
                ))
            })
            .collect();
        candidates.truncate(self.max_candidates);

        tracing::debug!(
            job_id = %request.job_id,
            rings_searched,
            helpers_seen,
            candidates = candidates.len(),
            "Candidate search finished"
        );

        Ok(SearchOutcome {
            candidates,
            rings_searched,
            helpers_seen,
        })
    }

    /// Same search, keeping only helpers whose cached profile covers every
    /// required skill
    ///
    /// Helpers without a readable profile are kept; ranking scores them as
    /// unknown rather than excluding them outright.
    pub async fn find_candidates_with_skills(&self, request: &MatchRequest) -> Result<SearchOutcome, StoreError> {
        let mut outcome = self.find_candidates(request).await?;
        if request.required_skills.is_empty() || outcome.candidates.is_empty() {
            return Ok(outcome);
        }

        let profiles = join_all(
            outcome
                .candidates
                .iter()
                .map(|candidate| self.profiles.get(&candidate.helper_id)),
        )
        .await;

        let before = outcome.candidates.len();
        outcome.candidates = outcome
            .candidates
            .into_iter()
            .zip(profiles)
            .filter(|(candidate, profile)| match profile {
                Ok(Some(profile)) => match_skills(&request.required_skills, &profile.skills).missing.is_empty(),
                Ok(None) => true,
                Err(e) => {
                    tracing::warn!("Profile lookup failed for {}, keeping candidate: {}", candidate.helper_id, e);
                    true
                }
            })
            .map(|(candidate, _)| candidate)
            .collect();

        tracing::debug!(
            "Skill filter kept {} of {} candidates for job {}",
            outcome.candidates.len(),
            before,
            request.job_id
        );
        Ok(outcome)
    }
}
