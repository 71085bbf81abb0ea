use std::sync::Arc;

use crate::models::HelperProfile;
use crate::services::cache::{CacheError, CacheKey, CacheManager};

/// Read-mostly view of helper ranking profiles
///
/// Profiles are owned by the account system; this cache only mirrors the
/// fields ranking needs.
#[derive(Clone)]
pub struct ProfileCache {
    cache: Arc<CacheManager>,
}

impl ProfileCache {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }

    /// `Ok(None)` when nothing is cached for the helper
    pub async fn get(&self, helper_id: &str) -> Result<Option<HelperProfile>, CacheError> {
        self.cache.get_optional(&CacheKey::profile(helper_id)).await
    }

    pub async fn put(&self, profile: &HelperProfile) -> Result<(), CacheError> {
        self.cache.set(&CacheKey::profile(&profile.helper_id), profile).await?;
        tracing::debug!("Cached profile for helper {}", profile.helper_id);
        Ok(())
    }

    pub async fn remove(&self, helper_id: &str) -> Result<(), CacheError> {
        self.cache.delete(&CacheKey::profile(helper_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryStore;

    #[tokio::test]
    async fn test_profile_round_trip_and_miss() {
        let cache = Arc::new(CacheManager::new(Arc::new(MemoryStore::new()), 100, 60));
        let profiles = ProfileCache::new(cache);

        assert!(profiles.get("h-1").await.unwrap().is_none());

        let profile = HelperProfile {
            skills: vec!["plumbing".to_string()],
            ..HelperProfile::neutral("h-1")
        };
        profiles.put(&profile).await.unwrap();
        assert_eq!(profiles.get("h-1").await.unwrap(), Some(profile));

        profiles.remove("h-1").await.unwrap();
        assert!(profiles.get("h-1").await.unwrap().is_none());
    }
}
