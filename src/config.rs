use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::models::ScoringWeights;

/// Application configuration
///
/// `Default` describes a single-process deployment on the in-memory store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub geo: GeoSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub claims: ClaimSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: Some(4),
        }
    }
}

/// Which key-value backend holds the geo index, claim lock and profile cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub redis_url: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_l1_cache_size")]
    pub l1_cache_size: u64,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            l1_cache_size: default_l1_cache_size(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_l1_cache_size() -> u64 { 10_000 }
fn default_cache_ttl() -> u64 { 900 }

#[derive(Debug, Clone, Deserialize)]
pub struct GeoSettings {
    #[serde(default = "default_resolution")]
    pub resolution: u8,
    #[serde(default = "default_max_ring_k")]
    pub max_ring_k: u32,
    #[serde(default = "default_location_ttl")]
    pub location_ttl_secs: u64,
}

impl Default for GeoSettings {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            max_ring_k: default_max_ring_k(),
            location_ttl_secs: default_location_ttl(),
        }
    }
}

fn default_resolution() -> u8 { 9 }
fn default_max_ring_k() -> u32 { 3 }
fn default_location_ttl() -> u64 { 300 }

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_max_helpers_to_notify")]
    pub max_helpers_to_notify: usize,
    #[serde(default = "default_match_wait_secs")]
    pub match_wait_secs: u64,
    #[serde(default = "default_scoring_timeout_ms")]
    pub scoring_timeout_ms: u64,
    #[serde(default = "default_scoring_concurrency")]
    pub scoring_concurrency: usize,
    #[serde(default = "default_average_speed_kmh")]
    pub average_speed_kmh: f64,
    #[serde(default = "default_retry_radius_multiplier")]
    pub retry_radius_multiplier: f64,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            max_candidates: default_max_candidates(),
            max_helpers_to_notify: default_max_helpers_to_notify(),
            match_wait_secs: default_match_wait_secs(),
            scoring_timeout_ms: default_scoring_timeout_ms(),
            scoring_concurrency: default_scoring_concurrency(),
            average_speed_kmh: default_average_speed_kmh(),
            retry_radius_multiplier: default_retry_radius_multiplier(),
        }
    }
}

fn default_max_candidates() -> usize { 50 }
fn default_max_helpers_to_notify() -> usize { 10 }
fn default_match_wait_secs() -> u64 { 15 }
fn default_scoring_timeout_ms() -> u64 { 100 }
fn default_scoring_concurrency() -> usize { 16 }
fn default_average_speed_kmh() -> f64 { 20.0 }
fn default_retry_radius_multiplier() -> f64 { 2.0 }

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringSettings {
    #[serde(default)]
    pub weights: WeightsConfig,
    #[serde(default = "default_min_rating_threshold")]
    pub min_rating_threshold: f64,
    #[serde(default = "default_max_distance_km")]
    pub max_distance_km: f64,
    #[serde(default = "default_max_response_time_secs")]
    pub max_response_time_secs: f64,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            weights: WeightsConfig::default(),
            min_rating_threshold: default_min_rating_threshold(),
            max_distance_km: default_max_distance_km(),
            max_response_time_secs: default_max_response_time_secs(),
        }
    }
}

fn default_min_rating_threshold() -> f64 { 3.0 }
fn default_max_distance_km() -> f64 { 10.0 }
fn default_max_response_time_secs() -> f64 { 300.0 }

#[derive(Debug, Clone, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_proximity_weight")]
    pub proximity: f64,
    #[serde(default = "default_rating_weight")]
    pub rating: f64,
    #[serde(default = "default_response_time_weight")]
    pub response_time: f64,
    #[serde(default = "default_skill_match_weight")]
    pub skill_match: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            proximity: default_proximity_weight(),
            rating: default_rating_weight(),
            response_time: default_response_time_weight(),
            skill_match: default_skill_match_weight(),
        }
    }
}

impl From<&WeightsConfig> for ScoringWeights {
    fn from(config: &WeightsConfig) -> Self {
        ScoringWeights {
            proximity: config.proximity,
            rating: config.rating,
            response_time: config.response_time,
            skill_match: config.skill_match,
        }
    }
}

fn default_proximity_weight() -> f64 { 0.35 }
fn default_rating_weight() -> f64 { 0.25 }
fn default_response_time_weight() -> f64 { 0.20 }
fn default_skill_match_weight() -> f64 { 0.20 }

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_offer_timeout_secs")]
    pub offer_timeout_secs: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            offer_timeout_secs: default_offer_timeout_secs(),
        }
    }
}

fn default_batch_size() -> usize { 3 }
fn default_inter_batch_delay_ms() -> u64 { 2_000 }
fn default_poll_interval_ms() -> u64 { 100 }
fn default_offer_timeout_secs() -> u64 { 30 }

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimSettings {
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    #[serde(default = "default_history_ttl_secs")]
    pub history_ttl_secs: u64,
}

impl Default for ClaimSettings {
    fn default() -> Self {
        Self {
            lock_ttl_secs: default_lock_ttl_secs(),
            history_ttl_secs: default_history_ttl_secs(),
        }
    }
}

fn default_lock_ttl_secs() -> u64 { 300 }
fn default_history_ttl_secs() -> u64 { 86_400 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with HELPMATCH__)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., HELPMATCH__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("HELPMATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        apply_env_overrides(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("HELPMATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

/// Well-known variables that deployments set without the prefix
fn apply_env_overrides(settings: Config) -> Result<Config, ConfigError> {
    let mut builder = Config::builder().add_source(settings);

    if let Ok(redis_url) = std::env::var("REDIS_URL") {
        builder = builder.set_override("store.redis_url", redis_url)?;
    }
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        builder = builder.set_override("logging.level", level)?;
    }
    if let Ok(format) = std::env::var("LOG_FORMAT") {
        builder = builder.set_override("logging.format", format)?;
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights() {
        let weights = WeightsConfig::default();
        assert_eq!(weights.proximity, 0.35);
        assert_eq!(weights.rating, 0.25);
        assert_eq!(weights.response_time, 0.20);
        assert_eq!(weights.skill_match, 0.20);
    }

    #[test]
    fn test_default_logging() {
        let logging = LoggingSettings::default();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, "json");
    }

    #[test]
    fn test_defaults_follow_documented_values() {
        let dispatch = DispatchSettings::default();
        assert_eq!(dispatch.batch_size, 3);
        assert_eq!(dispatch.inter_batch_delay_ms, 2_000);

        let matching = MatchingSettings::default();
        assert_eq!(matching.max_candidates, 50);
        assert_eq!(matching.average_speed_kmh, 20.0);

        assert_eq!(GeoSettings::default().max_ring_k, 3);
        assert_eq!(ClaimSettings::default().lock_ttl_secs, 300);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("helper-match-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.toml");
        std::fs::write(
            &path,
            r#"
[server]
host = "127.0.0.1"
port = 9000

[store]
backend = "memory"
redis_url = "redis://unused"

[scoring.weights]
proximity = 0.5
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.store.backend, StoreBackend::Memory);
        assert_eq!(settings.scoring.weights.proximity, 0.5);
        assert_eq!(settings.scoring.weights.rating, 0.25);
        assert_eq!(settings.dispatch.batch_size, 3);

        std::fs::remove_dir_all(&dir).ok();
    }
}
