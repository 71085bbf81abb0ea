// Core algorithm and component exports
pub mod claims;
pub mod dispatcher;
pub mod distance;
pub mod engine;
pub mod finder;
pub mod geo_index;
pub mod hexgrid;
pub mod metrics;
pub mod orchestrator;
pub mod ranker;
pub mod scoring;
pub mod tuning;

pub use claims::{ClaimArbitrator, ClaimError, ClaimOutcome};
pub use dispatcher::{DispatchProgress, Dispatcher, WaitOutcome};
pub use distance::{estimate_eta_minutes, haversine_distance};
pub use engine::MatchEngine;
pub use finder::{CandidateFinder, SearchOutcome};
pub use geo_index::GeoIndex;
pub use hexgrid::{CellId, GridError, HexGrid};
pub use metrics::{MatchMetrics, MetricsSnapshot};
pub use orchestrator::MatchOrchestrator;
pub use ranker::HelperRanker;
pub use scoring::{score_candidate, ScoringParams};
pub use tuning::{Tuning, TuningHandle};
