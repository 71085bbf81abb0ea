use actix_web::{web, HttpResponse, Responder};
use validator::Validate;

use crate::models::{HealthResponse, MatchRequest, RetryMatchRequest};
use crate::routes::{validation_failed, AppState};

/// Configure matching routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/matches", web::post().to(create_match))
        .route("/matches/retry", web::post().to(retry_match))
        .route("/matches/{job_id}", web::delete().to(cancel_match));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let status = match state.engine.store.ping().await {
        Ok(()) => "healthy",
        Err(e) => {
            tracing::warn!("Store ping failed: {}", e);
            "degraded"
        }
    };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Match a newly created job
///
/// POST /api/v1/matches
///
/// Request body:
/// ```json
/// {
///   "jobId": "string",
///   "requesterId": "string",
///   "requiredSkills": ["plumbing"],
///   "latitude": 40.7128,
///   "longitude": -74.0060,
///   "maxSearchRadiusKm": 10,
///   "maxHelpersToNotify": 5,
///   "maxWaitTimeSeconds": 15,
///   "priority": 3
/// }
/// ```
///
/// Blocks until the attempt reaches a terminal status. Every outcome,
/// including infrastructure errors, is a `MatchResult` with status 200.
async fn create_match(state: web::Data<AppState>, req: web::Json<MatchRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for match request {}: {:?}", req.job_id, errors);
        return validation_failed(errors);
    }

    tracing::info!(
        job_id = %req.job_id,
        radius_km = req.max_search_radius_km,
        priority = req.priority,
        "Matching job"
    );

    let result = state.engine.orchestrator.match_task(&req).await;
    HttpResponse::Ok().json(result)
}

/// Retry a failed match over a wider radius
///
/// POST /api/v1/matches/retry
async fn retry_match(state: web::Data<AppState>, req: web::Json<RetryMatchRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors);
    }

    let result = state
        .engine
        .orchestrator
        .retry_match(&req.request, req.expanded_radius_km)
        .await;
    HttpResponse::Ok().json(result)
}

/// Cancel the in-flight attempt for a job
///
/// DELETE /api/v1/matches/{job_id}
async fn cancel_match(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let job_id = path.into_inner();
    let cancelled = state.engine.orchestrator.cancel_match(&job_id);

    HttpResponse::Ok().json(serde_json::json!({
        "jobId": job_id,
        "cancelled": cancelled,
    }))
}
