use actix_web::{web, HttpResponse, Responder};

use crate::core::Tuning;
use crate::routes::{validation_failed, AppState};

/// Configure stats and tuning routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/stats", web::get().to(stats))
        .route("/admin/tuning", web::get().to(get_tuning))
        .route("/admin/tuning", web::put().to(put_tuning));
}

/// Outcome counters, cache size and current helper supply
///
/// GET /api/v1/stats
async fn stats(state: web::Data<AppState>) -> impl Responder {
    let available_helpers = match state.engine.geo.available_count().await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!("Failed to count available helpers: {}", e);
            None
        }
    };

    HttpResponse::Ok().json(serde_json::json!({
        "matches": state.engine.metrics.snapshot(),
        "cache": state.engine.cache.stats(),
        "availableHelpers": available_helpers,
    }))
}

/// GET /api/v1/admin/tuning
async fn get_tuning(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.engine.tuning.snapshot())
}

/// Replace the tuning; weights are re-normalized before use
///
/// PUT /api/v1/admin/tuning
async fn put_tuning(state: web::Data<AppState>, req: web::Json<Tuning>) -> impl Responder {
    match state.engine.tuning.replace(req.into_inner()) {
        Ok(tuning) => HttpResponse::Ok().json(tuning),
        Err(errors) => validation_failed(errors),
    }
}
