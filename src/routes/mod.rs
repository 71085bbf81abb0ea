// Route exports
pub mod admin;
pub mod helpers;
pub mod jobs;
pub mod matches;

use actix_web::{web, HttpResponse};
use std::sync::Arc;
use validator::ValidationErrors;

use crate::core::MatchEngine;
use crate::models::ErrorResponse;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MatchEngine>,
}

impl AppState {
    pub fn new(engine: Arc<MatchEngine>) -> Self {
        Self { engine }
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(matches::configure)
            .configure(helpers::configure)
            .configure(jobs::configure)
            .configure(admin::configure),
    );
}

pub(crate) fn validation_failed(errors: ValidationErrors) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: "Validation failed".to_string(),
        message: errors.to_string(),
        status_code: 400,
    })
}

/// 503 with a generic message; the cause is logged, not returned
pub(crate) fn service_unavailable(error: &str, cause: &dyn std::fmt::Display) -> HttpResponse {
    tracing::error!("{}: {}", error, cause);
    HttpResponse::ServiceUnavailable().json(ErrorResponse {
        error: error.to_string(),
        message: "A backing service is unavailable, retry shortly".to_string(),
        status_code: 503,
    })
}
