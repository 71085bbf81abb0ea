use actix_web::{web, HttpResponse, Responder};
use validator::Validate;

use crate::models::{HelperProfile, LocationResponse, LocationUpdateRequest, ProfileUpdateRequest};
use crate::routes::{service_unavailable, validation_failed, AppState};

/// Configure helper presence and profile routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/helpers/location", web::post().to(update_location))
        .route("/helpers/{helper_id}/location", web::delete().to(remove_location))
        .route("/helpers/{helper_id}/profile", web::put().to(update_profile));
}

/// Location heartbeat
///
/// POST /api/v1/helpers/location
///
/// Request body:
/// ```json
/// {
///   "helperId": "string",
///   "latitude": 40.7128,
///   "longitude": -74.0060,
///   "status": "AVAILABLE|BUSY|OFFLINE",
///   "accuracyM": 12.0,
///   "currentJobId": "string",
///   "deviceId": "string",
///   "timestamp": "2024-01-01T00:00:00Z"
/// }
/// ```
async fn update_location(state: web::Data<AppState>, req: web::Json<LocationUpdateRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors);
    }

    match state.engine.geo.apply_heartbeat(&req).await {
        Ok(record) => HttpResponse::Ok().json(LocationResponse {
            available: record.status.is_available(),
            helper_id: record.helper_id,
            cell_id: record.cell_id,
        }),
        Err(e) => service_unavailable("Failed to update location", &e),
    }
}

/// Take a helper offline and out of the index
///
/// DELETE /api/v1/helpers/{helper_id}/location
async fn remove_location(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let helper_id = path.into_inner();

    match state.engine.geo.remove_helper(&helper_id).await {
        Ok(removed) => HttpResponse::Ok().json(serde_json::json!({
            "helperId": helper_id,
            "removed": removed,
        })),
        Err(e) => service_unavailable("Failed to remove helper", &e),
    }
}

/// Seed or refresh the ranking profile for a helper
///
/// PUT /api/v1/helpers/{helper_id}/profile
async fn update_profile(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<ProfileUpdateRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors);
    }

    let req = req.into_inner();
    let profile = HelperProfile {
        helper_id: path.into_inner(),
        rating: req.rating,
        review_count: req.review_count,
        avg_response_secs: req.avg_response_secs,
        completion_rate: req.completion_rate,
        skills: req.skills,
    };

    match state.engine.profiles.put(&profile).await {
        Ok(()) => HttpResponse::Ok().json(profile),
        Err(e) => service_unavailable("Failed to cache profile", &e),
    }
}
