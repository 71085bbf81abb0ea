use actix_web::{web, HttpResponse, Responder};
use validator::Validate;

use crate::core::ClaimOutcome;
use crate::models::{ClaimJobRequest, ClaimResponse, ClaimStatus, DeclineJobRequest, ReleaseJobRequest, ReleaseResponse};
use crate::routes::{service_unavailable, validation_failed, AppState};

/// Configure claim lifecycle routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/jobs/{job_id}/claim", web::post().to(claim_job))
        .route("/jobs/{job_id}/release", web::post().to(release_job))
        .route("/jobs/{job_id}/decline", web::post().to(decline_job))
        .route("/jobs/{job_id}/complete", web::post().to(complete_job));
}

/// Attempt to take a job
///
/// POST /api/v1/jobs/{job_id}/claim
///
/// Request body:
/// ```json
/// {
///   "helperId": "string",
///   "estimatedArrivalMinutes": 12,
///   "notes": "string"
/// }
/// ```
///
/// 200 CLAIMED, 409 ALREADY_CLAIMED, 410 EXPIRED, 400 INVALID_JOB,
/// 503 ERROR when the claim store is unreachable.
async fn claim_job(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<ClaimJobRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors);
    }

    let job_id = path.into_inner();
    let req = req.into_inner();
    let outcome = state
        .engine
        .claims
        .claim(&job_id, &req.helper_id, req.estimated_arrival_minutes, req.notes)
        .await;

    match outcome {
        Ok(ClaimOutcome::Claimed(record)) => HttpResponse::Ok().json(ClaimResponse {
            status: ClaimStatus::Claimed,
            job_id,
            holder_id: Some(record.helper_id.clone()),
            claim: Some(record),
            message: "Job claimed".to_string(),
        }),
        Ok(ClaimOutcome::AlreadyClaimed { holder }) => HttpResponse::Conflict().json(ClaimResponse {
            status: ClaimStatus::AlreadyClaimed,
            job_id,
            holder_id: Some(holder),
            claim: None,
            message: "Job already claimed by another helper".to_string(),
        }),
        Ok(ClaimOutcome::Expired) => HttpResponse::Gone().json(ClaimResponse {
            status: ClaimStatus::Expired,
            job_id,
            holder_id: None,
            claim: None,
            message: "Job is no longer open".to_string(),
        }),
        Ok(ClaimOutcome::InvalidJob) => HttpResponse::BadRequest().json(ClaimResponse {
            status: ClaimStatus::InvalidJob,
            job_id,
            holder_id: None,
            claim: None,
            message: "Job id and helper id are required".to_string(),
        }),
        Err(e) => {
            tracing::error!(job_id = %job_id, "Claim failed: {}", e);
            HttpResponse::ServiceUnavailable().json(ClaimResponse {
                status: ClaimStatus::Error,
                job_id,
                holder_id: None,
                claim: None,
                message: "Claim could not be processed, retry shortly".to_string(),
            })
        }
    }
}

/// Give a claimed job back
///
/// POST /api/v1/jobs/{job_id}/release
async fn release_job(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<ReleaseJobRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors);
    }

    let job_id = path.into_inner();
    match state.engine.claims.release(&job_id, &req.helper_id).await {
        Ok(released) => HttpResponse::Ok().json(ReleaseResponse { job_id, released }),
        Err(e) => service_unavailable("Failed to release claim", &e),
    }
}

/// Turn down an offer
///
/// POST /api/v1/jobs/{job_id}/decline
async fn decline_job(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<DeclineJobRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors);
    }

    let job_id = path.into_inner();
    match state
        .engine
        .dispatcher
        .handle_decline(&job_id, &req.helper_id, req.reason.as_deref())
        .await
    {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "jobId": job_id,
            "helperId": req.helper_id,
            "declined": true,
        })),
        Err(e) => service_unavailable("Failed to record decline", &e),
    }
}

/// Job reached a terminal lifecycle state; drop all claim state
///
/// POST /api/v1/jobs/{job_id}/complete
async fn complete_job(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let job_id = path.into_inner();
    state.engine.dispatcher.cancel_dispatch(&job_id);

    match state.engine.claims.cleanup(&job_id).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "jobId": job_id,
            "closed": true,
        })),
        Err(e) => service_unavailable("Failed to clean up job", &e),
    }
}
