use crate::api::routes::workers::parse_address;
use crate::api::server::AppState;
use crate::error::CoordinatorError;
use crate::registry::ViolationOutcome;
use actix_web::{
    web::{self, get, post, Data, Path, Query},
    HttpResponse, Scope,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use shared::models::job::ValidationVerdict;
use shared::models::worker::WorkerStatusUpdate;
use shared::models::{JobStatus, ViolationKind};

#[derive(Debug, Deserialize)]
struct JobListQuery {
    status: Option<JobStatus>,
}

#[derive(Debug, Deserialize)]
struct ViolationReport {
    kind: ViolationKind,
}

async fn list_jobs(query: Query<JobListQuery>, app_state: Data<AppState>) -> HttpResponse {
    let mut jobs = app_state.registry.store().job_store.all();
    if let Some(status) = query.status {
        jobs.retain(|j| j.status == status);
    }
    jobs.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
    HttpResponse::Ok().json(json!({
        "success": true,
        "jobs": jobs,
        "total_count": jobs.len()
    }))
}

async fn validation_result(
    id: Path<String>,
    verdict: web::Json<ValidationVerdict>,
    app_state: Data<AppState>,
) -> Result<HttpResponse, CoordinatorError> {
    let job = app_state.registry.validation_result(&id, verdict.passed)?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "job": job})))
}

async fn report_violation(
    id: Path<String>,
    report: web::Json<ViolationReport>,
    app_state: Data<AppState>,
) -> Result<HttpResponse, CoordinatorError> {
    let outcome = app_state
        .registry
        .sla_violation(&id, report.kind, Utc::now())?;
    let (requeued, at_fault, slashed) = match outcome {
        ViolationOutcome::Requeued { at_fault, slashed } => (true, at_fault, slashed),
        ViolationOutcome::Failed { at_fault, slashed } => (false, at_fault, slashed),
    };
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "requeued": requeued,
        "at_fault": at_fault,
        "slashed": slashed.to_string()
    })))
}

async fn archive_job(id: Path<String>, app_state: Data<AppState>) -> Result<HttpResponse, CoordinatorError> {
    let job = app_state.registry.archive(&id).await?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "job": job})))
}

async fn set_worker_status(
    address: Path<String>,
    update: web::Json<WorkerStatusUpdate>,
    app_state: Data<AppState>,
) -> Result<HttpResponse, CoordinatorError> {
    let address = parse_address(&address)?;
    let worker = app_state.registry.set_worker_status(&address, update.status)?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "worker": worker})))
}

pub(crate) fn admin_routes() -> Scope {
    web::scope("/admin")
        .route("/jobs", get().to(list_jobs))
        .route("/jobs/{id}/validation", post().to(validation_result))
        .route("/jobs/{id}/violation", post().to(report_violation))
        .route("/jobs/{id}/archive", post().to(archive_job))
        .route("/workers/{address}/status", post().to(set_worker_status))
}
