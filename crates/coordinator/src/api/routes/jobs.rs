use crate::api::server::AppState;
use crate::error::CoordinatorError;
use actix_web::{
    web::{self, get, post, Bytes, Data, Path},
    HttpResponse, Scope,
};
use futures::StreamExt;
use serde_json::json;
use shared::models::job::{CommitRequest, JobRequest};
use shared::security::caller::Caller;

fn caller_address(caller: Option<Caller>) -> Option<alloy::primitives::Address> {
    caller.map(|c| c.address())
}

async fn submit_job(
    request: web::Json<JobRequest>,
    caller: Option<Caller>,
    app_state: Data<AppState>,
) -> Result<HttpResponse, CoordinatorError> {
    let job = app_state
        .registry
        .submit(caller_address(caller), request.into_inner())?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "job": job})))
}

async fn get_job(id: Path<String>, app_state: Data<AppState>) -> Result<HttpResponse, CoordinatorError> {
    let job = app_state.registry.find_job(&id).await?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "job": job})))
}

async fn cancel_job(
    id: Path<String>,
    caller: Option<Caller>,
    app_state: Data<AppState>,
) -> Result<HttpResponse, CoordinatorError> {
    let job = app_state.registry.cancel(&id, caller_address(caller))?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "job": job})))
}

async fn heartbeat(
    id: Path<String>,
    caller: Option<Caller>,
    app_state: Data<AppState>,
) -> Result<HttpResponse, CoordinatorError> {
    let job = app_state.registry.heartbeat(&id, caller_address(caller))?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "job": job})))
}

async fn commit(
    id: Path<String>,
    request: web::Json<CommitRequest>,
    caller: Option<Caller>,
    app_state: Data<AppState>,
) -> Result<HttpResponse, CoordinatorError> {
    let job = app_state
        .registry
        .commit(&id, caller_address(caller), request.into_inner())?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "job": job})))
}

/// Server-sent events, one `status` event per transition of the job.
async fn job_events(id: Path<String>, app_state: Data<AppState>) -> Result<HttpResponse, CoordinatorError> {
    let subscription = app_state.registry.subscribe(&id)?;
    let stream = subscription.map(|event| {
        serde_json::to_string(&event)
            .map(|data| Bytes::from(format!("event: status\ndata: {data}\n\n")))
    });
    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream))
}

pub(crate) fn jobs_routes() -> Scope {
    web::scope("/jobs")
        .route("", post().to(submit_job))
        .route("/{id}", get().to(get_job))
        .route("/{id}/cancel", post().to(cancel_job))
        .route("/{id}/heartbeat", post().to(heartbeat))
        .route("/{id}/commit", post().to(commit))
        .route("/{id}/events", get().to(job_events))
}
