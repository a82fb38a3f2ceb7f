use crate::api::server::AppState;
use crate::error::CoordinatorError;
use actix_web::{
    web::{self, get, Data, Path},
    HttpResponse, Scope,
};
use serde_json::json;

async fn current_price(job_class: Path<String>, app_state: Data<AppState>) -> Result<HttpResponse, CoordinatorError> {
    let stats = app_state.registry.network_stats();
    let price = app_state.registry.current_price(&job_class)?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "job_class": job_class.into_inner(),
        "price": price.to_string(),
        "utilization_bps": stats.utilization_bps
    })))
}

async fn network_stats(app_state: Data<AppState>) -> HttpResponse {
    let stats = app_state.registry.network_stats();
    HttpResponse::Ok().json(json!({"success": true, "stats": stats}))
}

pub(crate) fn pricing_routes() -> Scope {
    web::scope("/pricing").route("/{job_class}", get().to(current_price))
}

pub(crate) fn network_routes() -> Scope {
    web::scope("/network").route("/stats", get().to(network_stats))
}
