use crate::api::server::AppState;
use actix_web::{
    web::{self, get, Data},
    HttpResponse, Scope,
};
use log::error;
use serde_json::json;

async fn get_metrics(app_state: Data<AppState>) -> HttpResponse {
    match app_state.metrics.export_metrics() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => {
            error!("Failed to export metrics: {e}");
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": format!("Failed to export metrics: {e}")
            }))
        }
    }
}

pub(crate) fn metrics_routes() -> Scope {
    web::scope("/metrics").route("", get().to(get_metrics))
}
