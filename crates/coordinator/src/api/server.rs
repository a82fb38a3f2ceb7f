use crate::api::routes::admin::admin_routes;
use crate::api::routes::jobs::jobs_routes;
use crate::api::routes::market::{network_routes, pricing_routes};
use crate::api::routes::metrics::metrics_routes;
use crate::api::routes::workers::workers_routes;
use crate::metrics::MetricsContext;
use crate::registry::JobRegistry;
use crate::utils::loop_heartbeats::LoopHeartbeats;
use actix_web::middleware::{NormalizePath, TrailingSlash};
use actix_web::{middleware, web::Data, App, HttpServer};
use actix_web::{web, HttpResponse};
use anyhow::Error;
use log::info;
use serde_json::json;
use shared::security::api_key::AdminKey;
use shared::security::caller::{NonceCache, ResolveCaller};
use std::sync::Arc;

pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub metrics: Arc<MetricsContext>,
    pub heartbeats: Arc<LoopHeartbeats>,
}

pub(crate) async fn health(data: web::Data<AppState>) -> HttpResponse {
    let health_status = data.heartbeats.health_status();
    if health_status.healthy {
        HttpResponse::Ok().json(health_status)
    } else {
        HttpResponse::InternalServerError().json(health_status)
    }
}

pub async fn start_server(
    host: &str,
    port: u16,
    registry: Arc<JobRegistry>,
    metrics: Arc<MetricsContext>,
    heartbeats: Arc<LoopHeartbeats>,
    admin_api_key: String,
) -> Result<(), Error> {
    info!("Starting server at http://{host}:{port}");
    let app_state = Data::new(AppState {
        registry,
        metrics,
        heartbeats,
    });
    let nonces = Arc::new(NonceCache::new());
    let admin_key = AdminKey::new(admin_api_key);

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .wrap(NormalizePath::new(TrailingSlash::Trim))
            .app_data(web::PayloadConfig::default().limit(1_048_576))
            .service(web::resource("/health").route(web::get().to(health)))
            .service(jobs_routes().wrap(ResolveCaller::new(nonces.clone())))
            .service(workers_routes().wrap(ResolveCaller::new(nonces.clone())))
            .service(pricing_routes())
            .service(network_routes())
            .service(metrics_routes())
            .service(admin_routes().wrap(admin_key.clone()))
            .default_service(web::route().to(|| async {
                HttpResponse::NotFound().json(json!({
                    "success": false,
                    "error": "Resource not found"
                }))
            }))
    })
    .bind((host, port))?
    .run()
    .await?;
    Ok(())
}
