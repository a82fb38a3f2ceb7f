use crate::api::server::AppState;
use crate::error::CoordinatorError;
use actix_web::{
    web::{self, get, post, Data, Path, Query},
    HttpResponse, Scope,
};
use alloy::primitives::Address;
use serde_json::json;
use shared::models::worker::{StakeRequest, WorkerRegistration};
use shared::models::WorkerFilter;
use shared::security::caller::Caller;
use std::str::FromStr;

pub(crate) fn parse_address(raw: &str) -> Result<Address, CoordinatorError> {
    Address::from_str(raw)
        .map_err(|e| CoordinatorError::InvalidSpec(format!("invalid address {raw}: {e}")))
}

async fn register_worker(
    registration: web::Json<WorkerRegistration>,
    caller: Option<Caller>,
    app_state: Data<AppState>,
) -> Result<HttpResponse, CoordinatorError> {
    let worker = app_state
        .registry
        .register_worker(caller.map(|c| c.address()), registration.into_inner())?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "worker": worker})))
}

async fn list_workers(filter: Query<WorkerFilter>, app_state: Data<AppState>) -> HttpResponse {
    let workers = app_state.registry.list_workers(&filter);
    HttpResponse::Ok().json(json!({
        "success": true,
        "workers": workers,
        "total_count": workers.len()
    }))
}

async fn get_worker(address: Path<String>, app_state: Data<AppState>) -> Result<HttpResponse, CoordinatorError> {
    let address = parse_address(&address)?;
    let worker = app_state.registry.worker(&address)?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "worker": worker})))
}

async fn deposit(
    request: web::Json<StakeRequest>,
    caller: Option<Caller>,
    app_state: Data<AppState>,
) -> Result<HttpResponse, CoordinatorError> {
    let worker = app_state
        .registry
        .deposit(caller.map(|c| c.address()), request.amount)?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "worker": worker})))
}

async fn withdraw(
    request: web::Json<StakeRequest>,
    caller: Option<Caller>,
    app_state: Data<AppState>,
) -> Result<HttpResponse, CoordinatorError> {
    let worker = app_state
        .registry
        .withdraw(caller.map(|c| c.address()), request.amount)?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "worker": worker})))
}

pub(crate) fn workers_routes() -> Scope {
    web::scope("/workers")
        .route("", post().to(register_worker))
        .route("", get().to(list_workers))
        .route("/deposit", post().to(deposit))
        .route("/withdraw", post().to(withdraw))
        .route("/{address}", get().to(get_worker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::helper::{create_test_app_state, signed_post, worker_registration};
    use actix_web::http::StatusCode;
    use actix_web::test;
    use actix_web::App;
    use alloy::signers::local::PrivateKeySigner;
    use shared::security::caller::{NonceCache, ResolveCaller};
    use std::sync::Arc;

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state.clone())
                    .service(workers_routes().wrap(ResolveCaller::new(Arc::new(NonceCache::new())))),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_register_and_read_worker() {
        let app_state = create_test_app_state();
        let app = app!(app_state);
        let worker = PrivateKeySigner::random();

        let req = signed_post("/workers", &worker, worker_registration()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["worker"]["status"], "active");
        assert_eq!(body["worker"]["stake"], "1000000000000000000");
        assert_eq!(body["worker"]["stake_record"]["locked"], "0");

        let req = signed_post("/workers", &worker, worker_registration()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get()
            .uri(&format!("/workers/{}", worker.address()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/workers/not-an-address").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_list_workers_applies_filter() {
        let app_state = create_test_app_state();
        let app = app!(app_state);
        for _ in 0..2 {
            let signer = PrivateKeySigner::random();
            let req = signed_post("/workers", &signer, worker_registration()).to_request();
            assert!(test::call_service(&app, req).await.status().is_success());
        }

        let req = test::TestRequest::get()
            .uri("/workers?gpu=a100&min_vram=80")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_count"], 2);

        let req = test::TestRequest::get()
            .uri("/workers?status=suspended")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_count"], 0);
    }

    #[actix_web::test]
    async fn test_deposit_and_withdraw() {
        let app_state = create_test_app_state();
        let app = app!(app_state);
        let worker = PrivateKeySigner::random();
        let req = signed_post("/workers", &worker, worker_registration()).to_request();
        test::call_service(&app, req).await;

        let req = signed_post("/workers/deposit", &worker, json!({"amount": "500"})).to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["worker"]["stake_record"]["total"], "1000000000000000500");

        let req = signed_post(
            "/workers/withdraw",
            &worker,
            json!({"amount": "2000000000000000000"}),
        )
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::post()
            .uri("/workers/deposit")
            .set_json(json!({"amount": "5"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
