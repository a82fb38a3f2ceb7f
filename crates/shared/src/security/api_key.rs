use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorUnauthorized,
    http::header::{HeaderMap, AUTHORIZATION},
    Error,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// True when `headers` carry `Authorization: Bearer <expected>`.
/// The scheme is case-insensitive; the key is compared in constant time.
pub fn bearer_matches(headers: &HeaderMap, expected: &str) -> bool {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()) else {
        return false;
    };
    let Some((scheme, key)) = value.split_once(' ') else {
        return false;
    };
    if !scheme.eq_ignore_ascii_case("bearer") || expected.is_empty() {
        return false;
    }
    let provided = key.trim().as_bytes();
    let expected = expected.as_bytes();
    provided.len() == expected.len() && provided.ct_eq(expected).into()
}

/// Guards operator endpoints: worker status overrides, verdicts and archival.
#[derive(Clone)]
pub struct AdminKey {
    key: Arc<String>,
}

impl AdminKey {
    pub fn new(key: String) -> Self {
        Self { key: Arc::new(key) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdminKey
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AdminKeyService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdminKeyService {
            service,
            key: self.key.clone(),
        }))
    }
}

pub struct AdminKeyService<S> {
    service: S,
    key: Arc<String>,
}

impl<S, B> Service<ServiceRequest> for AdminKeyService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if bearer_matches(req.headers(), &self.key) {
            return Box::pin(self.service.call(req));
        }
        Box::pin(async move {
            Err(ErrorUnauthorized(json!({
                "success": false,
                "error": "Invalid admin key",
                "code": "UNAUTHORIZED"
            })))
        })
    }
}
