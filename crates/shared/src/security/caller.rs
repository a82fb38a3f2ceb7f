use actix_web::dev::Payload;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::error::{ErrorBadRequest, PayloadError};
use actix_web::web::{Bytes, BytesMut};
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use alloy::primitives::Address;
use alloy::signers::Signature;
use dashmap::DashMap;
use futures_util::future::{self, LocalBoxFuture};
use futures_util::{Stream, StreamExt};
use log::{debug, warn};
use serde_json::json;
use std::future::{ready, Ready};
use std::pin::Pin;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::time::timeout;

use crate::security::request_signer::signing_message;

const MAX_BODY_SIZE: usize = 1024 * 1024;
const BODY_TIMEOUT_SECS: u64 = 20;
const REQUEST_EXPIRY_SECS: u64 = 300;
const MAX_CLOCK_SKEW_SECS: u64 = 30;
const MAX_NONCE_LENGTH: usize = 64;
const MIN_NONCE_LENGTH: usize = 16;

/// The address that signed the current request.
///
/// Only present when the request carried a valid `x-address`/`x-signature`
/// pair. Handlers that need a signer take `Option<Caller>` and let the
/// coordinator decide whether an anonymous call is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub Address);

impl Caller {
    pub fn address(&self) -> Address {
        self.0
    }
}

impl FromRequest for Caller {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Caller>()
                .copied()
                .ok_or_else(|| ErrorBadRequest("request is not signed")),
        )
    }
}

/// Replay protection for signed requests.
#[derive(Default)]
pub struct NonceCache {
    seen: DashMap<String, Instant>,
}

impl NonceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate_format(nonce: &str) -> bool {
        if nonce.len() < MIN_NONCE_LENGTH || nonce.len() > MAX_NONCE_LENGTH {
            return false;
        }
        nonce.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    }

    /// Returns false when the nonce was already used inside the window a
    /// timestamp stays acceptable for.
    pub fn check_and_store(&self, nonce: &str) -> bool {
        let now = Instant::now();
        let window = Duration::from_secs(REQUEST_EXPIRY_SECS + MAX_CLOCK_SKEW_SECS);
        self.seen
            .retain(|_, first_seen| now.duration_since(*first_seen) < window);

        match self.seen.entry(nonce.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }
}

/// Middleware that resolves the signer of a request without requiring one.
///
/// Unsigned requests pass through untouched. Signed requests are checked:
/// the signature must recover to `x-address` over `path + sorted JSON body`,
/// and that body must carry a recent `timestamp` and an unused `nonce`.
pub struct ResolveCaller {
    nonces: Arc<NonceCache>,
}

impl ResolveCaller {
    pub fn new(nonces: Arc<NonceCache>) -> Self {
        Self { nonces }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ResolveCaller
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ResolveCallerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ResolveCallerMiddleware {
            service: Rc::new(service),
            nonces: self.nonces.clone(),
        }))
    }
}

pub struct ResolveCallerMiddleware<S> {
    service: Rc<S>,
    nonces: Arc<NonceCache>,
}

fn header(req: &ServiceRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

impl<S, B> Service<ServiceRequest> for ResolveCallerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let nonces = self.nonces.clone();

        let (Some(address), Some(signature)) =
            (header(&req, "x-address"), header(&req, "x-signature"))
        else {
            return Box::pin(service.call(req));
        };
        let path = req.path().to_string();

        Box::pin(async move {
            let mut payload = req.take_payload();
            let read_body = async {
                let mut body = BytesMut::new();
                while let Some(chunk) = payload.next().await {
                    let chunk = chunk?;
                    if body.len() + chunk.len() > MAX_BODY_SIZE {
                        return Err(ErrorBadRequest(json!({
                            "success": false,
                            "error": "Request body too large",
                            "code": "BODY_TOO_LARGE"
                        })));
                    }
                    body.extend_from_slice(chunk.as_ref());
                }
                Ok::<_, Error>(body)
            };

            let Ok(body) = timeout(Duration::from_secs(BODY_TIMEOUT_SECS), read_body).await else {
                return Err(ErrorBadRequest(json!({
                    "success": false,
                    "error": "Request body read timeout",
                    "code": "BODY_READ_TIMEOUT"
                })));
            };
            let body = body?;

            let parsed: Option<serde_json::Value> = if body.is_empty() {
                None
            } else {
                match serde_json::from_slice(&body) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        debug!("Rejecting signed request with invalid JSON: {e}");
                        return Err(ErrorBadRequest(json!({
                            "success": false,
                            "error": "Invalid JSON payload",
                            "code": "INVALID_JSON"
                        })));
                    }
                }
            };

            // Both must sit inside the signed body so they cannot be swapped.
            let field = |name: &str| parsed.as_ref().and_then(|v| v.get(name)).cloned();
            let timestamp = field("timestamp").and_then(|v| v.as_u64());
            let nonce = field("nonce").and_then(|v| v.as_str().map(str::to_string));

            let Ok(message) = signing_message(&path, parsed.as_ref()) else {
                return Err(ErrorBadRequest(json!({
                    "success": false,
                    "error": "Failed to serialize payload",
                    "code": "SERIALIZATION_ERROR"
                })));
            };

            let Ok(parsed_signature) = Signature::from_str(signature.trim_start_matches("0x"))
            else {
                return Err(ErrorBadRequest(json!({
                    "success": false,
                    "error": "Invalid signature format",
                    "code": "INVALID_SIGNATURE_FORMAT"
                })));
            };
            let Ok(expected) = Address::from_str(&address) else {
                return Err(ErrorBadRequest(json!({
                    "success": false,
                    "error": "Invalid address format",
                    "code": "INVALID_ADDRESS_FORMAT"
                })));
            };
            let Ok(recovered) = parsed_signature.recover_address_from_msg(message) else {
                return Err(ErrorBadRequest(json!({
                    "success": false,
                    "error": "Failed to recover address from message",
                    "code": "ADDRESS_RECOVERY_FAILED"
                })));
            };
            if recovered != expected {
                debug!("Signature recovered {recovered}, header claimed {expected}");
                return Err(ErrorBadRequest(json!({
                    "success": false,
                    "error": "Invalid signature",
                    "code": "SIGNATURE_MISMATCH"
                })));
            }

            let Some(timestamp) = timestamp else {
                return Err(ErrorBadRequest(json!({
                    "success": false,
                    "error": "Missing timestamp",
                    "code": "MISSING_TIMESTAMP"
                })));
            };
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            if timestamp > now + MAX_CLOCK_SKEW_SECS {
                return Err(ErrorBadRequest(json!({
                    "success": false,
                    "error": "Timestamp is in the future",
                    "code": "TIMESTAMP_IN_FUTURE",
                    "timestamp": timestamp,
                    "current_time": now
                })));
            }
            if now.saturating_sub(timestamp) > REQUEST_EXPIRY_SECS {
                return Err(ErrorBadRequest(json!({
                    "success": false,
                    "error": "Request expired",
                    "code": "REQUEST_EXPIRED",
                    "max_age_seconds": REQUEST_EXPIRY_SECS
                })));
            }

            let Some(nonce) = nonce else {
                return Err(ErrorBadRequest(json!({
                    "success": false,
                    "error": "Missing nonce",
                    "code": "MISSING_NONCE",
                    "message": "Request must include a unique nonce for replay protection"
                })));
            };
            if !NonceCache::validate_format(&nonce) {
                return Err(ErrorBadRequest(json!({
                    "success": false,
                    "error": "Invalid nonce format",
                    "code": "INVALID_NONCE_FORMAT"
                })));
            }
            if !nonces.check_and_store(&nonce) {
                warn!("Replayed nonce from {recovered}");
                return Err(ErrorBadRequest(json!({
                    "success": false,
                    "error": "Request replay detected",
                    "code": "NONCE_ALREADY_USED"
                })));
            }

            req.extensions_mut().insert(Caller(recovered));

            let stream = futures_util::stream::once(future::ok::<Bytes, PayloadError>(body.freeze()));
            let boxed: Pin<Box<dyn Stream<Item = Result<Bytes, PayloadError>>>> = Box::pin(stream);
            req.set_payload(Payload::from(boxed));

            service.call(req).await
        })
    }
}
