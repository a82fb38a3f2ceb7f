use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

/// Failure envelope; `code` is a stable machine-readable tag.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn new(code: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: code.to_string(),
        }
    }

    pub fn into_response(self, status: StatusCode) -> HttpResponse {
        HttpResponse::build(status).json(self)
    }
}
