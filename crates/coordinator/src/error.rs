use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use alloy::primitives::{Address, U256};
use shared::models::api::ApiError;
use shared::models::JobStatus;
use std::fmt;

pub type Result<T, E = CoordinatorError> = std::result::Result<T, E>;

#[derive(Debug)]
pub enum CoordinatorError {
    /// The operation needs an authenticated signer and none was supplied.
    SignerRequired,
    /// The caller is authenticated but is not the party the operation belongs to.
    Forbidden(String),
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        action: &'static str,
    },
    InsufficientStake {
        worker: Address,
        required: U256,
        available: U256,
    },
    NoMatchingWorker(String),
    SlaViolation(String),
    NotFound(String),
    InvalidSpec(String),
    /// The worker exists but cannot take on the job right now.
    WorkerUnavailable(String),
    Verifier(String),
    Archive(redis::RedisError),
    Serialization(serde_json::Error),
}

impl CoordinatorError {
    pub fn invalid_transition(job_id: &str, from: JobStatus, action: &'static str) -> Self {
        CoordinatorError::InvalidTransition {
            job_id: job_id.to_string(),
            from,
            action,
        }
    }

    /// Stable machine-readable tag used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CoordinatorError::SignerRequired => "SIGNER_REQUIRED",
            CoordinatorError::Forbidden(_) => "FORBIDDEN",
            CoordinatorError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoordinatorError::InsufficientStake { .. } => "INSUFFICIENT_STAKE",
            CoordinatorError::NoMatchingWorker(_) => "NO_MATCHING_WORKER",
            CoordinatorError::SlaViolation(_) => "SLA_VIOLATION",
            CoordinatorError::NotFound(_) => "NOT_FOUND",
            CoordinatorError::InvalidSpec(_) => "INVALID_SPEC",
            CoordinatorError::WorkerUnavailable(_) => "WORKER_UNAVAILABLE",
            CoordinatorError::Verifier(_) => "VERIFIER_ERROR",
            CoordinatorError::Archive(_) => "ARCHIVE_ERROR",
            CoordinatorError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            CoordinatorError::SignerRequired => StatusCode::UNAUTHORIZED,
            CoordinatorError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoordinatorError::InvalidTransition { .. }
            | CoordinatorError::InsufficientStake { .. }
            | CoordinatorError::NoMatchingWorker(_)
            | CoordinatorError::SlaViolation(_)
            | CoordinatorError::WorkerUnavailable(_) => StatusCode::CONFLICT,
            CoordinatorError::NotFound(_) => StatusCode::NOT_FOUND,
            CoordinatorError::InvalidSpec(_) => StatusCode::BAD_REQUEST,
            CoordinatorError::Verifier(_)
            | CoordinatorError::Archive(_)
            | CoordinatorError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorError::SignerRequired => write!(f, "a signer is required for this operation"),
            CoordinatorError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            CoordinatorError::InvalidTransition {
                job_id,
                from,
                action,
            } => write!(f, "cannot {action} job {job_id} while it is {from}"),
            CoordinatorError::InsufficientStake {
                worker,
                required,
                available,
            } => write!(
                f,
                "worker {worker} has {available} available stake, {required} required"
            ),
            CoordinatorError::NoMatchingWorker(job_id) => {
                write!(f, "no eligible worker for job {job_id}")
            }
            CoordinatorError::SlaViolation(msg) => write!(f, "sla violation: {msg}"),
            CoordinatorError::NotFound(what) => write!(f, "{what} not found"),
            CoordinatorError::InvalidSpec(msg) => write!(f, "invalid request: {msg}"),
            CoordinatorError::WorkerUnavailable(msg) => write!(f, "worker unavailable: {msg}"),
            CoordinatorError::Verifier(msg) => write!(f, "verifier error: {msg}"),
            CoordinatorError::Archive(e) => write!(f, "archive error: {e}"),
            CoordinatorError::Serialization(e) => write!(f, "serialization error: {e}"),
        }
    }
}

impl std::error::Error for CoordinatorError {}

impl From<redis::RedisError> for CoordinatorError {
    fn from(err: redis::RedisError) -> Self {
        CoordinatorError::Archive(err)
    }
}

impl From<serde_json::Error> for CoordinatorError {
    fn from(err: serde_json::Error) -> Self {
        CoordinatorError::Serialization(err)
    }
}

impl actix_web::ResponseError for CoordinatorError {
    fn status_code(&self) -> StatusCode {
        self.http_status()
    }

    fn error_response(&self) -> HttpResponse {
        ApiError::new(self.code(), self.to_string()).into_response(self.http_status())
    }
}
