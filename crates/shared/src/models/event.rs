use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::job::JobStatus;

/// Emitted once for every successful job transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusEvent {
    pub job_id: String,
    pub old_status: JobStatus,
    pub new_status: JobStatus,
    pub timestamp: DateTime<Utc>,
}

impl JobStatusEvent {
    pub fn new(job_id: &str, old_status: JobStatus, new_status: JobStatus) -> Self {
        Self {
            job_id: job_id.to_string(),
            old_status,
            new_status,
            timestamp: Utc::now(),
        }
    }
}
