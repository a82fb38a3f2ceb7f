use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::models::amount;

pub const DEFAULT_JOB_CLASS: &str = "standard";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Assigned,
    Executing,
    Committed,
    Validating,
    Completed,
    Failed,
    Slashed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Slashed
        )
    }

    /// A worker holds locked stake for the job.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            JobStatus::Assigned | JobStatus::Executing | JobStatus::Committed | JobStatus::Validating
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Assigned => "assigned",
            JobStatus::Executing => "executing",
            JobStatus::Committed => "committed",
            JobStatus::Validating => "validating",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Slashed => "slashed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "assigned" => Ok(JobStatus::Assigned),
            "executing" => Ok(JobStatus::Executing),
            "committed" => Ok(JobStatus::Committed),
            "validating" => Ok(JobStatus::Validating),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "slashed" => Ok(JobStatus::Slashed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Why the SLA monitor pulled a job out of execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// No commit within `max_latency` of the assignment.
    CommitDeadline,
    /// Total lifetime exceeded `sla.timeout`.
    Timeout,
    /// Heartbeat ratio fell below `sla.required_uptime`.
    Uptime,
    /// No verdict arrived within the validation window after the commit.
    ValidationTimeout,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ViolationKind::CommitDeadline => "commit_deadline",
            ViolationKind::Timeout => "timeout",
            ViolationKind::Uptime => "uptime",
            ViolationKind::ValidationTimeout => "validation_timeout",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct JobSpecs {
    pub gpu: String,
    /// Per-card memory in GB.
    pub vram: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl JobSpecs {
    pub fn validate(&self) -> Result<(), String> {
        if self.gpu.trim().is_empty() {
            return Err("job specs must name a gpu model".to_string());
        }
        if self.vram == 0 {
            return Err("job specs must request a positive amount of vram".to_string());
        }
        if let Some(region) = &self.region {
            if region.trim().is_empty() {
                return Err("job region must not be blank when present".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sla {
    /// Seconds allowed between assignment and commit.
    pub max_latency: u64,
    pub max_retries: u32,
    /// Hard ceiling on the job's lifetime in seconds, counted from submission.
    pub timeout: u64,
    /// Fraction in [0, 1] of the execution window the worker must stay responsive.
    pub required_uptime: f64,
}

impl Default for Sla {
    fn default() -> Self {
        Self {
            max_latency: 600,
            max_retries: 0,
            timeout: 3600,
            required_uptime: 0.0,
        }
    }
}

impl Sla {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_latency == 0 {
            return Err("sla.max_latency must be positive".to_string());
        }
        if self.timeout == 0 {
            return Err("sla.timeout must be positive".to_string());
        }
        if !self.required_uptime.is_finite() || !(0.0..=1.0).contains(&self.required_uptime) {
            return Err(format!(
                "sla.required_uptime must be within [0, 1], got {}",
                self.required_uptime
            ));
        }
        Ok(())
    }

    /// Required uptime in basis points.
    pub fn uptime_bps(&self) -> u32 {
        (self.required_uptime.clamp(0.0, 1.0) * 10_000.0).round() as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobRequest {
    pub specs: JobSpecs,
    pub sla: Sla,
    #[serde(default)]
    pub job_class: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub client: Address,
    #[serde(default)]
    pub worker: Option<Address>,
    pub specs: JobSpecs,
    pub sla: Sla,
    pub job_class: String,
    #[serde(with = "amount")]
    pub price: U256,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub committed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub output_root: Option<B256>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub violation: Option<ViolationKind>,
    /// Stake held against the current assignment.
    #[serde(default, with = "amount")]
    pub stake_locked: U256,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Workers removed from this job for an at-fault violation.
    #[serde(default)]
    pub excluded_workers: Vec<Address>,
}

impl Job {
    pub fn new(id: String, client: Address, request: JobRequest, job_class: String, price: U256) -> Self {
        Self {
            id,
            client,
            worker: None,
            specs: request.specs,
            sla: request.sla,
            job_class,
            price,
            status: JobStatus::Pending,
            submitted_at: Utc::now(),
            assigned_at: None,
            committed_at: None,
            completed_at: None,
            output_root: None,
            retry_count: 0,
            violation: None,
            stake_locked: U256::ZERO,
            idempotency_key: request.idempotency_key,
            excluded_workers: vec![],
        }
    }

    pub fn retries_left(&self) -> bool {
        self.retry_count < self.sla.max_retries
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.status)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    pub output_root: B256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub passed: bool,
}
