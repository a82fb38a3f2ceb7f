use alloy::primitives::B256;
use async_trait::async_trait;
use log::{debug, error, info};
use serde::Serialize;
use shared::models::job::ValidationVerdict;
use shared::models::{Job, JobSpecs, JobStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::error::{CoordinatorError, Result};
use crate::registry::JobRegistry;
use crate::utils::loop_heartbeats::LoopHeartbeats;

/// Judges a committed output.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, job: &Job) -> Result<bool>;
}

#[derive(Debug, Serialize)]
struct VerificationRequest<'a> {
    job_id: &'a str,
    output_root: B256,
    specs: &'a JobSpecs,
}

/// Asks an external service over HTTP; it must answer `{"passed": bool}`.
pub struct HttpVerifier {
    url: String,
    client: reqwest::Client,
}

impl HttpVerifier {
    pub fn new(url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CoordinatorError::Verifier(format!("cannot build http client: {e}")))?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl Verifier for HttpVerifier {
    async fn verify(&self, job: &Job) -> Result<bool> {
        let output_root = job.output_root.ok_or_else(|| {
            CoordinatorError::Verifier(format!("job {} has no output root", job.id))
        })?;
        let request = VerificationRequest {
            job_id: &job.id,
            output_root,
            specs: &job.specs,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CoordinatorError::Verifier(format!("request to {} failed: {e}", self.url)))?;
        if !response.status().is_success() {
            return Err(CoordinatorError::Verifier(format!(
                "{} answered {}",
                self.url,
                response.status()
            )));
        }
        let verdict: ValidationVerdict = response
            .json()
            .await
            .map_err(|e| CoordinatorError::Verifier(format!("unreadable verdict: {e}")))?;
        Ok(verdict.passed)
    }
}

/// Drives committed jobs through the verifier.
pub struct ValidationService {
    registry: Arc<JobRegistry>,
    verifier: Arc<dyn Verifier>,
}

impl ValidationService {
    pub fn new(registry: Arc<JobRegistry>, verifier: Arc<dyn Verifier>) -> Self {
        Self { registry, verifier }
    }

    pub async fn run(&self, validation_interval: u64, heartbeats: Arc<LoopHeartbeats>) -> Result<(), anyhow::Error> {
        let mut interval = interval(Duration::from_secs(validation_interval.max(1)));
        loop {
            interval.tick().await;
            debug!("Running validation pass");
            let resolved = self.run_pass().await;
            if resolved > 0 {
                info!("Validation pass resolved {resolved} jobs");
            }
            heartbeats.update_validation();
        }
    }

    /// Verifies every committed job, plus jobs left in validation by an
    /// earlier verifier error. A job the verifier cannot judge before the
    /// validation deadline is failed by the SLA monitor instead. Returns the
    /// number of verdicts applied.
    pub async fn run_pass(&self) -> usize {
        let jobs = self.registry.store().job_store.all();
        let mut resolved = 0;
        for job in jobs {
            let job = match job.status {
                JobStatus::Committed => match self.registry.begin_validation(&job.id) {
                    Ok(job) => job,
                    Err(e) => {
                        debug!("skipping {}: {e}", job.id);
                        continue;
                    }
                },
                JobStatus::Validating => job,
                _ => continue,
            };
            match self.verifier.verify(&job).await {
                Ok(passed) => match self.registry.validation_result(&job.id, passed) {
                    Ok(_) => resolved += 1,
                    Err(e) => debug!("verdict for {} not applied: {e}", job.id),
                },
                Err(e) => error!("Verifier failed for {}, retrying next pass: {e}", job.id),
            }
        }
        resolved
    }
}
