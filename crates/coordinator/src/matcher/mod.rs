pub mod quota;

use alloy::primitives::{Address, U256};
use chrono::Utc;
use log::{debug, info, warn};
use shared::models::{Job, JobStatus, Worker};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::error::{CoordinatorError, Result};
use crate::ledger::SlotClaim;
use crate::metrics::MetricsContext;
use crate::registry::JobRegistry;
use crate::utils::loop_heartbeats::LoopHeartbeats;

/// Pairs pending jobs with eligible workers.
pub struct Matcher {
    registry: Arc<JobRegistry>,
    metrics: Option<Arc<MetricsContext>>,
}

impl Matcher {
    pub fn new(registry: Arc<JobRegistry>, metrics: Option<Arc<MetricsContext>>) -> Self {
        Self { registry, metrics }
    }

    /// Runs a pass every `match_interval` seconds, or sooner when the registry
    /// signals that a job or worker became available.
    pub async fn run(&self, match_interval: u64, heartbeats: Arc<LoopHeartbeats>) -> Result<(), anyhow::Error> {
        let mut interval = interval(Duration::from_secs(match_interval.max(1)));
        let signal = self.registry.match_signal();
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = signal.notified() => {}
            }
            debug!("Running matching pass");
            let assigned = self.run_pass();
            if assigned > 0 {
                info!("Matching pass assigned {assigned} jobs");
            }
            heartbeats.update_matcher();
        }
    }

    fn implied_cost(job: &Job, worker: &Worker) -> U256 {
        worker.ask_price.unwrap_or(job.price)
    }

    /// Cheapest first, then best reputation, then longest registered.
    fn rank(job: &Job, a: &Worker, b: &Worker) -> Ordering {
        Self::implied_cost(job, a)
            .cmp(&Self::implied_cost(job, b))
            .then_with(|| {
                b.reputation
                    .partial_cmp(&a.reputation)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.registered_at.cmp(&b.registered_at))
            .then_with(|| a.address.cmp(&b.address))
    }

    /// Eligible workers for `job`, best first.
    pub fn candidates(&self, job: &Job) -> Vec<Worker> {
        let ledger = self.registry.ledger();
        let required = self.registry.minimum_stake_for(job);
        let mut candidates: Vec<Worker> = self
            .registry
            .active_workers()
            .into_iter()
            .filter(|w| self.registry.check_eligibility(job, w).is_ok())
            .filter(|w| ledger.has_slot(&w.address, &SlotClaim::new(&w.specs, &job.specs)))
            .filter(|w| ledger.available(&w.address) >= required)
            .collect();
        candidates.sort_by(|a, b| Self::rank(job, a, b));
        candidates
    }

    /// Assigns `job_id` to the best candidate still able to take it.
    pub fn match_job(&self, job_id: &str) -> Result<Address> {
        let job = self.registry.get_job(job_id)?;
        if job.status != JobStatus::Pending {
            return Err(CoordinatorError::invalid_transition(
                &job.id, job.status, "match",
            ));
        }
        for worker in self.candidates(&job) {
            match self.registry.assign(&job.id, worker.address) {
                Ok(_) => return Ok(worker.address),
                Err(
                    e @ (CoordinatorError::InsufficientStake { .. }
                    | CoordinatorError::WorkerUnavailable(_)),
                ) => {
                    debug!("{} lost the race for {}: {e}", worker.address, job.id);
                }
                Err(e) => return Err(e),
            }
        }
        Err(CoordinatorError::NoMatchingWorker(job.id))
    }

    /// One matching pass over pending jobs, oldest first. Returns the number
    /// of assignments made. Rolls the quota epoch first when it is over.
    pub fn run_pass(&self) -> usize {
        let _timer = self
            .metrics
            .as_ref()
            .map(|m| m.match_duration.start_timer());
        self.registry.roll_quota_epoch(Utc::now());
        let mut assigned = 0;
        for job in self.registry.store().job_store.pending_oldest_first() {
            match self.match_job(&job.id) {
                Ok(worker) => {
                    debug!("matched {} to {worker}", job.id);
                    assigned += 1;
                }
                Err(CoordinatorError::NoMatchingWorker(_)) => {
                    debug!("no eligible worker for {} yet", job.id);
                }
                Err(CoordinatorError::InvalidTransition { .. }) => {}
                Err(e) => warn!("Failed to match {}: {e}", job.id),
            }
        }
        if let Some(metrics) = &self.metrics {
            let pending = self
                .registry
                .store()
                .job_store
                .count_where(|j| j.status == JobStatus::Pending);
            metrics
                .pending_jobs
                .set(i64::try_from(pending).unwrap_or(i64::MAX));
        }
        assigned
    }
}
