pub mod uptime;

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use shared::models::{Job, JobStatus, ViolationKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::config::SlaConfig;
use crate::error::CoordinatorError;
use crate::registry::JobRegistry;
use crate::sla::uptime::UptimeTracker;
use crate::utils::loop_heartbeats::LoopHeartbeats;

fn elapsed_secs(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - since).num_seconds()).unwrap_or(0)
}

/// Order in which breaches are looked for; the first one found is reported.
const CHECK_ORDER: [ViolationKind; 4] = [
    ViolationKind::Timeout,
    ViolationKind::CommitDeadline,
    ViolationKind::Uptime,
    ViolationKind::ValidationTimeout,
];

/// Whether `job` breaches its SLA the way `kind` says at `now`.
pub fn is_breached(
    job: &Job,
    kind: ViolationKind,
    now: DateTime<Utc>,
    config: &SlaConfig,
    uptime: &UptimeTracker,
) -> bool {
    let sla = &job.sla;
    match kind {
        ViolationKind::Timeout => {
            job.status.is_in_flight() && elapsed_secs(job.submitted_at, now) > sla.timeout
        }
        ViolationKind::CommitDeadline => {
            matches!(job.status, JobStatus::Assigned | JobStatus::Executing)
                && job
                    .assigned_at
                    .is_some_and(|at| elapsed_secs(at, now) > sla.max_latency)
        }
        ViolationKind::Uptime => {
            job.status == JobStatus::Executing
                && uptime
                    .ratio_bps(&job.id, now, config.uptime_grace_intervals)
                    .is_some_and(|ratio| ratio < sla.uptime_bps())
        }
        // a verifier outage leaves the job validating, so both states count
        ViolationKind::ValidationTimeout => {
            matches!(job.status, JobStatus::Committed | JobStatus::Validating)
                && job
                    .committed_at
                    .is_some_and(|at| elapsed_secs(at, now) > config.validation_timeout_secs)
        }
    }
}

/// First breached condition of `job` at `now`, if any.
pub fn first_breach(
    job: &Job,
    now: DateTime<Utc>,
    config: &SlaConfig,
    uptime: &UptimeTracker,
) -> Option<ViolationKind> {
    CHECK_ORDER
        .into_iter()
        .find(|kind| is_breached(job, *kind, now, config, uptime))
}

/// Watches deadlines and uptime of in-flight jobs and reports breaches to
/// the registry, which confirms each one before settling it.
pub struct SlaMonitor {
    registry: Arc<JobRegistry>,
    sweep_interval: u64,
    heartbeats: Arc<LoopHeartbeats>,
}

impl SlaMonitor {
    pub fn new(registry: Arc<JobRegistry>, sweep_interval: u64, heartbeats: Arc<LoopHeartbeats>) -> Self {
        Self {
            registry,
            sweep_interval,
            heartbeats,
        }
    }

    pub async fn run(&self) -> Result<(), anyhow::Error> {
        let mut interval = interval(Duration::from_secs(self.sweep_interval.max(1)));
        loop {
            interval.tick().await;
            debug!("Running SLA sweep");
            let violations = self.sweep(Utc::now());
            if !violations.is_empty() {
                info!("SLA sweep signalled {} violations", violations.len());
            }
            self.heartbeats.update_sla_monitor();
        }
    }

    pub fn evaluate(&self, job: &Job, now: DateTime<Utc>) -> Option<ViolationKind> {
        self.registry.sla_breach(job, now)
    }

    /// Checks one job and signals its violation. Returns the violation that
    /// was applied; a job resolved in the meantime yields `None`.
    pub fn check_job(&self, job: &Job, now: DateTime<Utc>) -> Option<ViolationKind> {
        let kind = self.evaluate(job, now)?;
        match self.registry.sla_violation(&job.id, kind, now) {
            Ok(_) => Some(kind),
            Err(CoordinatorError::InvalidTransition { .. }) => {
                debug!("job {} resolved before {kind} could be applied", job.id);
                None
            }
            Err(e) => {
                error!("Failed to apply {kind} to job {}: {e}", job.id);
                None
            }
        }
    }

    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<(String, ViolationKind)> {
        self.registry
            .store()
            .job_store
            .all()
            .into_iter()
            .filter(|job| job.status.is_in_flight())
            .filter_map(|job| self.check_job(&job, now).map(|kind| (job.id, kind)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::registry::fixtures::*;
    use alloy::primitives::U256;
    use chrono::Duration as ChronoDuration;
    use shared::models::job::CommitRequest;

    fn monitor(registry: Arc<JobRegistry>) -> SlaMonitor {
        SlaMonitor::new(registry, 5, Arc::new(LoopHeartbeats::new()))
    }

    fn ether() -> U256 {
        U256::from(ONE_ETHER)
    }

    #[test]
    fn test_missed_commit_deadline_fails_job_and_slashes() {
        let registry = Arc::new(registry());
        let worker = register(&registry, 1, ether());
        let job = registry.submit(Some(client()), a100_request(0)).unwrap();
        let locked = registry.assign(&job.id, worker).unwrap().stake_locked;
        let monitor = monitor(registry.clone());

        assert!(monitor.sweep(Utc::now()).is_empty());

        let later = Utc::now() + ChronoDuration::seconds(61);
        let violations = monitor.sweep(later);
        assert_eq!(violations, vec![(job.id.clone(), ViolationKind::CommitDeadline)]);

        let job = registry.get_job(&job.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.violation, Some(ViolationKind::CommitDeadline));
        let stake = registry.ledger().snapshot(&worker).unwrap();
        assert_eq!(stake.locked, U256::ZERO);
        assert_eq!(
            stake.total,
            ether() - locked * U256::from(1_000) / U256::from(10_000)
        );

        // a second sweep finds nothing left to do
        assert!(monitor.sweep(later).is_empty());
    }

    #[test]
    fn test_missed_deadline_with_retries_requeues() {
        let registry = Arc::new(registry());
        let worker = register(&registry, 1, ether());
        let job = registry.submit(Some(client()), a100_request(2)).unwrap();
        registry.assign(&job.id, worker).unwrap();
        let monitor = monitor(registry.clone());

        monitor.sweep(Utc::now() + ChronoDuration::seconds(61));
        let job = registry.get_job(&job.id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
        assert_eq!(registry.ledger().open_locks(&worker), 0);
    }

    #[test]
    fn test_silent_worker_breaks_uptime() {
        let mut config = CoordinatorConfig::default();
        config.sla.heartbeat_interval_secs = 10;
        let registry = Arc::new(registry_with(config));
        let worker = register(&registry, 1, ether());
        let mut request = a100_request(0);
        request.sla.max_latency = 600;
        let job = registry.submit(Some(client()), request).unwrap();
        registry.assign(&job.id, worker).unwrap();
        let executing = registry.heartbeat(&job.id, Some(worker)).unwrap();
        let monitor = monitor(registry.clone());

        // still inside the grace period
        assert_eq!(
            monitor.evaluate(&executing, Utc::now() + ChronoDuration::seconds(15)),
            None
        );
        assert_eq!(
            monitor.evaluate(&executing, Utc::now() + ChronoDuration::seconds(45)),
            Some(ViolationKind::Uptime)
        );
    }

    #[test]
    fn test_lifetime_timeout_wins_over_other_deadlines() {
        let registry = Arc::new(registry());
        let worker = register(&registry, 1, ether());
        let job = registry.submit(Some(client()), a100_request(0)).unwrap();
        let job = registry.assign(&job.id, worker).unwrap();
        let monitor = monitor(registry.clone());

        assert_eq!(
            monitor.evaluate(&job, Utc::now() + ChronoDuration::seconds(3601)),
            Some(ViolationKind::Timeout)
        );
    }

    #[test]
    fn test_unverified_commit_times_out_without_fault() {
        let registry = Arc::new(registry());
        let worker = register(&registry, 1, ether());
        let job = registry.submit(Some(client()), a100_request(0)).unwrap();
        registry.assign(&job.id, worker).unwrap();
        registry.heartbeat(&job.id, Some(worker)).unwrap();
        registry
            .commit(
                &job.id,
                Some(worker),
                CommitRequest {
                    output_root: output_root(),
                },
            )
            .unwrap();
        let monitor = monitor(registry.clone());

        assert!(monitor
            .sweep(Utc::now() + ChronoDuration::seconds(120))
            .is_empty());
        let violations = monitor.sweep(Utc::now() + ChronoDuration::seconds(901));
        assert_eq!(
            violations,
            vec![(job.id.clone(), ViolationKind::ValidationTimeout)]
        );
        let stake = registry.ledger().snapshot(&worker).unwrap();
        assert_eq!(stake.total, ether());
    }

    #[test]
    fn test_pending_and_resolved_jobs_are_ignored() {
        let registry = Arc::new(registry());
        let pending = registry.submit(Some(client()), a100_request(0)).unwrap();
        let monitor = monitor(registry.clone());
        let far_future = Utc::now() + ChronoDuration::days(30);

        assert_eq!(monitor.evaluate(&pending, far_future), None);
        registry.cancel(&pending.id, Some(client())).unwrap();
        assert!(monitor.sweep(far_future).is_empty());
    }
}
