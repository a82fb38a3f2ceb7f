use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use shared::models::amount;
use shared::models::job::{CommitRequest, JobRequest};
use shared::models::worker::WorkerRegistration;
use shared::models::{
    Job, JobStatus, JobStatusEvent, PerformanceStats, ViolationKind, Worker, WorkerFilter,
    WorkerStatus,
};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::config::{CoordinatorConfig, SlaConfig, SlashingConfig, BPS_SCALE};
use crate::error::{CoordinatorError, Result};
use crate::events::{EventBus, Subscription};
use crate::ledger::{SlotClaim, StakeLedger, StakeSnapshot};
use crate::matcher::quota::EpochQuota;
use crate::metrics::MetricsContext;
use crate::pricing::{NetworkStats, PricingEngine};
use crate::reputation::{Outcome, ReputationTracker};
use crate::sla;
use crate::sla::uptime::UptimeTracker;
use crate::store::core::StoreContext;

#[cfg(test)]
pub(crate) mod fixtures;

/// A worker together with its live stake and earnings.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerView {
    #[serde(flatten)]
    pub worker: Worker,
    pub stake_record: StakeSnapshot,
    #[serde(with = "amount")]
    pub earnings: U256,
}

/// How an SLA violation was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationOutcome {
    Requeued { at_fault: bool, slashed: U256 },
    Failed { at_fault: bool, slashed: U256 },
}

fn unbreached_action(kind: ViolationKind) -> &'static str {
    match kind {
        ViolationKind::CommitDeadline => "claim a missed commit deadline for",
        ViolationKind::Timeout => "claim a timeout for",
        ViolationKind::Uptime => "claim an uptime breach for",
        ViolationKind::ValidationTimeout => "claim a validation timeout for",
    }
}

/// The single writer for job state.
///
/// Every transition goes through [`JobStore::transition`], which holds the
/// job's entry while the guard is checked, the stake ledger is touched and
/// the status event is published. Lock order is always job -> worker ->
/// stake record, so subscribers see a job's events in transition order.
///
/// [`JobStore::transition`]: crate::store::domains::job_store::JobStore::transition
pub struct JobRegistry {
    store: Arc<StoreContext>,
    ledger: Arc<StakeLedger>,
    pricing: Arc<PricingEngine>,
    reputation: Arc<ReputationTracker>,
    uptime: Arc<UptimeTracker>,
    events: EventBus,
    metrics: Option<Arc<MetricsContext>>,
    slashing: SlashingConfig,
    sla: SlaConfig,
    quota: Arc<EpochQuota>,
    match_signal: Arc<Notify>,
}

impl JobRegistry {
    pub fn new(
        config: &CoordinatorConfig,
        store: Arc<StoreContext>,
        events: EventBus,
        metrics: Option<Arc<MetricsContext>>,
    ) -> Self {
        Self {
            store,
            ledger: Arc::new(StakeLedger::new()),
            pricing: Arc::new(PricingEngine::new(
                config.pricing.clone(),
                config.stake.clone(),
            )),
            reputation: Arc::new(ReputationTracker::new(config.reputation.clone())),
            uptime: Arc::new(UptimeTracker::new(config.sla.heartbeat_interval_secs)),
            events,
            metrics,
            slashing: config.slashing.clone(),
            sla: config.sla.clone(),
            quota: Arc::new(EpochQuota::new(config.quota.clone(), Utc::now())),
            match_signal: Arc::new(Notify::new()),
        }
    }

    pub fn store(&self) -> &Arc<StoreContext> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<StakeLedger> {
        &self.ledger
    }

    pub fn reputation(&self) -> &Arc<ReputationTracker> {
        &self.reputation
    }

    pub fn uptime(&self) -> &Arc<UptimeTracker> {
        &self.uptime
    }

    pub fn quota(&self) -> &Arc<EpochQuota> {
        &self.quota
    }

    /// Starts a new quota epoch once the current one is over.
    pub fn roll_quota_epoch(&self, now: DateTime<Utc>) {
        if self.quota.roll(now) {
            self.request_match();
        }
    }

    /// Woken whenever matching might now succeed.
    pub fn match_signal(&self) -> Arc<Notify> {
        self.match_signal.clone()
    }

    fn request_match(&self) {
        self.match_signal.notify_one();
    }

    fn transitioned(&self, job: &Job, old_status: JobStatus) {
        self.transitioned_to(&job.id, old_status, job.status);
    }

    fn transitioned_to(&self, job_id: &str, old_status: JobStatus, new_status: JobStatus) {
        info!("job {job_id}: {old_status} -> {new_status}");
        if let Some(metrics) = &self.metrics {
            metrics.record_transition(old_status, new_status);
        }
        self.events
            .publish(JobStatusEvent::new(job_id, old_status, new_status));
    }

    fn record_slash(&self, amount: U256) {
        if amount.is_zero() {
            return;
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_slash();
        }
    }

    fn require(caller: Option<Address>) -> Result<Address> {
        caller.ok_or(CoordinatorError::SignerRequired)
    }

    fn new_job_id(&self) -> String {
        loop {
            let id = format!("job-{}", Uuid::new_v4());
            if !self.store.job_store.is_reserved(&id) {
                return id;
            }
        }
    }

    pub fn network_stats(&self) -> NetworkStats {
        let workers = self.store.worker_store.all();
        let active: Vec<&Worker> = workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Active)
            .collect();
        let capacity = active.iter().map(|w| w.specs.capacity()).sum();
        let active_jobs = self
            .store
            .job_store
            .count_where(|j| j.status.is_in_flight());
        let pending_jobs = self
            .store
            .job_store
            .count_where(|j| j.status == JobStatus::Pending);
        NetworkStats {
            total_workers: workers.len(),
            active_workers: active.len(),
            active_jobs,
            pending_jobs,
            capacity,
            utilization_bps: NetworkStats::utilization_bps(active_jobs, capacity),
        }
    }

    pub fn current_price(&self, job_class: &str) -> Result<U256> {
        let stats = self.network_stats();
        self.pricing.current_price(job_class, stats.utilization_bps)
    }

    pub fn minimum_stake_for(&self, job: &Job) -> U256 {
        self.pricing.minimum_stake_for(job.price, &job.sla)
    }

    pub fn submit(&self, caller: Option<Address>, request: JobRequest) -> Result<Job> {
        let client = Self::require(caller)?;
        request
            .specs
            .validate()
            .map_err(CoordinatorError::InvalidSpec)?;
        request.sla.validate().map_err(CoordinatorError::InvalidSpec)?;
        let job_class = request
            .job_class
            .clone()
            .unwrap_or_else(|| self.pricing.default_class().to_string());
        self.pricing.base_price(&job_class)?;

        let create = || -> Result<Job> {
            let utilization = self.network_stats().utilization_bps;
            let price = self.pricing.quote(&job_class, &request.sla, utilization)?;
            let id = self.new_job_id();
            Ok(Job::new(id, client, request.clone(), job_class.clone(), price))
        };

        let (job, created) = match request.idempotency_key.clone() {
            Some(key) => self
                .store
                .job_store
                .insert_idempotent(client, key, create)?,
            None => {
                let job = create()?;
                self.store.job_store.insert(job.clone())?;
                (job, true)
            }
        };

        if created {
            info!(
                "job {} submitted by {client}: {} x{}GB, price {}",
                job.id, job.specs.gpu, job.specs.vram, job.price
            );
            self.request_match();
        } else {
            debug!("idempotent resubmission returned {}", job.id);
        }
        Ok(job)
    }

    /// A live job. Archived jobs are only reachable through [`Self::find_job`].
    pub fn get_job(&self, job_id: &str) -> Result<Job> {
        self.store
            .job_store
            .get(job_id)
            .ok_or_else(|| CoordinatorError::NotFound(format!("job {job_id}")))
    }

    /// Live job, falling back to the archive.
    pub async fn find_job(&self, job_id: &str) -> Result<Job> {
        if let Some(job) = self.store.job_store.get(job_id) {
            return Ok(job);
        }
        self.store
            .archive
            .get(job_id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(format!("job {job_id}")))
    }

    /// Hardware, status, exclusion and price checks; stake is judged by the ledger.
    pub fn check_eligibility(&self, job: &Job, worker: &Worker) -> Result<()> {
        if worker.status != WorkerStatus::Active {
            return Err(CoordinatorError::WorkerUnavailable(format!(
                "{} is {}",
                worker.address, worker.status
            )));
        }
        if !worker.specs.satisfies(&job.specs) {
            return Err(CoordinatorError::WorkerUnavailable(format!(
                "{} does not meet the specs of {}",
                worker.address, job.id
            )));
        }
        if job.excluded_workers.contains(&worker.address) {
            return Err(CoordinatorError::WorkerUnavailable(format!(
                "{} was removed from {} for a violation",
                worker.address, job.id
            )));
        }
        if let Some(ask) = worker.ask_price {
            if ask > job.price {
                return Err(CoordinatorError::WorkerUnavailable(format!(
                    "{} asks {ask}, {} pays {}",
                    worker.address, job.id, job.price
                )));
            }
        }
        if !self.quota.has_room(&worker.address) {
            return Err(CoordinatorError::WorkerUnavailable(format!(
                "{} used its quota for this epoch ({} bps)",
                worker.address,
                self.quota.used_bps(&worker.address)
            )));
        }
        Ok(())
    }

    /// Pending -> Assigned. The eligibility check, the stake lock and the
    /// state change happen under the job's entry: either all of them land
    /// or none do.
    pub fn assign(&self, job_id: &str, worker_address: Address) -> Result<Job> {
        let active_workers = self.store.worker_store.active_count();
        let update = self.store.job_store.transition(
            job_id,
            |job| {
                if job.status != JobStatus::Pending {
                    return Err(CoordinatorError::invalid_transition(
                        &job.id, job.status, "assign",
                    ));
                }
                let worker = self
                    .store
                    .worker_store
                    .get(&worker_address)
                    .ok_or_else(|| CoordinatorError::NotFound(format!("worker {worker_address}")))?;
                self.check_eligibility(job, &worker)?;

                let required = self.pricing.minimum_stake_for(job.price, &job.sla);
                self.ledger.lock(
                    worker_address,
                    &job.id,
                    required,
                    &SlotClaim::new(&worker.specs, &job.specs),
                )?;
                self.quota.charge(worker_address, active_workers);

                job.worker = Some(worker_address);
                job.assigned_at = Some(Utc::now());
                job.stake_locked = required;
                job.status = JobStatus::Assigned;
                Ok(())
            },
            |u| self.transitioned(&u.job, u.old_status),
        )?;
        Ok(update.job)
    }

    /// Assigned -> Executing, driven by the worker's first heartbeat.
    pub fn begin_execution(&self, job_id: &str, caller: Option<Address>) -> Result<Job> {
        let worker = Self::require(caller)?;
        let update = self.store.job_store.transition(
            job_id,
            |job| {
                if job.status != JobStatus::Assigned {
                    return Err(CoordinatorError::invalid_transition(
                        &job.id,
                        job.status,
                        "begin execution of",
                    ));
                }
                Self::ensure_assigned_worker(job, worker)?;
                job.status = JobStatus::Executing;
                self.uptime.start(&job.id, Utc::now());
                Ok(())
            },
            |u| self.transitioned(&u.job, u.old_status),
        )?;
        Ok(update.job)
    }

    /// Liveness signal from the assigned worker. The first heartbeat of an
    /// assignment starts execution; later ones feed the uptime ratio.
    pub fn heartbeat(&self, job_id: &str, caller: Option<Address>) -> Result<Job> {
        let worker = Self::require(caller)?;
        let assigned = self
            .store
            .job_store
            .get(job_id)
            .is_some_and(|j| j.status == JobStatus::Assigned);
        if assigned {
            match self.begin_execution(job_id, caller) {
                // another heartbeat started it first
                Err(CoordinatorError::InvalidTransition { .. }) => {}
                other => return other,
            }
        }
        let update = self.store.job_store.update(job_id, |job| {
            if job.status != JobStatus::Executing {
                return Err(CoordinatorError::invalid_transition(
                    &job.id,
                    job.status,
                    "heartbeat",
                ));
            }
            Self::ensure_assigned_worker(job, worker)?;
            self.uptime.beat(&job.id, Utc::now());
            Ok(())
        })?;
        Ok(update.job)
    }

    fn ensure_assigned_worker(job: &Job, caller: Address) -> Result<()> {
        if job.worker != Some(caller) {
            return Err(CoordinatorError::Forbidden(format!(
                "{caller} is not the worker assigned to {}",
                job.id
            )));
        }
        Ok(())
    }

    /// Executing -> Committed.
    pub fn commit(&self, job_id: &str, caller: Option<Address>, request: CommitRequest) -> Result<Job> {
        let worker = Self::require(caller)?;
        if request.output_root == B256::ZERO {
            return Err(CoordinatorError::InvalidSpec(
                "output root must not be empty".to_string(),
            ));
        }
        let update = self.store.job_store.transition(
            job_id,
            |job| {
                if job.status != JobStatus::Executing {
                    return Err(CoordinatorError::invalid_transition(
                        &job.id, job.status, "commit",
                    ));
                }
                Self::ensure_assigned_worker(job, worker)?;
                let now = Utc::now();
                if let Some(assigned_at) = job.assigned_at {
                    let elapsed = u64::try_from((now - assigned_at).num_seconds()).unwrap_or(0);
                    if elapsed > job.sla.max_latency {
                        // the monitor settles it on its next sweep
                        return Err(CoordinatorError::SlaViolation(format!(
                            "commit deadline of {} passed {elapsed}s after assignment",
                            job.id
                        )));
                    }
                }
                job.output_root = Some(request.output_root);
                job.committed_at = Some(now);
                job.status = JobStatus::Committed;
                Ok(self.uptime.ratio_bps(&job.id, now, 0))
            },
            |u| self.transitioned(&u.job, u.old_status),
        )?;
        self.uptime.finish(job_id);
        if let Some(ratio) = update.output {
            self.record_performance(worker, |stats| stats.record_uptime(ratio, Utc::now()));
        }
        Ok(update.job)
    }

    /// Committed -> Validating, taken before the verifier is consulted.
    pub fn begin_validation(&self, job_id: &str) -> Result<Job> {
        let update = self.store.job_store.transition(
            job_id,
            |job| {
                if job.status != JobStatus::Committed {
                    return Err(CoordinatorError::invalid_transition(
                        &job.id,
                        job.status,
                        "begin validation of",
                    ));
                }
                job.status = JobStatus::Validating;
                Ok(())
            },
            |u| self.transitioned(&u.job, u.old_status),
        )?;
        Ok(update.job)
    }

    /// Committed/Validating -> Completed on pass, Slashed on fail.
    pub fn validation_result(&self, job_id: &str, passed: bool) -> Result<Job> {
        let slash_bps = self.slashing.validation_slash_bps;
        let update = self.store.job_store.transition(
            job_id,
            |job| {
                if !matches!(job.status, JobStatus::Committed | JobStatus::Validating) {
                    return Err(CoordinatorError::invalid_transition(
                        &job.id,
                        job.status,
                        "resolve validation of",
                    ));
                }
                let worker = job.worker.ok_or_else(|| {
                    CoordinatorError::invalid_transition(&job.id, job.status, "resolve validation of")
                })?;

                let slashed = if passed {
                    self.ledger.release(worker, &job.id)?;
                    self.ledger.credit(worker, job.price);
                    job.status = JobStatus::Completed;
                    U256::ZERO
                } else {
                    let slashed = if slash_bps == 0 {
                        self.ledger.release(worker, &job.id)?;
                        U256::ZERO
                    } else {
                        self.ledger.slash(worker, &job.id, slash_bps)?
                    };
                    job.status = JobStatus::Slashed;
                    slashed
                };
                job.stake_locked = U256::ZERO;
                job.completed_at = Some(Utc::now());
                Ok((worker, slashed))
            },
            |u| self.transitioned(&u.job, u.old_status),
        )?;

        let (worker, slashed) = update.output;
        self.record_slash(slashed);

        let outcome = if passed {
            let strictness = self
                .pricing
                .sla_multiplier_bps(&update.job.sla)
                .saturating_sub(BPS_SCALE)
                .min(BPS_SCALE);
            Outcome::Completed {
                strictness_bps: strictness,
            }
        } else {
            warn!("job {job_id} failed validation, slashed {slashed} from {worker}");
            Outcome::Slashed
        };
        self.record_outcome(worker, outcome);
        Ok(update.job)
    }

    /// The first SLA term `job` breaches at `now`, if any.
    pub fn sla_breach(&self, job: &Job, now: DateTime<Utc>) -> Option<ViolationKind> {
        sla::first_breach(job, now, &self.sla, &self.uptime)
    }

    /// Settles an SLA breach. The claimed `kind` is checked against the job's
    /// own timestamps first; a job still within its SLA is left untouched.
    /// With retries left the job goes back to Pending on a fresh assignment;
    /// otherwise it fails for good. Whether the worker loses stake is decided
    /// by the configured fault policy.
    pub fn sla_violation(
        &self,
        job_id: &str,
        kind: ViolationKind,
        now: DateTime<Utc>,
    ) -> Result<ViolationOutcome> {
        let policy = self.slashing.fault_policy;
        let update = self.store.job_store.transition(
            job_id,
            |job| {
                if !matches!(
                    job.status,
                    JobStatus::Assigned
                        | JobStatus::Executing
                        | JobStatus::Committed
                        | JobStatus::Validating
                ) {
                    return Err(CoordinatorError::invalid_transition(
                        &job.id,
                        job.status,
                        "report sla violation for",
                    ));
                }
                let worker = job.worker.ok_or_else(|| {
                    CoordinatorError::invalid_transition(&job.id, job.status, "report sla violation for")
                })?;
                if !sla::is_breached(job, kind, now, &self.sla, &self.uptime) {
                    return Err(CoordinatorError::invalid_transition(
                        &job.id,
                        job.status,
                        unbreached_action(kind),
                    ));
                }
                let uptime = (job.status == JobStatus::Executing)
                    .then(|| self.uptime.ratio_bps(&job.id, now, 0))
                    .flatten();
                let at_fault = policy.worker_at_fault(kind);
                let retry = job.retries_left();
                let slash_bps = match (at_fault, retry) {
                    (false, _) => 0,
                    (true, true) => self.slashing.retry_slash_bps,
                    (true, false) => self.slashing.sla_slash_bps,
                };
                let slashed = if slash_bps == 0 {
                    self.ledger.release(worker, &job.id)?;
                    U256::ZERO
                } else {
                    self.ledger.slash(worker, &job.id, slash_bps)?
                };

                self.uptime.finish(&job.id);
                job.violation = Some(kind);
                job.stake_locked = U256::ZERO;
                if retry {
                    job.retry_count += 1;
                    if at_fault && !job.excluded_workers.contains(&worker) {
                        job.excluded_workers.push(worker);
                    }
                    job.worker = None;
                    job.assigned_at = None;
                    job.committed_at = None;
                    job.output_root = None;
                    job.status = JobStatus::Pending;
                    Ok((worker, uptime, ViolationOutcome::Requeued { at_fault, slashed }))
                } else {
                    job.status = JobStatus::Failed;
                    job.completed_at = Some(now);
                    Ok((worker, uptime, ViolationOutcome::Failed { at_fault, slashed }))
                }
            },
            |u| match u.output.2 {
                ViolationOutcome::Requeued { .. } => {
                    self.transitioned_to(&u.job.id, u.old_status, JobStatus::Failed);
                    self.transitioned_to(&u.job.id, JobStatus::Failed, JobStatus::Pending);
                }
                ViolationOutcome::Failed { .. } => self.transitioned(&u.job, u.old_status),
            },
        )?;

        let (worker, uptime, outcome) = update.output;
        warn!("job {job_id}: sla violation {kind} by {worker}, {outcome:?}");
        if let Some(ratio) = uptime {
            self.record_performance(worker, |stats| stats.record_uptime(ratio, now));
        }
        match outcome {
            ViolationOutcome::Requeued { at_fault, slashed } => {
                self.record_slash(slashed);
                self.record_outcome(worker, Outcome::Retried { at_fault });
                self.request_match();
            }
            ViolationOutcome::Failed { at_fault, slashed } => {
                self.record_slash(slashed);
                self.record_outcome(worker, Outcome::Failed { at_fault });
            }
        }
        Ok(outcome)
    }

    /// Pending -> Failed at the client's request. No stake is involved.
    pub fn cancel(&self, job_id: &str, caller: Option<Address>) -> Result<Job> {
        let client = Self::require(caller)?;
        let update = self.store.job_store.transition(
            job_id,
            |job| {
                if job.client != client {
                    return Err(CoordinatorError::Forbidden(format!(
                        "{client} did not submit {}",
                        job.id
                    )));
                }
                if job.status != JobStatus::Pending {
                    return Err(CoordinatorError::invalid_transition(
                        &job.id, job.status, "cancel",
                    ));
                }
                job.status = JobStatus::Failed;
                job.completed_at = Some(Utc::now());
                Ok(())
            },
            |u| self.transitioned(&u.job, u.old_status),
        )?;
        Ok(update.job)
    }

    /// Moves a terminal job to the archive. Its id stays reserved.
    pub async fn archive(&self, job_id: &str) -> Result<Job> {
        let job = self.store.job_store.remove_terminal(job_id)?;
        if let Err(e) = self.store.archive.archive(&job).await {
            // put it back so the job is never lost
            self.store.job_store.insert(job)?;
            return Err(e);
        }
        info!("job {job_id} archived");
        Ok(job)
    }

    /// Known ids only, live or archived.
    pub fn subscribe(&self, job_id: &str) -> Result<Subscription> {
        if !self.store.job_store.is_reserved(job_id) {
            return Err(CoordinatorError::NotFound(format!("job {job_id}")));
        }
        Ok(self.events.subscribe(job_id))
    }

    fn record_performance<F>(&self, worker: Address, apply: F)
    where
        F: FnOnce(&mut PerformanceStats),
    {
        if let Err(e) = self.store.worker_store.record_performance(&worker, apply) {
            debug!("no performance record for {worker}: {e}");
        }
    }

    /// Folds a resolved assignment into the worker's reputation and job
    /// counters. A worker that drops below the reputation floor is suspended.
    fn record_outcome(&self, worker: Address, outcome: Outcome) {
        let now = Utc::now();
        self.record_performance(worker, |stats| {
            stats.record_job(matches!(outcome, Outcome::Completed { .. }), now)
        });
        let score = self.reputation.record(worker, outcome);
        if !self.reputation.below_floor(score) {
            return;
        }
        if let Some(w) = self.store.worker_store.get(&worker) {
            if w.status == WorkerStatus::Active {
                if let Ok(old) = self
                    .store
                    .worker_store
                    .set_status(&worker, WorkerStatus::Suspended)
                {
                    warn!("worker {worker} suspended ({old} -> suspended), reputation {score:.3}");
                }
            }
        }
    }

    pub fn register_worker(
        &self,
        caller: Option<Address>,
        registration: WorkerRegistration,
    ) -> Result<WorkerView> {
        let address = Self::require(caller)?;
        registration
            .specs
            .validate()
            .map_err(CoordinatorError::InvalidSpec)?;
        let worker = Worker {
            address,
            specs: registration.specs,
            reputation: self.reputation.score(&address),
            stake: registration.stake,
            ask_price: registration.ask_price,
            status: WorkerStatus::Active,
            registered_at: Utc::now(),
            performance: Default::default(),
        };
        self.store.worker_store.insert(worker)?;
        self.ledger.open_account(address, registration.stake)?;
        self.reputation.register(address);
        info!("worker {address} registered with stake {}", registration.stake);
        self.request_match();
        self.worker(&address)
    }

    pub fn deposit(&self, caller: Option<Address>, amount: U256) -> Result<WorkerView> {
        let address = Self::require(caller)?;
        self.ensure_registered(&address)?;
        self.ledger.deposit(address, amount)?;
        self.request_match();
        self.worker(&address)
    }

    pub fn withdraw(&self, caller: Option<Address>, amount: U256) -> Result<WorkerView> {
        let address = Self::require(caller)?;
        self.ensure_registered(&address)?;
        self.ledger.withdraw(address, amount)?;
        self.worker(&address)
    }

    fn ensure_registered(&self, address: &Address) -> Result<()> {
        if self.store.worker_store.get(address).is_none() {
            return Err(CoordinatorError::NotFound(format!("worker {address}")));
        }
        Ok(())
    }

    pub fn set_worker_status(&self, address: &Address, status: WorkerStatus) -> Result<WorkerView> {
        let old = self.store.worker_store.set_status(address, status)?;
        if old != status {
            info!("worker {address}: {old} -> {status}");
        }
        if status == WorkerStatus::Active {
            self.request_match();
        }
        self.worker(address)
    }

    fn hydrate(&self, mut worker: Worker) -> Worker {
        if let Some(snapshot) = self.ledger.snapshot(&worker.address) {
            worker.stake = snapshot.total;
        }
        worker.reputation = self.reputation.score(&worker.address);
        worker
    }

    pub fn worker(&self, address: &Address) -> Result<WorkerView> {
        let worker = self
            .store
            .worker_store
            .get(address)
            .ok_or_else(|| CoordinatorError::NotFound(format!("worker {address}")))?;
        let stake_record = self.ledger.snapshot(address).ok_or_else(|| {
            CoordinatorError::NotFound(format!("stake account of {address}"))
        })?;
        Ok(WorkerView {
            worker: self.hydrate(worker),
            stake_record,
            earnings: self.ledger.earnings(address),
        })
    }

    pub fn list_workers(&self, filter: &WorkerFilter) -> Vec<Worker> {
        self.store
            .worker_store
            .all()
            .into_iter()
            .filter(|w| filter.matches(w))
            .map(|w| self.hydrate(w))
            .collect()
    }

    /// Active workers with their live reputation, for matching.
    pub fn active_workers(&self) -> Vec<Worker> {
        self.store
            .worker_store
            .active()
            .into_iter()
            .map(|w| self.hydrate(w))
            .collect()
    }
}
