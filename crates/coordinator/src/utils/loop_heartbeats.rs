use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};

const STALE_AFTER_SECS: i64 = 120;

#[derive(Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub matcher_last_run_seconds_ago: i64,
    pub sla_monitor_last_run_seconds_ago: i64,
    pub validation_last_run_seconds_ago: i64,
}

/// Last-iteration timestamps of the background loops.
pub struct LoopHeartbeats {
    last_matcher_iteration: AtomicI64,
    last_sla_monitor_iteration: AtomicI64,
    last_validation_iteration: AtomicI64,
    validation_expected: bool,
}

fn seconds_ago(now: i64, last: &AtomicI64) -> i64 {
    let last = last.load(Ordering::SeqCst);
    if last > 0 {
        now - last
    } else {
        -1
    }
}

fn fresh(seconds_ago: i64) -> bool {
    seconds_ago != -1 && seconds_ago < STALE_AFTER_SECS
}

impl Default for LoopHeartbeats {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopHeartbeats {
    pub fn new() -> Self {
        Self {
            last_matcher_iteration: AtomicI64::new(-1),
            last_sla_monitor_iteration: AtomicI64::new(-1),
            last_validation_iteration: AtomicI64::new(-1),
            validation_expected: true,
        }
    }

    /// For deployments where verdicts only arrive through the admin api.
    pub fn without_validation_loop(mut self) -> Self {
        self.validation_expected = false;
        self
    }

    pub fn update_matcher(&self) {
        self.last_matcher_iteration
            .store(Utc::now().timestamp(), Ordering::SeqCst);
    }

    pub fn update_sla_monitor(&self) {
        self.last_sla_monitor_iteration
            .store(Utc::now().timestamp(), Ordering::SeqCst);
    }

    pub fn update_validation(&self) {
        self.last_validation_iteration
            .store(Utc::now().timestamp(), Ordering::SeqCst);
    }

    pub fn health_status(&self) -> HealthStatus {
        let now = Utc::now().timestamp();
        let matcher = seconds_ago(now, &self.last_matcher_iteration);
        let sla_monitor = seconds_ago(now, &self.last_sla_monitor_iteration);
        let validation = seconds_ago(now, &self.last_validation_iteration);

        let healthy = fresh(matcher)
            && fresh(sla_monitor)
            && (!self.validation_expected || fresh(validation));

        HealthStatus {
            healthy,
            matcher_last_run_seconds_ago: matcher,
            sla_monitor_last_run_seconds_ago: sla_monitor,
            validation_last_run_seconds_ago: validation,
        }
    }
}
