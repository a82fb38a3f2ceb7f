use alloy::primitives::Address;
use dashmap::DashMap;
use log::debug;

use crate::config::{ReputationConfig, BPS_SCALE};

/// What happened to a worker's job, as far as reputation is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `strictness_bps` is the SLA multiplier above 1.0 the worker satisfied.
    Completed { strictness_bps: u32 },
    Retried { at_fault: bool },
    Failed { at_fault: bool },
    Slashed,
}

/// Bounded exponential-moving-average reputation per worker.
pub struct ReputationTracker {
    config: ReputationConfig,
    scores: DashMap<Address, f64>,
}

impl ReputationTracker {
    pub fn new(config: ReputationConfig) -> Self {
        Self {
            config,
            scores: DashMap::new(),
        }
    }

    pub fn register(&self, worker: Address) {
        self.scores.entry(worker).or_insert(self.config.neutral);
    }

    pub fn score(&self, worker: &Address) -> f64 {
        self.scores
            .get(worker)
            .map(|s| *s)
            .unwrap_or(self.config.neutral)
    }

    /// Target value and blend weight for an outcome; `None` leaves the score alone.
    fn target(&self, outcome: Outcome) -> Option<(f64, f64)> {
        let c = &self.config;
        match outcome {
            Outcome::Completed { strictness_bps } => {
                let strictness = (f64::from(strictness_bps) / f64::from(BPS_SCALE)).clamp(0.0, 1.0);
                Some((c.completed_value, 0.5 + strictness / 2.0))
            }
            Outcome::Retried { at_fault: true } => Some((c.failed_value, 0.5)),
            Outcome::Failed { at_fault: true } => Some((c.failed_value, 0.75)),
            Outcome::Slashed => Some((c.slashed_value, 1.0)),
            Outcome::Retried { at_fault: false } | Outcome::Failed { at_fault: false } => None,
        }
    }

    /// Applies `score + rate × weight × (target − score)`, clamped. Returns the new score.
    pub fn record(&self, worker: Address, outcome: Outcome) -> f64 {
        let c = &self.config;
        let mut score = self.scores.entry(worker).or_insert(c.neutral);
        if let Some((target, weight)) = self.target(outcome) {
            let updated = *score + c.learning_rate * weight * (target - *score);
            *score = updated.clamp(c.min, c.max);
            debug!("reputation of {worker} after {outcome:?}: {:.4}", *score);
        }
        *score
    }

    /// True when a suspension floor is configured and `score` is below it.
    pub fn below_floor(&self, score: f64) -> bool {
        self.config
            .suspension_floor
            .is_some_and(|floor| score < floor)
    }
}
