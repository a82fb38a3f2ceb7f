use alloy::primitives::U256;
use serde::Serialize;
use shared::models::Sla;

use crate::config::{PricingConfig, StakeConfig, BPS_SCALE};
use crate::error::{CoordinatorError, Result};

/// Snapshot of marketplace load used for quoting.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct NetworkStats {
    pub total_workers: usize,
    pub active_workers: usize,
    pub active_jobs: usize,
    pub pending_jobs: usize,
    /// Concurrent job slots across active workers.
    pub capacity: usize,
    pub utilization_bps: u32,
}

impl NetworkStats {
    /// Active jobs over capacity in basis points, capped at 100%.
    pub fn utilization_bps(active_jobs: usize, capacity: usize) -> u32 {
        if capacity == 0 {
            return if active_jobs > 0 { BPS_SCALE } else { 0 };
        }
        let ratio = (active_jobs as u128 * u128::from(BPS_SCALE)) / capacity as u128;
        ratio.min(u128::from(BPS_SCALE)) as u32
    }
}

/// Deterministic price-per-compute quotes. All math is integer basis points.
pub struct PricingEngine {
    pricing: PricingConfig,
    stake: StakeConfig,
}

fn lerp_bps(from: u32, to: u32, progress: u64, span: u64) -> u32 {
    if span == 0 {
        return to;
    }
    let progress = progress.min(span);
    let delta = u64::from(to.saturating_sub(from));
    from + (delta * progress / span) as u32
}

impl PricingEngine {
    pub fn new(pricing: PricingConfig, stake: StakeConfig) -> Self {
        Self { pricing, stake }
    }

    pub fn default_class(&self) -> &str {
        &self.pricing.default_class
    }

    pub fn base_price(&self, job_class: &str) -> Result<U256> {
        self.pricing
            .base_prices
            .get(job_class)
            .map(|p| U256::from(*p))
            .ok_or_else(|| CoordinatorError::InvalidSpec(format!("unknown job class {job_class}")))
    }

    /// Non-decreasing in utilization: `min` at idle, 1.0 at the target, `max` at saturation.
    pub fn utilization_multiplier_bps(&self, utilization_bps: u32) -> u32 {
        let util = utilization_bps.min(BPS_SCALE);
        let target = self.pricing.target_utilization_bps.clamp(1, BPS_SCALE);
        if util <= target {
            lerp_bps(
                self.pricing.min_utilization_multiplier_bps,
                BPS_SCALE,
                u64::from(util),
                u64::from(target),
            )
        } else {
            lerp_bps(
                BPS_SCALE,
                self.pricing.max_utilization_multiplier_bps,
                u64::from(util - target),
                u64::from(BPS_SCALE - target),
            )
        }
    }

    /// Non-decreasing in strictness: shorter commit latency and higher
    /// required uptime both add a premium on top of 1.0.
    pub fn sla_multiplier_bps(&self, sla: &Sla) -> u32 {
        let reference = self.pricing.reference_latency_secs.max(1);
        let shortfall = reference.saturating_sub(sla.max_latency.min(reference));
        let latency_premium = lerp_bps(0, self.pricing.latency_premium_bps, shortfall, reference);

        let uptime_premium = (u64::from(self.pricing.uptime_premium_bps)
            * u64::from(sla.uptime_bps())
            / u64::from(BPS_SCALE)) as u32;

        BPS_SCALE + latency_premium + uptime_premium
    }

    fn clamp_price(&self, price: U256) -> U256 {
        let price = match self.pricing.min_price {
            Some(min) => price.max(U256::from(min)),
            None => price,
        };
        match self.pricing.max_price {
            Some(max) => price.min(U256::from(max)),
            None => price,
        }
    }

    /// `base × utilization multiplier × sla multiplier`, within the configured bounds.
    pub fn quote(&self, job_class: &str, sla: &Sla, utilization_bps: u32) -> Result<U256> {
        let base = self.base_price(job_class)?;
        let util = U256::from(self.utilization_multiplier_bps(utilization_bps));
        let strictness = U256::from(self.sla_multiplier_bps(sla));
        let scale = U256::from(BPS_SCALE) * U256::from(BPS_SCALE);
        Ok(self.clamp_price(base * util * strictness / scale))
    }

    /// Advisory price for a class with no SLA premium applied.
    pub fn current_price(&self, job_class: &str, utilization_bps: u32) -> Result<U256> {
        let base = self.base_price(job_class)?;
        let util = U256::from(self.utilization_multiplier_bps(utilization_bps));
        Ok(self.clamp_price(base * util / U256::from(BPS_SCALE)))
    }

    /// Collateral a worker must lock to take a job: scales with the job's
    /// price and its SLA strictness, never below the configured floor.
    pub fn minimum_stake_for(&self, price: U256, sla: &Sla) -> U256 {
        let ratio = U256::from(self.stake.collateral_ratio_bps);
        let strictness = U256::from(self.sla_multiplier_bps(sla));
        let scale = U256::from(BPS_SCALE) * U256::from(BPS_SCALE);
        let scaled = price.saturating_mul(ratio).saturating_mul(strictness) / scale;
        scaled.max(U256::from(self.stake.min_stake))
    }
}
