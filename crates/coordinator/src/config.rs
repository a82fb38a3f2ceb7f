use serde::{Deserialize, Serialize};
use shared::models::job::DEFAULT_JOB_CLASS;
use shared::models::ViolationKind;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{CoordinatorError, Result};

pub const BPS_SCALE: u32 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PricingConfig {
    /// Base price per job class in the smallest protocol unit.
    pub base_prices: BTreeMap<String, u128>,
    pub default_class: String,
    pub target_utilization_bps: u32,
    pub min_utilization_multiplier_bps: u32,
    pub max_utilization_multiplier_bps: u32,
    /// Jobs asking for a commit latency below this pay a latency premium.
    pub reference_latency_secs: u64,
    pub latency_premium_bps: u32,
    pub uptime_premium_bps: u32,
    /// Floor and ceiling applied to every quoted price.
    pub min_price: Option<u128>,
    pub max_price: Option<u128>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let base_prices = BTreeMap::from([
            ("standard".to_string(), 1_000_000_000_000_000),
            ("premium".to_string(), 1_500_000_000_000_000),
            ("enterprise".to_string(), 2_000_000_000_000_000),
        ]);
        Self {
            base_prices,
            default_class: DEFAULT_JOB_CLASS.to_string(),
            target_utilization_bps: 7_000,
            min_utilization_multiplier_bps: 8_000,
            max_utilization_multiplier_bps: 30_000,
            reference_latency_secs: 3_600,
            latency_premium_bps: 5_000,
            uptime_premium_bps: 5_000,
            min_price: None,
            max_price: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StakeConfig {
    /// Collateral a worker must lock, relative to the job price, before SLA scaling.
    pub collateral_ratio_bps: u32,
    pub min_stake: u128,
}

impl Default for StakeConfig {
    fn default() -> Self {
        Self {
            collateral_ratio_bps: 10_000,
            min_stake: 0,
        }
    }
}

/// Who bears the cost of an SLA violation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    WorkerLiable,
    NoFault,
    #[default]
    ByViolationKind,
}

impl FaultPolicy {
    pub fn worker_at_fault(&self, kind: ViolationKind) -> bool {
        match self {
            FaultPolicy::WorkerLiable => true,
            FaultPolicy::NoFault => false,
            FaultPolicy::ByViolationKind => !matches!(kind, ViolationKind::ValidationTimeout),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SlashingConfig {
    /// Share of the locked stake burned when the verifier rejects a commit.
    pub validation_slash_bps: u32,
    /// Share burned when an at-fault SLA violation exhausts the retries.
    pub sla_slash_bps: u32,
    /// Share burned when an at-fault SLA violation still leaves retries.
    pub retry_slash_bps: u32,
    pub fault_policy: FaultPolicy,
}

impl Default for SlashingConfig {
    fn default() -> Self {
        Self {
            validation_slash_bps: 10_000,
            sla_slash_bps: 1_000,
            retry_slash_bps: 500,
            fault_policy: FaultPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReputationConfig {
    pub min: f64,
    pub max: f64,
    pub neutral: f64,
    pub learning_rate: f64,
    pub completed_value: f64,
    pub failed_value: f64,
    pub slashed_value: f64,
    /// Workers whose score drops below this are suspended.
    pub suspension_floor: Option<f64>,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            neutral: 0.5,
            learning_rate: 0.1,
            completed_value: 1.0,
            failed_value: 0.2,
            slashed_value: 0.0,
            suspension_floor: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SlaConfig {
    pub heartbeat_interval_secs: u64,
    /// Heartbeat intervals that must pass before uptime is judged.
    pub uptime_grace_intervals: u32,
    pub validation_timeout_secs: u64,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            uptime_grace_intervals: 3,
            validation_timeout_secs: 900,
        }
    }
}

/// Caps how much of the network's assignments one worker may take per epoch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuotaConfig {
    pub epoch_secs: u64,
    /// Quota a worker may use per epoch, in basis points. Each assignment
    /// charges `10000 / active workers`. Unset disables the cap.
    pub max_quota_bps: Option<u32>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            epoch_secs: 3_600,
            max_quota_bps: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub pricing: PricingConfig,
    pub stake: StakeConfig,
    pub slashing: SlashingConfig,
    pub reputation: ReputationConfig,
    pub sla: SlaConfig,
    pub quota: QuotaConfig,
}

impl CoordinatorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: CoordinatorConfig =
            toml::from_str(raw).map_err(|e| CoordinatorError::InvalidSpec(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoordinatorError::InvalidSpec(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(CoordinatorError::InvalidSpec(msg));

        let pricing = &self.pricing;
        if !pricing.base_prices.contains_key(&pricing.default_class) {
            return invalid(format!(
                "pricing.default_class {} has no base price",
                pricing.default_class
            ));
        }
        if pricing.target_utilization_bps == 0 || pricing.target_utilization_bps > BPS_SCALE {
            return invalid("pricing.target_utilization_bps must be within (0, 10000]".to_string());
        }
        if pricing.min_utilization_multiplier_bps > BPS_SCALE
            || pricing.max_utilization_multiplier_bps < BPS_SCALE
        {
            return invalid(
                "utilization multipliers must satisfy min <= 10000 <= max".to_string(),
            );
        }
        if pricing.reference_latency_secs == 0 {
            return invalid("pricing.reference_latency_secs must be positive".to_string());
        }
        if let (Some(min), Some(max)) = (pricing.min_price, pricing.max_price) {
            if min > max {
                return invalid("pricing.min_price must not exceed pricing.max_price".to_string());
            }
        }

        let slashing = &self.slashing;
        for (name, bps) in [
            ("validation_slash_bps", slashing.validation_slash_bps),
            ("sla_slash_bps", slashing.sla_slash_bps),
            ("retry_slash_bps", slashing.retry_slash_bps),
        ] {
            if bps > BPS_SCALE {
                return invalid(format!("slashing.{name} must not exceed 10000"));
            }
        }

        let rep = &self.reputation;
        if rep.min.partial_cmp(&rep.max) != Some(Ordering::Less) {
            return invalid("reputation.min must be below reputation.max".to_string());
        }
        for (name, value) in [
            ("neutral", rep.neutral),
            ("completed_value", rep.completed_value),
            ("failed_value", rep.failed_value),
            ("slashed_value", rep.slashed_value),
        ] {
            if !(rep.min..=rep.max).contains(&value) {
                return invalid(format!("reputation.{name} must lie within [min, max]"));
            }
        }
        if !(rep.learning_rate.is_finite() && rep.learning_rate > 0.0 && rep.learning_rate <= 1.0) {
            return invalid("reputation.learning_rate must be within (0, 1]".to_string());
        }

        if self.sla.heartbeat_interval_secs == 0 {
            return invalid("sla.heartbeat_interval_secs must be positive".to_string());
        }

        if self.quota.epoch_secs == 0 {
            return invalid("quota.epoch_secs must be positive".to_string());
        }
        if self.quota.max_quota_bps == Some(0) {
            return invalid("quota.max_quota_bps must be positive when set".to_string());
        }
        Ok(())
    }
}
