use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::amount;
use crate::models::job::JobSpecs;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GpuSpec {
    pub model: String,
    /// Per-card memory in GB.
    pub vram: u32,
    pub count: u32,
}

impl fmt::Display for GpuSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x {} ({} GB)", self.count, self.model, self.vram)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WorkerSpecs {
    pub gpus: Vec<GpuSpec>,
    #[serde(default)]
    pub cpu_cores: u32,
    /// GB
    #[serde(default)]
    pub ram: u32,
    /// GB
    #[serde(default)]
    pub storage: u32,
    /// Mbps
    #[serde(default)]
    pub bandwidth: u32,
    #[serde(default)]
    pub region: String,
}

impl WorkerSpecs {
    pub fn validate(&self) -> Result<(), String> {
        if self.gpus.is_empty() {
            return Err("worker must advertise at least one gpu".to_string());
        }
        for gpu in &self.gpus {
            if gpu.model.trim().is_empty() {
                return Err("gpu model must not be blank".to_string());
            }
            if gpu.vram == 0 || gpu.count == 0 {
                return Err(format!("gpu entry {gpu} must have positive vram and count"));
            }
        }
        Ok(())
    }

    /// Number of jobs the worker can run side by side: one per card.
    pub fn capacity(&self) -> usize {
        let cards: u64 = self.gpus.iter().map(|g| u64::from(g.count)).sum();
        usize::try_from(cards).unwrap_or(usize::MAX).max(1)
    }

    /// Cards able to run a job of `specs` on their own.
    pub fn cards_for(&self, specs: &JobSpecs) -> usize {
        let cards: u64 = self
            .gpus
            .iter()
            .filter(|g| g.model.eq_ignore_ascii_case(&specs.gpu) && g.vram >= specs.vram)
            .map(|g| u64::from(g.count))
            .sum();
        usize::try_from(cards).unwrap_or(usize::MAX)
    }

    pub fn has_gpu(&self, model: &str, min_vram: u32) -> bool {
        self.gpus
            .iter()
            .any(|g| g.model.eq_ignore_ascii_case(model) && g.vram >= min_vram && g.count > 0)
    }

    /// Hardware and region check only; status and stake are judged elsewhere.
    pub fn satisfies(&self, specs: &JobSpecs) -> bool {
        if !self.has_gpu(&specs.gpu, specs.vram) {
            return false;
        }
        match &specs.region {
            Some(region) => self.region.eq_ignore_ascii_case(region),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
    Slashed,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerStatus::Active => "active",
            WorkerStatus::Inactive => "inactive",
            WorkerStatus::Suspended => "suspended",
            WorkerStatus::Slashed => "slashed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for WorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(WorkerStatus::Active),
            "inactive" => Ok(WorkerStatus::Inactive),
            "suspended" => Ok(WorkerStatus::Suspended),
            "slashed" => Ok(WorkerStatus::Slashed),
            other => Err(format!("unknown worker status: {other}")),
        }
    }
}

/// Running record of how a worker's assignments ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PerformanceStats {
    pub total_jobs: u64,
    pub successful_jobs: u64,
    pub failed_jobs: u64,
    /// Mean heartbeat uptime over finished executions, 0.0 to 1.0.
    pub uptime: f64,
    pub uptime_samples: u64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl PerformanceStats {
    pub fn record_job(&mut self, succeeded: bool, at: DateTime<Utc>) {
        self.total_jobs += 1;
        if succeeded {
            self.successful_jobs += 1;
        } else {
            self.failed_jobs += 1;
        }
        self.last_updated = Some(at);
    }

    /// Folds one execution's uptime (in basis points) into the mean.
    pub fn record_uptime(&mut self, ratio_bps: u32, at: DateTime<Utc>) {
        let ratio = (f64::from(ratio_bps) / 10_000.0).clamp(0.0, 1.0);
        self.uptime_samples += 1;
        self.uptime += (ratio - self.uptime) / self.uptime_samples as f64;
        self.last_updated = Some(at);
    }

    pub fn success_rate(&self) -> Option<f64> {
        (self.total_jobs > 0).then(|| self.successful_jobs as f64 / self.total_jobs as f64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    pub address: Address,
    pub specs: WorkerSpecs,
    pub reputation: f64,
    /// Total bonded stake, as held by the stake ledger.
    #[serde(with = "amount")]
    pub stake: U256,
    /// Lowest price the worker accepts for a job; `None` takes any quoted price.
    #[serde(default, with = "amount::option")]
    pub ask_price: Option<U256>,
    pub status: WorkerStatus,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub performance: PerformanceStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub specs: WorkerSpecs,
    #[serde(with = "amount")]
    pub stake: U256,
    #[serde(default, with = "amount::option")]
    pub ask_price: Option<U256>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakeRequest {
    #[serde(with = "amount")]
    pub amount: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatusUpdate {
    pub status: WorkerStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkerFilter {
    #[serde(default)]
    pub status: Option<WorkerStatus>,
    #[serde(default)]
    pub gpu: Option<String>,
    #[serde(default)]
    pub min_vram: Option<u32>,
    #[serde(default)]
    pub region: Option<String>,
}

impl WorkerFilter {
    pub fn matches(&self, worker: &Worker) -> bool {
        if let Some(status) = self.status {
            if worker.status != status {
                return false;
            }
        }
        match (&self.gpu, self.min_vram) {
            (Some(model), vram) => {
                if !worker.specs.has_gpu(model, vram.unwrap_or(0)) {
                    return false;
                }
            }
            (None, Some(vram)) => {
                if !worker.specs.gpus.iter().any(|g| g.vram >= vram) {
                    return false;
                }
            }
            (None, None) => {}
        }
        if let Some(region) = &self.region {
            if !worker.specs.region.eq_ignore_ascii_case(region) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a100_specs() -> WorkerSpecs {
        WorkerSpecs {
            gpus: vec![
                GpuSpec {
                    model: "A100".to_string(),
                    vram: 80,
                    count: 2,
                },
                GpuSpec {
                    model: "RTX4090".to_string(),
                    vram: 24,
                    count: 1,
                },
            ],
            cpu_cores: 64,
            ram: 512,
            storage: 4000,
            bandwidth: 10_000,
            region: "eu-west".to_string(),
        }
    }

    #[test]
    fn test_capacity_counts_cards() {
        assert_eq!(a100_specs().capacity(), 3);
        assert_eq!(WorkerSpecs::default().capacity(), 1);
    }

    #[test]
    fn test_cards_for_counts_only_suitable_cards() {
        let specs = a100_specs();
        let mut job = JobSpecs {
            gpu: "a100".to_string(),
            vram: 40,
            ..Default::default()
        };
        assert_eq!(specs.cards_for(&job), 2);
        job.vram = 96;
        assert_eq!(specs.cards_for(&job), 0);
        job.gpu = "RTX4090".to_string();
        job.vram = 24;
        assert_eq!(specs.cards_for(&job), 1);
    }

    #[test]
    fn test_satisfies_checks_model_vram_and_region() {
        let specs = a100_specs();
        let mut job = JobSpecs {
            gpu: "a100".to_string(),
            vram: 40,
            ..Default::default()
        };
        assert!(specs.satisfies(&job));

        job.vram = 96;
        assert!(!specs.satisfies(&job));

        job.vram = 40;
        job.region = Some("us-east".to_string());
        assert!(!specs.satisfies(&job));

        job.region = Some("EU-WEST".to_string());
        assert!(specs.satisfies(&job));
    }

    #[test]
    fn test_performance_stats_track_outcomes_and_mean_uptime() {
        let mut stats = PerformanceStats::default();
        assert_eq!(stats.success_rate(), None);
        let now = Utc::now();

        stats.record_job(true, now);
        stats.record_job(false, now);
        stats.record_job(true, now);
        assert_eq!(stats.total_jobs, 3);
        assert_eq!(stats.failed_jobs, 1);
        assert!((stats.success_rate().unwrap() - 2.0 / 3.0).abs() < 1e-9);

        stats.record_uptime(10_000, now);
        stats.record_uptime(5_000, now);
        assert!((stats.uptime - 0.75).abs() < 1e-9);
        assert_eq!(stats.uptime_samples, 2);
        assert_eq!(stats.last_updated, Some(now));
    }

    #[test]
    fn test_validate_rejects_empty_gpu_list() {
        assert!(WorkerSpecs::default().validate().is_err());
        assert!(a100_specs().validate().is_ok());
    }

    #[test]
    fn test_filter_matches() {
        let worker = Worker {
            address: Address::ZERO,
            specs: a100_specs(),
            reputation: 0.5,
            stake: U256::from(10),
            ask_price: None,
            status: WorkerStatus::Active,
            registered_at: Utc::now(),
            performance: PerformanceStats::default(),
        };
        assert!(WorkerFilter::default().matches(&worker));
        assert!(WorkerFilter {
            gpu: Some("A100".to_string()),
            min_vram: Some(80),
            ..Default::default()
        }
        .matches(&worker));
        assert!(!WorkerFilter {
            min_vram: Some(100),
            ..Default::default()
        }
        .matches(&worker));
        assert!(!WorkerFilter {
            status: Some(WorkerStatus::Suspended),
            ..Default::default()
        }
        .matches(&worker));
    }
}
