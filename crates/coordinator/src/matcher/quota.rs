use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::info;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::config::{QuotaConfig, BPS_SCALE};

/// Per-epoch assignment quota. A worker whose usage reaches
/// `max_quota_bps` is skipped until the epoch rolls over.
pub struct EpochQuota {
    config: QuotaConfig,
    epoch_started: AtomicI64,
    used: DashMap<Address, u32>,
}

impl EpochQuota {
    pub fn new(config: QuotaConfig, now: DateTime<Utc>) -> Self {
        Self {
            config,
            epoch_started: AtomicI64::new(now.timestamp()),
            used: DashMap::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.max_quota_bps.is_some()
    }

    pub fn used_bps(&self, worker: &Address) -> u32 {
        self.used.get(worker).map(|u| *u).unwrap_or(0)
    }

    pub fn has_room(&self, worker: &Address) -> bool {
        match self.config.max_quota_bps {
            Some(max) => self.used_bps(worker) < max,
            None => true,
        }
    }

    /// Charges one assignment, sized as a share of the active worker set.
    pub fn charge(&self, worker: Address, active_workers: usize) -> u32 {
        let share = (BPS_SCALE as usize / active_workers.max(1)).max(1) as u32;
        let mut used = self.used.entry(worker).or_insert(0);
        *used = used.saturating_add(share);
        *used
    }

    /// Starts a new epoch when the current one has run its length.
    pub fn roll(&self, now: DateTime<Utc>) -> bool {
        let started = self.epoch_started.load(Ordering::Acquire);
        let length = i64::try_from(self.config.epoch_secs).unwrap_or(i64::MAX);
        if now.timestamp().saturating_sub(started) < length {
            return false;
        }
        if self
            .epoch_started
            .compare_exchange(started, now.timestamp(), Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.used.clear();
        info!("Quota epoch rolled over at {now}");
        true
    }

    pub fn reset(&self, now: DateTime<Utc>) {
        self.epoch_started.store(now.timestamp(), Ordering::Release);
        self.used.clear();
    }

    pub fn epoch_started(&self) -> i64 {
        self.epoch_started.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn quota(max: Option<u32>) -> EpochQuota {
        EpochQuota::new(
            QuotaConfig {
                epoch_secs: 60,
                max_quota_bps: max,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_worker_runs_out_of_quota() {
        let quota = quota(Some(1_500));
        let worker = Address::repeat_byte(7);

        // ten active workers: each assignment costs 10%
        assert_eq!(quota.charge(worker, 10), 1_000);
        assert!(quota.has_room(&worker));
        assert_eq!(quota.charge(worker, 10), 2_000);
        assert!(!quota.has_room(&worker));
        assert!(quota.has_room(&Address::repeat_byte(8)));
    }

    #[test]
    fn test_disabled_quota_never_blocks() {
        let quota = quota(None);
        let worker = Address::repeat_byte(7);
        for _ in 0..5 {
            quota.charge(worker, 1);
        }
        assert!(!quota.enabled());
        assert!(quota.has_room(&worker));
    }

    #[test]
    fn test_roll_clears_usage_once_per_epoch() {
        let quota = quota(Some(1_000));
        let worker = Address::repeat_byte(7);
        let start = quota.epoch_started();
        quota.charge(worker, 1);
        assert!(!quota.has_room(&worker));

        let early = DateTime::from_timestamp(start + 30, 0).unwrap();
        assert!(!quota.roll(early));
        assert!(!quota.has_room(&worker));

        let later = DateTime::from_timestamp(start + 61, 0).unwrap();
        assert!(quota.roll(later));
        assert!(quota.has_room(&worker));
        assert!(!quota.roll(later + Duration::seconds(1)));
    }

    #[test]
    fn test_charge_with_huge_worker_set_costs_at_least_one() {
        let quota = quota(Some(1));
        let worker = Address::repeat_byte(7);
        assert_eq!(quota.charge(worker, 50_000), 1);
        assert!(!quota.has_room(&worker));

        quota.reset(Utc::now());
        assert_eq!(quota.used_bps(&worker), 0);
    }
}
