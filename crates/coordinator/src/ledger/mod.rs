use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use log::{debug, error};
use serde::Serialize;
use shared::models::{amount, JobSpecs, WorkerSpecs};
use std::collections::HashMap;

use crate::config::BPS_SCALE;
use crate::error::{CoordinatorError, Result};

/// Card slots a job would occupy on a worker.
///
/// A job of GPU model `gpu` may run only while fewer in-flight jobs of that
/// model than `matching_cards` hold a lock, and the worker as a whole stays
/// below `total_cards`. Busy cards of the same model count against the job
/// whatever their memory size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotClaim {
    pub gpu: String,
    pub matching_cards: usize,
    pub total_cards: usize,
}

impl SlotClaim {
    pub fn new(worker: &WorkerSpecs, job: &JobSpecs) -> Self {
        Self {
            gpu: job.gpu.to_ascii_lowercase(),
            matching_cards: worker.cards_for(job),
            total_cards: worker.capacity(),
        }
    }
}

#[derive(Debug, Clone)]
struct StakeLock {
    amount: U256,
    /// Lowercased GPU model the job runs on.
    gpu: String,
}

#[derive(Debug, Clone, Default)]
struct StakeRecord {
    total: U256,
    locked: U256,
    /// job id -> stake reserved for it
    locks: HashMap<String, StakeLock>,
}

impl StakeRecord {
    fn available(&self) -> U256 {
        self.total.saturating_sub(self.locked)
    }

    /// Why `claim` does not fit next to the current locks, if it does not.
    fn slot_conflict(&self, claim: &SlotClaim) -> Option<String> {
        if self.locks.len() >= claim.total_cards {
            return Some(format!(
                "running {} jobs, capacity {}",
                self.locks.len(),
                claim.total_cards
            ));
        }
        let busy = self.locks.values().filter(|l| l.gpu == claim.gpu).count();
        if busy >= claim.matching_cards {
            return Some(format!(
                "all {} suitable {} cards are busy",
                claim.matching_cards, claim.gpu
            ));
        }
        None
    }

    fn check_invariant(&self, worker: &Address) {
        let sum = self
            .locks
            .values()
            .fold(U256::ZERO, |acc, l| acc.saturating_add(l.amount));
        let consistent = self.locked <= self.total && sum == self.locked;
        if !consistent {
            error!(
                "stake ledger invariant broken for {worker}: total={} locked={} sum(locks)={sum}",
                self.total, self.locked
            );
        }
        debug_assert!(consistent, "stake ledger invariant broken for {worker}");
    }
}

/// Read-only view of a worker's stake.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StakeSnapshot {
    #[serde(with = "amount")]
    pub total: U256,
    #[serde(with = "amount")]
    pub locked: U256,
    #[serde(with = "amount")]
    pub available: U256,
    pub open_locks: usize,
}

/// Per-worker stake accounting.
///
/// Every mutation runs under the worker's map entry, so two operations on the
/// same worker serialize and the loser sees the winner's post-state.
#[derive(Default)]
pub struct StakeLedger {
    records: DashMap<Address, StakeRecord>,
    earnings: DashMap<Address, U256>,
}

impl StakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_account(&self, worker: Address, initial: U256) -> Result<()> {
        match self.records.entry(worker) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(CoordinatorError::InvalidSpec(
                format!("stake account for {worker} already exists"),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(StakeRecord {
                    total: initial,
                    ..Default::default()
                });
                Ok(())
            }
        }
    }

    pub fn deposit(&self, worker: Address, amount: U256) -> Result<U256> {
        if amount.is_zero() {
            return Err(CoordinatorError::InvalidSpec(
                "deposit amount must be positive".to_string(),
            ));
        }
        let mut record = self
            .records
            .get_mut(&worker)
            .ok_or_else(|| CoordinatorError::NotFound(format!("worker {worker}")))?;
        record.total = record.total.checked_add(amount).ok_or_else(|| {
            CoordinatorError::InvalidSpec("deposit overflows stake total".to_string())
        })?;
        record.check_invariant(&worker);
        debug!("deposit {amount} for {worker}, total {}", record.total);
        Ok(record.total)
    }

    /// Reserves `amount` for `job_id`. Fails without touching the record when
    /// the worker has no free slot for `claim` or lacks available stake.
    pub fn lock(&self, worker: Address, job_id: &str, amount: U256, claim: &SlotClaim) -> Result<()> {
        let mut record = self
            .records
            .get_mut(&worker)
            .ok_or_else(|| CoordinatorError::NotFound(format!("worker {worker}")))?;
        if record.locks.contains_key(job_id) {
            return Err(CoordinatorError::WorkerUnavailable(format!(
                "{worker} already holds a lock for {job_id}"
            )));
        }
        if let Some(conflict) = record.slot_conflict(claim) {
            return Err(CoordinatorError::WorkerUnavailable(format!("{worker} is {conflict}")));
        }
        let available = record.available();
        if available < amount {
            return Err(CoordinatorError::InsufficientStake {
                worker,
                required: amount,
                available,
            });
        }
        record.locked += amount;
        record.locks.insert(
            job_id.to_string(),
            StakeLock {
                amount,
                gpu: claim.gpu.clone(),
            },
        );
        record.check_invariant(&worker);
        debug!("locked {amount} of {worker} for {job_id}");
        Ok(())
    }

    /// Returns the released amount; releasing an unknown lock is a no-op.
    pub fn release(&self, worker: Address, job_id: &str) -> Result<U256> {
        let mut record = self
            .records
            .get_mut(&worker)
            .ok_or_else(|| CoordinatorError::NotFound(format!("worker {worker}")))?;
        let amount = record
            .locks
            .remove(job_id)
            .map(|l| l.amount)
            .unwrap_or(U256::ZERO);
        record.locked = record.locked.saturating_sub(amount);
        record.check_invariant(&worker);
        debug!("released {amount} of {worker} from {job_id}");
        Ok(amount)
    }

    /// Burns `fraction_bps / 10000` of the amount locked for `job_id` and
    /// returns the rest to available. Returns the burned amount.
    pub fn slash(&self, worker: Address, job_id: &str, fraction_bps: u32) -> Result<U256> {
        if fraction_bps == 0 || fraction_bps > BPS_SCALE {
            return Err(CoordinatorError::InvalidSpec(format!(
                "slash fraction {fraction_bps} bps outside (0, 10000]"
            )));
        }
        let mut record = self
            .records
            .get_mut(&worker)
            .ok_or_else(|| CoordinatorError::NotFound(format!("worker {worker}")))?;
        let Some(locked) = record.locks.get(job_id).map(|l| l.amount) else {
            return Err(CoordinatorError::NotFound(format!(
                "stake lock of {worker} for {job_id}"
            )));
        };
        let slashed = locked
            .checked_mul(U256::from(fraction_bps))
            .ok_or_else(|| {
                CoordinatorError::InvalidSpec(format!(
                    "slashing {fraction_bps} bps of {locked} overflows"
                ))
            })?
            / U256::from(BPS_SCALE);
        record.locks.remove(job_id);
        record.locked = record.locked.saturating_sub(locked);
        record.total = record.total.saturating_sub(slashed);
        record.check_invariant(&worker);
        debug!("slashed {slashed} of {locked} locked by {worker} for {job_id}");
        Ok(slashed)
    }

    pub fn withdraw(&self, worker: Address, amount: U256) -> Result<U256> {
        if amount.is_zero() {
            return Err(CoordinatorError::InvalidSpec(
                "withdraw amount must be positive".to_string(),
            ));
        }
        let mut record = self
            .records
            .get_mut(&worker)
            .ok_or_else(|| CoordinatorError::NotFound(format!("worker {worker}")))?;
        let available = record.available();
        if amount > available {
            return Err(CoordinatorError::InsufficientStake {
                worker,
                required: amount,
                available,
            });
        }
        record.total -= amount;
        record.check_invariant(&worker);
        Ok(record.total)
    }

    /// Credits a completed job's payment to the worker.
    pub fn credit(&self, worker: Address, amount: U256) {
        let mut entry = self.earnings.entry(worker).or_insert(U256::ZERO);
        *entry = entry.saturating_add(amount);
    }

    pub fn earnings(&self, worker: &Address) -> U256 {
        self.earnings.get(worker).map(|e| *e).unwrap_or(U256::ZERO)
    }

    pub fn available(&self, worker: &Address) -> U256 {
        self.records
            .get(worker)
            .map(|r| r.available())
            .unwrap_or(U256::ZERO)
    }

    pub fn open_locks(&self, worker: &Address) -> usize {
        self.records.get(worker).map(|r| r.locks.len()).unwrap_or(0)
    }

    pub fn has_slot(&self, worker: &Address, claim: &SlotClaim) -> bool {
        self.records
            .get(worker)
            .is_some_and(|r| r.slot_conflict(claim).is_none())
    }

    pub fn snapshot(&self, worker: &Address) -> Option<StakeSnapshot> {
        self.records.get(worker).map(|r| StakeSnapshot {
            total: r.total,
            locked: r.locked,
            available: r.available(),
            open_locks: r.locks.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn worker(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn slots(n: usize) -> SlotClaim {
        SlotClaim {
            gpu: "a100".to_string(),
            matching_cards: n,
            total_cards: n,
        }
    }

    #[test]
    fn test_lock_release_round_trip() {
        let ledger = StakeLedger::new();
        ledger.open_account(worker(1), U256::from(100)).unwrap();

        ledger.lock(worker(1), "job-a", U256::from(60), &slots(4)).unwrap();
        let snap = ledger.snapshot(&worker(1)).unwrap();
        assert_eq!(snap.locked, U256::from(60));
        assert_eq!(snap.available, U256::from(40));

        assert_eq!(ledger.release(worker(1), "job-a").unwrap(), U256::from(60));
        let snap = ledger.snapshot(&worker(1)).unwrap();
        assert_eq!(snap.locked, U256::ZERO);
        assert_eq!(snap.total, U256::from(100));
    }

    #[test]
    fn test_lock_rejects_when_available_is_short() {
        let ledger = StakeLedger::new();
        ledger.open_account(worker(1), U256::from(50)).unwrap();
        ledger.lock(worker(1), "job-a", U256::from(30), &slots(4)).unwrap();

        let err = ledger.lock(worker(1), "job-b", U256::from(30), &slots(4)).unwrap_err();
        assert!(matches!(err, CoordinatorError::InsufficientStake { .. }));
        // the failed lock leaves no trace
        assert_eq!(ledger.open_locks(&worker(1)), 1);
        assert_eq!(ledger.available(&worker(1)), U256::from(20));
    }

    #[test]
    fn test_lock_respects_capacity() {
        let ledger = StakeLedger::new();
        ledger.open_account(worker(1), U256::from(100)).unwrap();
        ledger.lock(worker(1), "job-a", U256::ZERO, &slots(1)).unwrap();
        let err = ledger.lock(worker(1), "job-b", U256::ZERO, &slots(1)).unwrap_err();
        assert!(matches!(err, CoordinatorError::WorkerUnavailable(_)));
    }

    #[test]
    fn test_slash_burns_fraction_and_frees_remainder() {
        let ledger = StakeLedger::new();
        ledger.open_account(worker(1), U256::from(1_000)).unwrap();
        ledger.lock(worker(1), "job-a", U256::from(400), &slots(4)).unwrap();

        let burned = ledger.slash(worker(1), "job-a", 2_500).unwrap();
        assert_eq!(burned, U256::from(100));
        let snap = ledger.snapshot(&worker(1)).unwrap();
        assert_eq!(snap.total, U256::from(900));
        assert_eq!(snap.locked, U256::ZERO);
        assert_eq!(snap.available, U256::from(900));
    }

    #[test]
    fn test_lock_counts_cards_per_model() {
        let ledger = StakeLedger::new();
        ledger.open_account(worker(1), U256::from(100)).unwrap();
        let a100 = SlotClaim {
            gpu: "a100".to_string(),
            matching_cards: 1,
            total_cards: 2,
        };
        let rtx = SlotClaim {
            gpu: "rtx4090".to_string(),
            matching_cards: 1,
            total_cards: 2,
        };

        ledger.lock(worker(1), "job-a", U256::ZERO, &a100).unwrap();
        assert!(!ledger.has_slot(&worker(1), &a100));
        let err = ledger.lock(worker(1), "job-b", U256::ZERO, &a100).unwrap_err();
        assert!(matches!(err, CoordinatorError::WorkerUnavailable(_)));

        assert!(ledger.has_slot(&worker(1), &rtx));
        ledger.lock(worker(1), "job-c", U256::ZERO, &rtx).unwrap();
        assert!(!ledger.has_slot(&worker(1), &rtx));
    }

    #[test]
    fn test_slash_overflow_keeps_lock() {
        let ledger = StakeLedger::new();
        ledger.open_account(worker(1), U256::MAX).unwrap();
        ledger.lock(worker(1), "job-a", U256::MAX, &slots(1)).unwrap();

        let err = ledger.slash(worker(1), "job-a", 5_000).unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidSpec(_)));
        let snap = ledger.snapshot(&worker(1)).unwrap();
        assert_eq!(snap.locked, U256::MAX);
        assert_eq!(snap.open_locks, 1);
    }

    #[test]
    fn test_slash_rejects_zero_or_oversized_fraction() {
        let ledger = StakeLedger::new();
        ledger.open_account(worker(1), U256::from(10)).unwrap();
        ledger.lock(worker(1), "job-a", U256::from(10), &slots(4)).unwrap();
        assert!(ledger.slash(worker(1), "job-a", 0).is_err());
        assert!(ledger.slash(worker(1), "job-a", 10_001).is_err());
        // still locked after the rejected attempts
        assert_eq!(ledger.snapshot(&worker(1)).unwrap().locked, U256::from(10));
    }

    #[test]
    fn test_withdraw_cannot_touch_locked_stake() {
        let ledger = StakeLedger::new();
        ledger.open_account(worker(1), U256::from(100)).unwrap();
        ledger.lock(worker(1), "job-a", U256::from(70), &slots(4)).unwrap();
        assert!(matches!(
            ledger.withdraw(worker(1), U256::from(31)),
            Err(CoordinatorError::InsufficientStake { .. })
        ));
        assert_eq!(ledger.withdraw(worker(1), U256::from(30)).unwrap(), U256::from(70));
    }

    #[test]
    fn test_concurrent_locks_never_exceed_total() {
        let ledger = Arc::new(StakeLedger::new());
        ledger.open_account(worker(9), U256::from(100)).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    ledger
                        .lock(worker(9), &format!("job-{i}"), U256::from(30), &slots(64))
                        .is_ok()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(wins, 3);
        let snap = ledger.snapshot(&worker(9)).unwrap();
        assert!(snap.locked <= snap.total);
        assert_eq!(snap.locked, U256::from(90));
    }

    #[test]
    fn test_earnings_accumulate() {
        let ledger = StakeLedger::new();
        ledger.credit(worker(3), U256::from(5));
        ledger.credit(worker(3), U256::from(7));
        assert_eq!(ledger.earnings(&worker(3)), U256::from(12));
        assert_eq!(ledger.earnings(&worker(4)), U256::ZERO);
    }
}
