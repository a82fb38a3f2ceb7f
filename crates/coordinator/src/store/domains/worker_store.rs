use alloy::primitives::Address;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use shared::models::{PerformanceStats, Worker, WorkerStatus};

use crate::error::{CoordinatorError, Result};

/// Registered workers. Records are never deleted; suspended and slashed
/// workers stay for audit.
#[derive(Default)]
pub struct WorkerStore {
    workers: DashMap<Address, Worker>,
}

impl WorkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, worker: Worker) -> Result<()> {
        match self.workers.entry(worker.address) {
            Entry::Occupied(_) => Err(CoordinatorError::InvalidSpec(format!(
                "worker {} is already registered",
                worker.address
            ))),
            Entry::Vacant(slot) => {
                slot.insert(worker);
                Ok(())
            }
        }
    }

    pub fn get(&self, address: &Address) -> Option<Worker> {
        self.workers.get(address).map(|w| w.clone())
    }

    /// Returns the previous status.
    pub fn set_status(&self, address: &Address, status: WorkerStatus) -> Result<WorkerStatus> {
        let mut worker = self
            .workers
            .get_mut(address)
            .ok_or_else(|| CoordinatorError::NotFound(format!("worker {address}")))?;
        let old = worker.status;
        worker.status = status;
        Ok(old)
    }

    pub fn record_performance<F>(&self, address: &Address, apply: F) -> Result<PerformanceStats>
    where
        F: FnOnce(&mut PerformanceStats),
    {
        let mut worker = self
            .workers
            .get_mut(address)
            .ok_or_else(|| CoordinatorError::NotFound(format!("worker {address}")))?;
        apply(&mut worker.performance);
        Ok(worker.performance.clone())
    }

    pub fn active_count(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Active)
            .count()
    }

    pub fn all(&self) -> Vec<Worker> {
        let mut workers: Vec<Worker> = self.workers.iter().map(|w| w.value().clone()).collect();
        workers.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.address.cmp(&b.address))
        });
        workers
    }

    pub fn active(&self) -> Vec<Worker> {
        self.all()
            .into_iter()
            .filter(|w| w.status == WorkerStatus::Active)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
