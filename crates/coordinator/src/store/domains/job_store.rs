use alloy::primitives::Address;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use shared::models::{Job, JobStatus};

use crate::error::{CoordinatorError, Result};

/// Outcome of a guarded in-place update.
pub struct JobUpdate<T> {
    pub old_status: JobStatus,
    pub job: Job,
    pub output: T,
}

/// Live (not yet archived) jobs.
///
/// Each job sits behind its own map entry; `update` holds that entry for the
/// whole read-check-write so concurrent transitions on one job serialize.
#[derive(Default)]
pub struct JobStore {
    jobs: DashMap<String, Job>,
    /// (client, idempotency key) -> job id
    idempotency: DashMap<(Address, String), String>,
    /// Ids that left the live set for the archive.
    retired: DashSet<String>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) -> Result<()> {
        match self.jobs.entry(job.id.clone()) {
            Entry::Occupied(_) => Err(CoordinatorError::InvalidSpec(format!(
                "job id {} already in use",
                job.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(())
            }
        }
    }

    /// Inserts the job built by `create` unless `client` already has an open
    /// job under `key`, in which case that job is returned and `create` is not
    /// called. The bool is true when a new job was created.
    pub fn insert_idempotent<F>(&self, client: Address, key: String, create: F) -> Result<(Job, bool)>
    where
        F: FnOnce() -> Result<Job>,
    {
        match self.idempotency.entry((client, key)) {
            Entry::Occupied(mut slot) => {
                if let Some(existing) = self.get(slot.get()) {
                    if !existing.status.is_terminal() {
                        return Ok((existing, false));
                    }
                }
                let job = create()?;
                self.insert(job.clone())?;
                slot.insert(job.id.clone());
                Ok((job, true))
            }
            Entry::Vacant(slot) => {
                let job = create()?;
                self.insert(job.clone())?;
                slot.insert(job.id.clone());
                Ok((job, true))
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.jobs.get(id).map(|j| j.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jobs.contains_key(id)
    }

    /// True for live ids and for ids already handed to the archive.
    pub fn is_reserved(&self, id: &str) -> bool {
        self.contains(id) || self.retired.contains(id)
    }

    pub fn retire<I>(&self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        for id in ids {
            self.retired.insert(id);
        }
    }

    /// Runs `apply` on a copy of the job while holding its entry and writes
    /// the copy back only if `apply` succeeds. A failed update leaves the
    /// stored job untouched.
    pub fn update<F, T>(&self, id: &str, apply: F) -> Result<JobUpdate<T>>
    where
        F: FnOnce(&mut Job) -> Result<T>,
    {
        self.transition(id, apply, |_| {})
    }

    /// Like [`JobStore::update`], but `announce` sees the written job before
    /// the entry is released. Announcements for one job therefore come out
    /// in the order its writes happened.
    pub fn transition<F, A, T>(&self, id: &str, apply: F, announce: A) -> Result<JobUpdate<T>>
    where
        F: FnOnce(&mut Job) -> Result<T>,
        A: FnOnce(&JobUpdate<T>),
    {
        let mut entry = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| CoordinatorError::NotFound(format!("job {id}")))?;
        let old_status = entry.status;
        let mut draft = entry.clone();
        let output = apply(&mut draft)?;
        *entry = draft.clone();
        let update = JobUpdate {
            old_status,
            job: draft,
            output,
        };
        announce(&update);
        drop(entry);
        Ok(update)
    }

    /// Removes a terminal job to hand it to the archive. Its id stays reserved.
    pub fn remove_terminal(&self, id: &str) -> Result<Job> {
        let removed = self
            .jobs
            .remove_if(id, |_, job| job.status.is_terminal());
        match removed {
            Some((_, job)) => {
                self.retired.insert(job.id.clone());
                if let Some(key) = &job.idempotency_key {
                    self.idempotency
                        .remove_if(&(job.client, key.clone()), |_, v| *v == job.id);
                }
                Ok(job)
            }
            None => match self.jobs.get(id) {
                Some(job) => Err(CoordinatorError::invalid_transition(id, job.status, "archive")),
                None => Err(CoordinatorError::NotFound(format!("job {id}"))),
            },
        }
    }

    pub fn all(&self) -> Vec<Job> {
        self.jobs.iter().map(|j| j.value().clone()).collect()
    }

    /// Pending jobs, oldest submission first.
    pub fn pending_oldest_first(&self) -> Vec<Job> {
        let mut pending: Vec<Job> = self
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| j.value().clone())
            .collect();
        pending.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then_with(|| a.id.cmp(&b.id)));
        pending
    }

    pub fn count_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&Job) -> bool,
    {
        self.jobs.iter().filter(|j| predicate(j.value())).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use chrono::Duration;
    use shared::models::{JobRequest, JobSpecs};

    fn job(id: &str) -> Job {
        Job::new(
            id.to_string(),
            Address::repeat_byte(1),
            JobRequest {
                specs: JobSpecs {
                    gpu: "A100".to_string(),
                    vram: 40,
                    ..Default::default()
                },
                ..Default::default()
            },
            "standard".to_string(),
            U256::from(1),
        )
    }

    #[test]
    fn test_failed_update_does_not_mutate() {
        let store = JobStore::new();
        store.insert(job("job-1")).unwrap();

        let result: Result<JobUpdate<()>> = store.update("job-1", |j| {
            j.status = JobStatus::Assigned;
            Err(CoordinatorError::invalid_transition(&j.id, JobStatus::Pending, "assign"))
        });
        assert!(result.is_err());
        assert_eq!(store.get("job-1").unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn test_update_reports_old_status() {
        let store = JobStore::new();
        store.insert(job("job-1")).unwrap();
        let update = store
            .update("job-1", |j| {
                j.status = JobStatus::Failed;
                Ok(())
            })
            .unwrap();
        assert_eq!(update.old_status, JobStatus::Pending);
        assert_eq!(update.job.status, JobStatus::Failed);
    }

    #[test]
    fn test_announce_runs_only_after_a_successful_write() {
        let store = JobStore::new();
        store.insert(job("job-1")).unwrap();
        let mut seen = Vec::new();

        let _ = store.transition(
            "job-1",
            |j| -> Result<()> {
                Err(CoordinatorError::invalid_transition(&j.id, j.status, "assign"))
            },
            |u| seen.push(u.job.status),
        );
        store
            .transition(
                "job-1",
                |j| {
                    j.status = JobStatus::Assigned;
                    Ok(())
                },
                |u| seen.push(u.job.status),
            )
            .unwrap();
        assert_eq!(seen, vec![JobStatus::Assigned]);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = JobStore::new();
        store.insert(job("job-1")).unwrap();
        assert!(store.insert(job("job-1")).is_err());
    }

    #[test]
    fn test_idempotent_insert_returns_open_job() {
        let store = JobStore::new();
        let client = Address::repeat_byte(1);
        let (first, created) = store
            .insert_idempotent(client, "k".to_string(), || Ok(job("job-1")))
            .unwrap();
        assert!(created);
        let (second, created) = store
            .insert_idempotent(client, "k".to_string(), || Ok(job("job-2")))
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);

        store
            .update("job-1", |j| {
                j.status = JobStatus::Failed;
                Ok(())
            })
            .unwrap();
        let (third, created) = store
            .insert_idempotent(client, "k".to_string(), || Ok(job("job-3")))
            .unwrap();
        assert!(created);
        assert_eq!(third.id, "job-3");
    }

    #[test]
    fn test_pending_sorted_oldest_first() {
        let store = JobStore::new();
        let newer = job("job-new");
        let mut older = job("job-old");
        older.submitted_at = newer.submitted_at - Duration::seconds(30);
        store.insert(newer).unwrap();
        store.insert(older).unwrap();
        let ids: Vec<String> = store.pending_oldest_first().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["job-old".to_string(), "job-new".to_string()]);
    }

    #[test]
    fn test_remove_terminal_only() {
        let store = JobStore::new();
        store.insert(job("job-1")).unwrap();
        assert!(matches!(
            store.remove_terminal("job-1"),
            Err(CoordinatorError::InvalidTransition { .. })
        ));
        store
            .update("job-1", |j| {
                j.status = JobStatus::Completed;
                Ok(())
            })
            .unwrap();
        assert!(store.remove_terminal("job-1").is_ok());
        assert!(!store.contains("job-1"));
        assert!(store.is_reserved("job-1"));
        assert!(matches!(
            store.remove_terminal("job-1"),
            Err(CoordinatorError::NotFound(_))
        ));
    }
}
