use log::info;
use std::sync::Arc;

use crate::error::Result;
use crate::store::archive::{InMemoryArchive, JobArchive};
use crate::store::domains::job_store::JobStore;
use crate::store::domains::worker_store::WorkerStore;

pub struct StoreContext {
    pub job_store: Arc<JobStore>,
    pub worker_store: Arc<WorkerStore>,
    pub archive: Arc<dyn JobArchive>,
}

impl StoreContext {
    pub fn new(archive: Arc<dyn JobArchive>) -> Self {
        Self {
            job_store: Arc::new(JobStore::new()),
            worker_store: Arc::new(WorkerStore::new()),
            archive,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryArchive::new()))
    }

    /// Reserves every id already in the archive. Run once before serving.
    pub async fn load_archived_ids(&self) -> Result<usize> {
        let ids = self.archive.archived_ids().await?;
        let count = ids.len();
        self.job_store.retire(ids);
        info!("Reserved {count} archived job ids");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use shared::models::{Job, JobRequest, JobStatus};

    #[tokio::test]
    async fn test_archived_ids_are_reserved_on_load() {
        let archive = Arc::new(InMemoryArchive::new());
        let mut job = Job::new(
            "job-old".to_string(),
            Address::repeat_byte(1),
            JobRequest::default(),
            "standard".to_string(),
            U256::from(1),
        );
        job.status = JobStatus::Completed;
        archive.archive(&job).await.unwrap();

        let context = StoreContext::new(archive);
        assert!(!context.job_store.is_reserved("job-old"));
        assert_eq!(context.load_archived_ids().await.unwrap(), 1);
        assert!(context.job_store.is_reserved("job-old"));
        assert!(!context.job_store.contains("job-old"));
    }
}
