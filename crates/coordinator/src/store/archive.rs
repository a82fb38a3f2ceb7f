use ::redis::aio::MultiplexedConnection;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use shared::models::Job;
use std::sync::Arc;

use crate::error::Result;
use crate::store::core::RedisStore;

const ARCHIVE_KEY_PREFIX: &str = "coordinator:archive:job:";
const ARCHIVE_INDEX_KEY: &str = "coordinator:archive:jobs";

/// Cold storage for jobs that reached a terminal state.
///
/// Archived ids stay reserved: the live store loads `archived_ids` at startup
/// so an id is never handed out twice.
#[async_trait]
pub trait JobArchive: Send + Sync {
    async fn archive(&self, job: &Job) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Job>>;
    async fn archived_ids(&self) -> Result<Vec<String>>;
}

#[derive(Default)]
pub struct InMemoryArchive {
    jobs: DashMap<String, Job>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobArchive for InMemoryArchive {
    async fn archive(&self, job: &Job) -> Result<()> {
        self.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.jobs.get(id).map(|j| j.clone()))
    }

    async fn archived_ids(&self) -> Result<Vec<String>> {
        Ok(self.jobs.iter().map(|j| j.key().clone()).collect())
    }
}

pub struct RedisArchive {
    redis: Arc<RedisStore>,
}

impl RedisArchive {
    pub fn new(redis: Arc<RedisStore>) -> Self {
        Self { redis }
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        Ok(self.redis.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl JobArchive for RedisArchive {
    async fn archive(&self, job: &Job) -> Result<()> {
        let mut con = self.connection().await?;
        let payload = serde_json::to_string(job)?;
        let key = format!("{ARCHIVE_KEY_PREFIX}{}", job.id);
        ::redis::pipe()
            .atomic()
            .set(&key, payload)
            .ignore()
            .sadd(ARCHIVE_INDEX_KEY, &job.id)
            .ignore()
            .query_async::<()>(&mut con)
            .await?;
        debug!("archived {} to redis", job.id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Job>> {
        let mut con = self.connection().await?;
        let raw: Option<String> = con.get(format!("{ARCHIVE_KEY_PREFIX}{id}")).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn archived_ids(&self) -> Result<Vec<String>> {
        let mut con = self.connection().await?;
        let ids: Vec<String> = con.smembers(ARCHIVE_INDEX_KEY).await?;
        Ok(ids)
    }
}
