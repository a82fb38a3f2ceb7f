pub mod job_store;
pub mod worker_store;
