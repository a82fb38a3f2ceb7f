pub mod amount;
pub mod api;
pub mod event;
pub mod job;
pub mod worker;

pub use event::JobStatusEvent;
pub use job::{Job, JobRequest, JobSpecs, JobStatus, Sla, ViolationKind};
pub use worker::{GpuSpec, PerformanceStats, Worker, WorkerFilter, WorkerSpecs, WorkerStatus};
