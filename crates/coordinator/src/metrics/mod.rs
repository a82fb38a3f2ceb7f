use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use shared::models::JobStatus;

pub struct MetricsContext {
    pub job_transitions: IntCounterVec,
    pub slash_events: IntCounter,
    pub pending_jobs: IntGauge,
    pub match_duration: Histogram,
    pub registry: Registry,
}

impl MetricsContext {
    pub fn new() -> Result<Self, prometheus::Error> {
        let job_transitions = IntCounterVec::new(
            Opts::new("coordinator_job_transitions_total", "Job status transitions"),
            &["from", "to"],
        )?;
        let slash_events = IntCounter::new(
            "coordinator_slash_events_total",
            "Stake slashes applied to workers",
        )?;
        let pending_jobs = IntGauge::new(
            "coordinator_pending_jobs",
            "Jobs waiting for a worker after the last matching pass",
        )?;
        let match_duration = Histogram::with_opts(HistogramOpts::new(
            "coordinator_match_pass_seconds",
            "Duration of a matching pass",
        ))?;

        let registry = Registry::new();
        registry.register(Box::new(job_transitions.clone()))?;
        registry.register(Box::new(slash_events.clone()))?;
        registry.register(Box::new(pending_jobs.clone()))?;
        registry.register(Box::new(match_duration.clone()))?;

        Ok(Self {
            job_transitions,
            slash_events,
            pending_jobs,
            match_duration,
            registry,
        })
    }

    pub fn record_transition(&self, from: JobStatus, to: JobStatus) {
        self.job_transitions
            .with_label_values(&[from.to_string().as_str(), to.to_string().as_str()])
            .inc();
    }

    pub fn record_slash(&self) {
        self.slash_events.inc();
    }

    pub fn export_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families)
    }
}
