pub(crate) mod admin;
pub(crate) mod jobs;
pub(crate) mod market;
pub(crate) mod metrics;
pub(crate) mod workers;
