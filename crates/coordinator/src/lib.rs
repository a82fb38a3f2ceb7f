mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod matcher;
pub mod metrics;
pub mod plugins;
pub mod pricing;
pub mod registry;
pub mod reputation;
pub mod sla;
pub mod store;
pub mod utils;
pub mod verifier;

pub use api::server::start_server;
pub use config::CoordinatorConfig;
pub use events::EventBus;
pub use matcher::Matcher;
pub use metrics::MetricsContext;
pub use plugins::webhook::WebhookConfig;
pub use plugins::webhook::WebhookPlugin;
pub use registry::JobRegistry;
pub use sla::SlaMonitor;
pub use store::archive::InMemoryArchive;
pub use store::archive::RedisArchive;
pub use store::core::RedisStore;
pub use store::core::StoreContext;
pub use utils::loop_heartbeats::LoopHeartbeats;
pub use verifier::HttpVerifier;
pub use verifier::ValidationService;

