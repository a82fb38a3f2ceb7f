use anyhow::Result;
use clap::Parser;
use coordinator::{
    start_server, CoordinatorConfig, EventBus, HttpVerifier, InMemoryArchive, JobRegistry,
    LoopHeartbeats, Matcher, MetricsContext, RedisArchive, RedisStore, SlaMonitor,
    StoreContext, ValidationService, WebhookConfig, WebhookPlugin,
};
use coordinator::store::archive::JobArchive;
use log::debug;
use log::error;
use log::info;
use log::LevelFilter;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Parser)]
struct Args {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port
    #[arg(short = 'p', long, default_value = "8090")]
    port: u16,

    /// Marketplace configuration (TOML). Defaults apply when omitted.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Admin api key
    #[arg(short = 'a', long, default_value = "admin")]
    admin_api_key: String,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Matching pass interval in seconds
    #[arg(long, default_value = "5")]
    match_interval: u64,

    /// SLA sweep interval in seconds
    #[arg(long, default_value = "10")]
    sla_interval: u64,

    /// Validation pass interval in seconds
    #[arg(long, default_value = "10")]
    validation_interval: u64,

    /// Verifier endpoint; without it verdicts arrive through the admin api
    #[arg(long)]
    verifier_url: Option<String>,

    /// Redis url for the job archive; in-memory when omitted
    #[arg(short = 's', long)]
    redis_archive_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = match args.log_level.as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    debug!("Log level: {log_level}");

    let config = match &args.config {
        Some(path) => CoordinatorConfig::load(path)?,
        None => CoordinatorConfig::default(),
    };

    let archive: Arc<dyn JobArchive> = match &args.redis_archive_url {
        Some(url) => Arc::new(RedisArchive::new(Arc::new(RedisStore::new(url)?))),
        None => {
            info!("Using in-memory job archive");
            Arc::new(InMemoryArchive::new())
        }
    };
    let store_context = Arc::new(StoreContext::new(archive));
    store_context.load_archived_ids().await?;
    let metrics = Arc::new(MetricsContext::new()?);
    let heartbeats = match &args.verifier_url {
        Some(_) => LoopHeartbeats::new(),
        None => LoopHeartbeats::new().without_validation_loop(),
    };
    let heartbeats = Arc::new(heartbeats);
    let events = EventBus::new();
    let registry = Arc::new(JobRegistry::new(
        &config,
        store_context,
        events.clone(),
        Some(metrics.clone()),
    ));

    let mut webhook_plugins: Vec<WebhookPlugin> = vec![];
    let configs = std::env::var("WEBHOOK_CONFIGS").unwrap_or_default();
    if !configs.is_empty() {
        match serde_json::from_str::<Vec<WebhookConfig>>(&configs) {
            Ok(configs) => {
                for config in configs {
                    match WebhookPlugin::new(config) {
                        Ok(plugin) => {
                            webhook_plugins.push(plugin);
                            info!("Plugin: Webhook plugin initialized");
                        }
                        Err(e) => error!("Failed to create webhook plugin: {e}"),
                    }
                }
            }
            Err(e) => {
                error!("Failed to parse webhook configs from environment: {e}");
            }
        }
    } else {
        info!("No webhook configurations provided");
    }

    let mut tasks: JoinSet<Result<()>> = JoinSet::new();

    let matcher = Matcher::new(registry.clone(), Some(metrics.clone()));
    let matcher_heartbeats = heartbeats.clone();
    let match_interval = args.match_interval;
    tasks.spawn(async move { matcher.run(match_interval, matcher_heartbeats).await });

    let monitor = SlaMonitor::new(registry.clone(), args.sla_interval, heartbeats.clone());
    tasks.spawn(async move { monitor.run().await });

    match &args.verifier_url {
        Some(url) => {
            let verifier = Arc::new(HttpVerifier::new(url.clone())?);
            let service = ValidationService::new(registry.clone(), verifier);
            let validation_heartbeats = heartbeats.clone();
            let validation_interval = args.validation_interval;
            tasks.spawn(async move {
                service
                    .run(validation_interval, validation_heartbeats)
                    .await
            });
        }
        None => {
            info!("No verifier configured, waiting for verdicts on the admin api");
        }
    }

    for plugin in webhook_plugins {
        let subscription = events.subscribe_all();
        tasks.spawn(async move { plugin.run(subscription).await });
    }

    tokio::select! {
        res = start_server(
            &args.host,
            args.port,
            registry.clone(),
            metrics.clone(),
            heartbeats.clone(),
            args.admin_api_key,
        ) => {
            if let Err(e) = res {
                error!("Server error: {e}");
            }
        }
        Some(res) = tasks.join_next() => {
            if let Err(e) = res? {
                error!("Task error: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            error!("Shutdown signal received");
        }
    }

    tasks.shutdown().await;
    Ok(())
}
