//! vmalloc allocator
//!
//! Runs the compute allocation saga against the configured resource services
//! and resumes unfinished tasks from the Postgres task store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vmalloc_allocator::{
    collaborators::{http::ResourceClient, Collaborators},
    config::Config,
    db::Database,
    saga::AllocationSaga,
    topics,
    worker::ResumeWorker,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Connects the task store and announces our extensibility topics.
async fn prepare(config: &Config) -> Result<AllocationSaga> {
    let db = Database::connect(&config.database)
        .await
        .context("connecting to task database")?;
    info!("Task database reachable");

    if config.dev_mode {
        info!("Dev mode: applying task store migrations");
        db.run_migrations()
            .await
            .context("applying task store migrations")?;
    }

    let registry = ResourceClient::new(&config.resource_api_url, config.request_timeout)?;
    topics::register_topics(&registry)
        .await
        .context("registering extensibility topics")?;

    let collaborators = Collaborators::http(config)?;
    Ok(AllocationSaga::new(Arc::new(db.task_store()), collaborators))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // RUST_LOG wins over VMALLOC_LOG_LEVEL
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        resource_api_url = %config.resource_api_url,
        extensibility = config.extensibility.is_some(),
        resume_interval_ms = config.resume_interval.as_millis() as u64,
        "vmalloc allocator starting"
    );

    let saga = prepare(&config).await.inspect_err(|e| {
        error!(error = format!("{e:#}"), "Allocator failed to start");
    })?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = ResumeWorker::new(saga, config.resume_interval);
    let worker_handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Could not wait for ctrl-c, stopping now");
    } else {
        info!("Shutdown requested");
    }
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(SHUTDOWN_GRACE, worker_handle).await {
        Ok(Ok(())) => info!("Allocator stopped"),
        Ok(Err(e)) => warn!(error = %e, "Resume worker panicked"),
        Err(_) => warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "Resume worker did not stop in time"),
    }
    Ok(())
}
