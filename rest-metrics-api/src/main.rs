mod config;
mod routes;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use config::Config;
use log::{debug, info, warn};
use rest_metrics::VersionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, signal, time};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = Config::parse();
    info!(
        "Evicting instances idle for more than {} minutes every {}s",
        config.stale_instance_minutes,
        config.eviction_interval().as_secs()
    );

    let registry = Arc::new(VersionRegistry::new(config.stale_threshold()));
    spawn_eviction(Arc::clone(&registry), config.eviction_interval());

    let rtr = routes::router(registry);
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!("Listening on {}", config.listen_addr);

    axum::serve(listener, rtr)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn spawn_eviction(registry: Arc<VersionRegistry>, every: Duration) {
    tokio::spawn(async move {
        let mut evict_interval = time::interval(every);

        loop {
            evict_interval.tick().await;
            let evicted = registry.evict_stale(Utc::now().timestamp_millis());
            if evicted > 0 {
                info!("Evicted {} stale instances", evicted);
            } else {
                debug!("No stale instances");
            }
        }
    });
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Exiting..."),
        Err(e) => warn!("Failed to listen for ctrl-c: {}", e),
    }
}
