use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "rest-metrics-api", about = "Rolling REST endpoint metrics per application version")]
pub struct Config {
    /// Address the HTTP server binds to.
    #[arg(long, env = "REST_METRICS_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,

    /// Instances silent for longer than this are evicted.
    #[arg(long, env = "REST_METRICS_STALE_INSTANCE_MINUTES", default_value_t = 240)]
    pub stale_instance_minutes: u64,

    /// How often stale instances are evicted.
    #[arg(long, env = "REST_METRICS_EVICTION_INTERVAL_SECS", default_value_t = 60)]
    pub eviction_interval_secs: u64,
}

impl Config {
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_instance_minutes * 60)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs.max(1))
    }
}
