//! Command-line flags. Every flag overrides one of the default timing
//! constants; omitted flags fall back to [`ech_hub::HubConfig::default`].

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use ech_hub::HubConfig;

#[derive(Parser, Debug)]
#[command(name = "ech-server")]
#[command(about = "Editor Connection Hub: multiplexed request/reply over persistent editor connections")]
pub struct Args {
    /// Address to bind the WebSocket upgrade endpoint to.
    #[arg(long, default_value = "127.0.0.1:8787")]
    pub bind: SocketAddr,

    #[arg(long)]
    pub sweep_interval_secs: Option<u64>,

    #[arg(long)]
    pub max_idle_secs: Option<u64>,

    #[arg(long)]
    pub probe_after_idle_secs: Option<u64>,

    #[arg(long)]
    pub probe_timeout_secs: Option<u64>,

    #[arg(long)]
    pub max_missed_probes: Option<u32>,

    #[arg(long)]
    pub force_kill_secs: Option<u64>,

    #[arg(long)]
    pub compile_suspend_secs: Option<u64>,

    #[arg(long)]
    pub compile_grace_secs: Option<u64>,

    #[arg(long)]
    pub command_timeout_secs: Option<u64>,

    #[arg(long)]
    pub refresh_timeout_secs: Option<u64>,

    /// Passed straight to `tracing_subscriber::EnvFilter`; falls back to
    /// `RUST_LOG`, then `info`.
    #[arg(long)]
    pub log_filter: Option<String>,
}

impl Args {
    pub fn hub_config(&self) -> HubConfig {
        let defaults = HubConfig::default();
        HubConfig {
            sweep_interval: self.sweep_interval_secs.map(Duration::from_secs).unwrap_or(defaults.sweep_interval),
            probe_after_idle: self.probe_after_idle_secs.map(Duration::from_secs).unwrap_or(defaults.probe_after_idle),
            max_idle: self.max_idle_secs.map(Duration::from_secs).unwrap_or(defaults.max_idle),
            probe_timeout: self.probe_timeout_secs.map(Duration::from_secs).unwrap_or(defaults.probe_timeout),
            max_missed_probes: self.max_missed_probes.unwrap_or(defaults.max_missed_probes),
            force_kill: self.force_kill_secs.map(Duration::from_secs).unwrap_or(defaults.force_kill),
            compile_started_suspend: self.compile_suspend_secs.map(Duration::from_secs).unwrap_or(defaults.compile_started_suspend),
            compile_finished_grace: self.compile_grace_secs.map(Duration::from_secs).unwrap_or(defaults.compile_finished_grace),
            command_timeout: self.command_timeout_secs.map(Duration::from_secs).unwrap_or(defaults.command_timeout),
            refresh_timeout: self.refresh_timeout_secs.map(Duration::from_secs).unwrap_or(defaults.refresh_timeout),
        }
    }
}
