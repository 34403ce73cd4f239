use std::time::Duration;

/// Timing constants for the hub. A host binary typically builds this from
/// CLI flags or environment variables, falling back to [`Default`] for
/// omitted fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// How often the liveness sweeper scans the registry.
    pub sweep_interval: Duration,
    /// Idle time after which a peer enters the probing window.
    pub probe_after_idle: Duration,
    /// Idle time after which a peer is closed outright, independent of probing.
    pub max_idle: Duration,
    /// How long the sweeper waits for a `pong` before counting a probe as missed.
    pub probe_timeout: Duration,
    /// Consecutive missed probes before a peer is force-terminated.
    pub max_missed_probes: u32,
    /// Grace period for a peer stuck in `Closing` before it is hard-terminated.
    pub force_kill: Duration,
    /// Sweeper suspension applied when a peer reports `compile_started`.
    pub compile_started_suspend: Duration,
    /// Additional sweeper suspension applied when a peer reports `compile_finished`.
    pub compile_finished_grace: Duration,
    /// Default deadline for `send_and_wait`.
    pub command_timeout: Duration,
    /// Deadline for `send_refresh_and_wait`, which must tolerate a reload.
    pub refresh_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(40),
            probe_after_idle: Duration::from_secs(90),
            max_idle: Duration::from_secs(600),
            probe_timeout: Duration::from_secs(20),
            max_missed_probes: 3,
            force_kill: Duration::from_secs(10),
            compile_started_suspend: Duration::from_secs(120),
            compile_finished_grace: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
            refresh_timeout: Duration::from_secs(120),
        }
    }
}
