//! Signal handling for graceful drain. Resolves once on `SIGINT`/`SIGTERM`;
//! callers pair this with a bounded grace period before forcing the process
//! down, the same two-deadline shape as the pack's own graceful-shutdown
//! helper (`edgen_server::graceful_shutdown`: a shutdown signal resolves
//! once, and a second deadline resolves after a grace period).

use std::time::Duration;

use tracing::warn;

pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Resolves on `Ctrl+C`, or on `SIGTERM` where supported.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install sigterm handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    warn!(grace_period = ?SHUTDOWN_GRACE_PERIOD, "shutdown signal received, draining");
}
