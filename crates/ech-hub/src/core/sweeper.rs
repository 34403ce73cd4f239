//! Background liveness sweep.

use std::sync::Arc;
use std::time::Instant;

use ech_proto::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::acceptor::cleanup_peer;
use super::HubCore;
use crate::peer::{Peer, PeerState};

/// Runs until `shutdown` is cancelled. Ticks every `config.sweep_interval`;
/// a tick is a no-op while the hub is suspended (domain reload in
/// progress).
pub async fn run(core: Arc<HubCore>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(core.config.sweep_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("sweeper shut down");
                return;
            }
            _ = interval.tick() => {
                if core.is_suspended() {
                    continue;
                }
                sweep_once(&core);
            }
        }
    }
}

/// One sweep pass over a registry snapshot. Split out from [`run`] so tests
/// can drive it directly without waiting on a real interval.
pub fn sweep_once(core: &Arc<HubCore>) {
    for peer in core.registry.snapshot() {
        sweep_peer(core, &peer);
    }
}

fn sweep_peer(core: &Arc<HubCore>, peer: &Arc<Peer>) {
    let snapshot = peer.snapshot();

    if snapshot.state == PeerState::Closing {
        if let Some(closing_since) = snapshot.closing_since {
            if closing_since.elapsed() > core.config.force_kill {
                warn!(conn_id = %peer.conn_id, "force-killing peer stuck in closing");
                terminate(core, peer, CloseCode::InternalError, "force-kill: stuck closing");
            }
        }
        return;
    }

    if snapshot.state != PeerState::Open {
        return;
    }

    let idle = snapshot.last_activity.elapsed();

    if idle > core.config.max_idle {
        info!(conn_id = %peer.conn_id, ?idle, "closing idle peer");
        terminate(core, peer, CloseCode::GoingAway, "idle timeout");
        return;
    }

    if idle <= core.config.probe_after_idle {
        peer.reset_probe_state();
        return;
    }

    if !snapshot.alive {
        let missed = peer.record_missed_probe();
        if missed >= core.config.max_missed_probes {
            warn!(conn_id = %peer.conn_id, missed, "missed probe limit exceeded");
            terminate(core, peer, CloseCode::InternalError, "missed probe limit exceeded");
            return;
        }
    }

    peer.record_probe_sent();
    let probe = ech_proto::Envelope::new(
        ech_proto::Source::Aux,
        "hb",
        crate::ids::new_envelope_id(),
        crate::ids::now_unix_ts(),
    );
    peer.send(&probe);
}

/// Authoritative termination: the sweeper has concluded the connection will
/// never recover, so it closes the transport and runs cleanup immediately
/// rather than waiting for a host read loop to report the disconnect.
fn terminate(core: &Arc<HubCore>, peer: &Arc<Peer>, code: CloseCode, reason: &str) {
    peer.close(code, reason);
    cleanup_peer(core, peer);
}
