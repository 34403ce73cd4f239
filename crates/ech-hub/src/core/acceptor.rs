//! Connection admission and idempotent peer cleanup.

use std::sync::Arc;

use ech_proto::{CallError, CloseCode, Envelope, Source};
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::events::ConnectionChangeEvent;
use super::registry::AcceptDecision;
use super::HubCore;
use crate::ids::{new_conn_id, now_unix_ts, SessionId};
use crate::peer::Peer;
use crate::transport::Transport;

/// Handshake parameters carried as query-string parameters on the
/// transport upgrade URL.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub session_id: Option<String>,
    pub conn_seq: u64,
    pub project_path: Option<String>,
}

/// Result of admitting a connection attempt.
#[derive(Debug)]
pub enum AcceptOutcome {
    /// The peer is now registered and open; the welcome envelope has
    /// already been sent.
    Accepted(Arc<Peer>),
    /// The connection was rejected; the caller's transport has already been
    /// closed with `DUPLICATE_SESSION`.
    Rejected,
}

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Admits a new connection: builds the peer, resolves
/// monotonic takeover via the registry, closes whichever transport loses,
/// and emits the welcome envelope plus a `connection-change` notification
/// when the admitted peer matches the current target.
pub fn accept_connection(
    core: &Arc<HubCore>,
    handshake: Handshake,
    transport: Arc<dyn Transport>,
) -> AcceptOutcome {
    let conn_id = new_conn_id();
    let session_id = handshake
        .session_id
        .map(SessionId::from)
        .unwrap_or_else(crate::ids::new_session_id);

    let peer = Peer::new(
        conn_id.clone(),
        Some(session_id.clone()),
        handshake.conn_seq,
        handshake.project_path.clone(),
        transport,
    );

    let decision = core.registry.accept(
        session_id.clone(),
        handshake.conn_seq,
        peer.clone(),
        handshake.project_path.clone(),
    );

    match decision {
        AcceptDecision::Reject(reason) => {
            warn!(%session_id, seq = handshake.conn_seq, %reason, "rejecting stale connection sequence");
            peer.close(CloseCode::DuplicateSession, CloseCode::DuplicateSession.reason());
            AcceptOutcome::Rejected
        }
        AcceptDecision::AcceptWithSupersede(old) => {
            info!(%session_id, conn_id = %conn_id, old_conn_id = %old.conn_id, "superseding prior connection");
            old.close(CloseCode::Superseded, CloseCode::Superseded.reason());
            finish_accept(core, peer, session_id)
        }
        AcceptDecision::Accept => {
            info!(%session_id, conn_id = %conn_id, "accepted new session");
            finish_accept(core, peer, session_id)
        }
    }
}

fn finish_accept(core: &Arc<HubCore>, peer: Arc<Peer>, session_id: SessionId) -> AcceptOutcome {
    peer.mark_open();
    core.ensure_sweeper_started();

    let mut body = Map::new();
    body.insert("connectionId".into(), Value::String(peer.conn_id.clone()));
    body.insert("sessionId".into(), Value::String(session_id.to_string()));
    body.insert("serverVersion".into(), Value::String(SERVER_VERSION.into()));
    let welcome = Envelope::new(Source::Aux, "welcome", crate::ids::new_envelope_id(), now_unix_ts())
        .with_body(body);
    peer.send(&welcome);

    if is_current_target(core, &peer) {
        let _ = core.connection_change.send(ConnectionChangeEvent {
            project: peer.project_path().unwrap_or_default(),
            connected: true,
        });
    }

    AcceptOutcome::Accepted(peer)
}

fn is_current_target(core: &Arc<HubCore>, peer: &Arc<Peer>) -> bool {
    match (core.target.current(), peer.project_path()) {
        (Some(target), Some(path)) => target == crate::ids::normalize_project_path(&path),
        _ => false,
    }
}

/// Idempotent peer teardown. Safe to call more than
/// once for the same peer: the registry's `clearIfMatch` only fires the
/// side effects the first time.
pub fn cleanup_peer(core: &Arc<HubCore>, peer: &Arc<Peer>) {
    peer.mark_closed();

    let session_id = match peer.session_id() {
        Some(id) => id,
        None => return,
    };

    let was_current = core.registry.clear_if_match(&session_id, peer);
    if !was_current {
        return;
    }

    core.correlation
        .cancel_normal_for_peer(&peer.conn_id, CallError::ConnectionClosed);

    if is_current_target(core, peer) {
        let _ = core.connection_change.send(ConnectionChangeEvent {
            project: peer.project_path().unwrap_or_default(),
            connected: false,
        });
    }

    core.stop_sweeper_if_idle();
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::HubConfig;

    #[derive(Debug, Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Envelope>>,
        closed_with: Mutex<Option<CloseCode>>,
    }

    impl Transport for RecordingTransport {
        fn send_raw(&self, data: Vec<u8>) -> bool {
            self.sent.lock().unwrap().push(Envelope::parse(&data).unwrap());
            true
        }
        fn close(&self, code: CloseCode, _reason: String) {
            *self.closed_with.lock().unwrap() = Some(code);
        }
    }

    fn handshake(session: &str, seq: u64, project: Option<&str>) -> Handshake {
        Handshake {
            session_id: Some(session.into()),
            conn_seq: seq,
            project_path: project.map(String::from),
        }
    }

    #[tokio::test]
    async fn accept_sends_welcome_with_connection_id() {
        let core = HubCore::new(HubConfig::default());
        let transport = Arc::new(RecordingTransport::default());
        let outcome = accept_connection(&core, handshake("s1", 0, None), transport.clone());

        let peer = match outcome {
            AcceptOutcome::Accepted(p) => p,
            AcceptOutcome::Rejected => panic!("expected acceptance"),
        };

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].ty, "welcome");
        assert_eq!(
            sent[0].body.get("connectionId").and_then(|v| v.as_str()),
            Some(peer.conn_id.as_str())
        );
    }

    #[tokio::test]
    async fn higher_seq_supersedes_and_closes_old_transport_with_4001() {
        let core = HubCore::new(HubConfig::default());
        let old_transport = Arc::new(RecordingTransport::default());
        accept_connection(&core, handshake("s1", 0, None), old_transport.clone());

        let new_transport = Arc::new(RecordingTransport::default());
        let outcome = accept_connection(&core, handshake("s1", 1, None), new_transport);
        assert!(matches!(outcome, AcceptOutcome::Accepted(_)));

        assert_eq!(*old_transport.closed_with.lock().unwrap(), Some(CloseCode::Superseded));
    }

    #[tokio::test]
    async fn stale_seq_is_rejected_with_4002_and_does_not_touch_registry() {
        let core = HubCore::new(HubConfig::default());
        let a = Arc::new(RecordingTransport::default());
        accept_connection(&core, handshake("s1", 1, None), a);

        let c = Arc::new(RecordingTransport::default());
        let outcome = accept_connection(&core, handshake("s1", 0, None), c.clone());
        assert!(matches!(outcome, AcceptOutcome::Rejected));
        assert_eq!(*c.closed_with.lock().unwrap(), Some(CloseCode::DuplicateSession));
        assert_eq!(core.registry.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn cleanup_after_takeover_from_stale_peer_is_a_no_op() {
        let core = HubCore::new(HubConfig::default());
        let a_transport = Arc::new(RecordingTransport::default());
        let a = match accept_connection(&core, handshake("s1", 0, None), a_transport) {
            AcceptOutcome::Accepted(p) => p,
            _ => unreachable!(),
        };
        let b_transport = Arc::new(RecordingTransport::default());
        accept_connection(&core, handshake("s1", 1, None), b_transport);

        // A late cleanup call from A's now-superseded receive loop must not
        // evict B.
        cleanup_peer(&core, &a);
        assert_eq!(core.registry.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn cleanup_fails_outstanding_normal_correlations_for_that_peer() {
        let core = HubCore::new(HubConfig::default());
        let transport = Arc::new(RecordingTransport::default());
        let peer = match accept_connection(&core, handshake("s1", 0, None), transport) {
            AcceptOutcome::Accepted(p) => p,
            _ => unreachable!(),
        };
        let rx = core.correlation.insert_normal("id-1".into(), peer.conn_id.clone());
        cleanup_peer(&core, &peer);
        assert_eq!(rx.await.unwrap().unwrap_err(), CallError::ConnectionClosed);
    }
}
