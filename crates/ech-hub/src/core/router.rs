//! Per-incoming-envelope dispatch.

use std::sync::Arc;

use ech_proto::{CallError, Envelope, Source, ACK_REQUIRED_TYPES};
use tracing::{debug, trace};

use super::events::DomainEvent;
use super::HubCore;
use crate::ids::{now_unix_ts, SessionId};
use crate::peer::Peer;

/// Routes one fully-decoded inbound envelope from `peer`. Malformed frames
/// are dropped by the caller before this is invoked; this function assumes
/// `envelope` parsed successfully.
pub fn handle_incoming(core: &Arc<HubCore>, peer: &Arc<Peer>, envelope: Envelope) {
    peer.touch_activity();

    if let Some(session) = envelope.session.clone() {
        peer.adopt_session_id_if_empty(SessionId::from(session));
    }

    match envelope.ty.as_str() {
        "hb" => {
            trace!(conn_id = %peer.conn_id, "replying to heartbeat");
            let pong = Envelope::new(Source::Aux, "pong", envelope.id.clone(), now_unix_ts());
            peer.send(&pong);
        }
        "pong" => {
            peer.record_pong();
        }
        "ack" => {
            // Delivery acknowledgement; recorded only when a reliable-send
            // layer is enabled, which this hub does not implement.
        }
        "compile_started" => {
            debug!(conn_id = %peer.conn_id, "compile started");
            peer.set_compiling(true);
            core.suspend(core.config.compile_started_suspend);
            core.correlation
                .cancel_normal_for_peer(&peer.conn_id, CallError::CompileStarted);
            let _ = core.domain_event.send(DomainEvent { envelope });
        }
        "compile_finished" => {
            debug!(conn_id = %peer.conn_id, "compile finished");
            peer.set_compiling(false);
            core.suspend(core.config.compile_finished_grace);
            let _ = core.domain_event.send(DomainEvent { envelope });
        }
        _ => handle_domain_or_reply(core, peer, envelope),
    }
}

/// Anything that is neither a control frame nor one of the bespoke compile
/// events: a command reply or a genuine domain event.
fn handle_domain_or_reply(core: &Arc<HubCore>, peer: &Arc<Peer>, envelope: Envelope) {
    // Reload-surviving table is consulted first, since its
    // replies are expected to outlive the peer that originally received the
    // request.
    if core.correlation.resolve_any(&envelope.id, envelope.body.clone()) {
        trace!(id = %envelope.id, "resolved pending correlation");
        return;
    }

    if ACK_REQUIRED_TYPES.contains(&envelope.ty.as_str()) {
        let ack = Envelope::new(Source::Aux, "ack", envelope.id.clone(), now_unix_ts());
        peer.send(&ack);
    }

    let _ = core.domain_event.send(DomainEvent { envelope });
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use ech_proto::CloseCode;
    use serde_json::{Map, Value};

    use super::*;
    use crate::config::HubConfig;
    use crate::ids::new_conn_id;
    use crate::transport::Transport;

    #[derive(Debug, Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Envelope>>,
        closes: AtomicUsize,
    }

    impl Transport for RecordingTransport {
        fn send_raw(&self, data: Vec<u8>) -> bool {
            let env = Envelope::parse(&data).expect("router always sends well-formed envelopes");
            self.sent.lock().unwrap().push(env);
            true
        }
        fn close(&self, _code: CloseCode, _reason: String) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn make_peer() -> (Arc<Peer>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let peer = Peer::new(new_conn_id(), None, 0, None, transport.clone());
        peer.mark_open();
        (peer, transport)
    }

    #[test]
    fn heartbeat_gets_a_pong_with_the_same_id() {
        let core = HubCore::new(HubConfig::default());
        let (peer, transport) = make_peer();
        let hb = Envelope::new(Source::Editor, "hb", "id-1", now_unix_ts());
        handle_incoming(&core, &peer, hb);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].ty, "pong");
        assert_eq!(sent[0].id, "id-1");
    }

    #[test]
    fn pong_is_a_pure_liveness_signal_and_sends_nothing() {
        let core = HubCore::new(HubConfig::default());
        let (peer, transport) = make_peer();
        peer.record_probe_sent();
        handle_incoming(&core, &peer, Envelope::new(Source::Editor, "pong", "id-2", now_unix_ts()));
        assert!(transport.sent.lock().unwrap().is_empty());
        assert!(peer.snapshot().alive);
    }

    #[test]
    fn compile_started_suspends_flags_peer_and_cancels_normal_only() {
        let core = HubCore::new(HubConfig::default());
        let (peer, _transport) = make_peer();
        let mut subscriber = core.domain_event.subscribe();

        let rx_normal = core.correlation.insert_normal("req-1".into(), peer.conn_id.clone());
        let rx_reload = core.correlation.insert_reload("req-2".into(), peer.conn_id.clone());

        handle_incoming(
            &core,
            &peer,
            Envelope::new(Source::Editor, "compile_started", "ev-1", now_unix_ts()),
        );

        assert!(peer.is_compiling());
        assert!(core.is_suspended());
        assert_eq!(
            rx_normal.blocking_recv().unwrap().unwrap_err(),
            CallError::CompileStarted
        );
        assert!(!core.correlation.resolve_any("req-2", Map::new()));
        drop(rx_reload);
        assert_eq!(subscriber.try_recv().unwrap().envelope.ty, "compile_started");
    }

    #[test]
    fn ack_required_type_with_no_pending_correlation_gets_acked_and_forwarded() {
        let core = HubCore::new(HubConfig::default());
        let (peer, transport) = make_peer();
        let mut subscriber = core.domain_event.subscribe();

        let mut body = Map::new();
        body.insert("k".into(), Value::String("v".into()));
        let env = Envelope::new(Source::Editor, "assets_imported", "ev-2", now_unix_ts()).with_body(body);
        handle_incoming(&core, &peer, env);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].ty, "ack");
        assert_eq!(sent[0].id, "ev-2");
        assert_eq!(subscriber.try_recv().unwrap().envelope.ty, "assets_imported");
    }

    #[test]
    fn matching_pending_correlation_resolves_instead_of_acking() {
        let core = HubCore::new(HubConfig::default());
        let (peer, transport) = make_peer();
        let rx = core.correlation.insert_normal("shared-id".into(), peer.conn_id.clone());

        let mut body = Map::new();
        body.insert("ok".into(), Value::Bool(true));
        // "hello" is both ack-required and, here, the id of an outstanding
        // correlation: resolve instead of acking when one is pending.
        let env = Envelope::new(Source::Editor, "hello", "shared-id", now_unix_ts()).with_body(body);
        handle_incoming(&core, &peer, env);

        assert!(transport.sent.lock().unwrap().is_empty());
        assert!(rx.blocking_recv().unwrap().is_ok());
    }

    #[test]
    fn non_ack_required_domain_event_is_forwarded_without_an_ack() {
        let core = HubCore::new(HubConfig::default());
        let (peer, transport) = make_peer();
        let mut subscriber = core.domain_event.subscribe();

        let env = Envelope::new(Source::Editor, "custom_event", "ev-3", now_unix_ts());
        handle_incoming(&core, &peer, env);

        assert!(transport.sent.lock().unwrap().is_empty());
        assert_eq!(subscriber.try_recv().unwrap().envelope.ty, "custom_event");
    }
}
