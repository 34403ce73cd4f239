//! Public entry point: the External Surface the agent/caller layer uses,
//! plus the host-binding entry points (`accept`, `handle_incoming`,
//! `peer_disconnected`) a transport implementation drives.

use std::sync::Arc;
use std::time::Duration;

use ech_proto::{CallError, CloseCode, Envelope, Source};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::debug;

use super::acceptor::{self, AcceptOutcome, Handshake};
use super::events::{ConnectionChangeEvent, DomainEvent};
use super::router;
use super::HubCore;
use crate::config::HubConfig;
use crate::ids::{new_envelope_id, now_unix_ts};
use crate::peer::Peer;
use crate::transport::Transport;

/// Envelope types a caller must never send outbound: they are either
/// hub-originated control frames or editor-originated reports the hub
/// dispatches bespoke handling for on the way in.
const RESERVED_INCOMING_TYPES: &[&str] =
    &["hb", "pong", "ack", "welcome", "compile_started", "compile_finished"];

fn validate_outbound_type(ty: &str) -> Result<(), CallError> {
    if ty.is_empty() {
        return Err(CallError::ProtocolError("envelope type must not be empty".into()));
    }
    if RESERVED_INCOMING_TYPES.contains(&ty) {
        return Err(CallError::ProtocolError(format!("\"{ty}\" is reserved for incoming frames")));
    }
    Ok(())
}

/// The Editor Connection Hub. Cloning is cheap (an `Arc` bump) and every
/// clone shares the same registry, correlation tables, and sweeper.
#[derive(Debug, Clone)]
pub struct EditorHub {
    core: Arc<HubCore>,
}

impl EditorHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            core: HubCore::new(config),
        }
    }

    /// Admits a connection. The caller (a transport binding) is responsible
    /// for translating [`AcceptOutcome::Rejected`] into closing its own side
    /// of the handshake — the peer's own transport has already been told to
    /// close by the time this returns.
    pub fn accept(
        &self,
        session_id: Option<String>,
        conn_seq: u64,
        project_path: Option<String>,
        transport: Arc<dyn Transport>,
    ) -> AcceptOutcome {
        acceptor::accept_connection(
            &self.core,
            Handshake {
                session_id,
                conn_seq,
                project_path,
            },
            transport,
        )
    }

    /// Routes one decoded inbound envelope from `peer`. Call this for every
    /// frame a host binding's receive loop reads off `peer`'s transport.
    pub fn handle_incoming(&self, peer: &Arc<Peer>, envelope: Envelope) {
        router::handle_incoming(&self.core, peer, envelope);
    }

    /// Must be called exactly once by the host binding when `peer`'s receive
    /// loop ends, for any reason (EOF, transport error, local close).
    pub fn peer_disconnected(&self, peer: &Arc<Peer>) {
        acceptor::cleanup_peer(&self.core, peer);
    }

    /// Resolves the current target peer, sends a freshly-minted envelope of
    /// `ty`, and awaits the matching reply on the normal correlation table.
    pub async fn send_and_wait(
        &self,
        ty: &str,
        params: Map<String, Value>,
        timeout: Option<Duration>,
    ) -> Result<Map<String, Value>, CallError> {
        validate_outbound_type(ty)?;
        let peer = self.resolve_target()?;
        let id = new_envelope_id();
        let session = peer.session_id().map(|s| s.to_string());

        let rx = self.core.correlation.insert_normal(id.clone(), peer.conn_id.clone());

        let mut envelope = Envelope::new(Source::Caller, ty, id.clone(), now_unix_ts()).with_body(params);
        if let Some(session) = session {
            envelope = envelope.with_session(session);
        }

        if !peer.send(&envelope) {
            self.core.correlation.cancel_one(&id, CallError::ConnectionClosed);
            return Err(CallError::ConnectionClosed);
        }

        let deadline = timeout.unwrap_or(self.core.config.command_timeout);
        await_reply(&self.core, &id, rx, deadline).await
    }

    /// Identical to [`Self::send_and_wait`] but uses the reload-surviving
    /// table and the refresh timeout budget: the reply may arrive after a
    /// domain reload, possibly on a different peer.
    pub async fn send_refresh_and_wait(
        &self,
        ty: &str,
        params: Map<String, Value>,
    ) -> Result<Map<String, Value>, CallError> {
        validate_outbound_type(ty)?;
        let peer = self.resolve_target()?;
        let id = new_envelope_id();
        let session = peer.session_id().map(|s| s.to_string());

        let rx = self.core.correlation.insert_reload(id.clone(), peer.conn_id.clone());

        let mut envelope = Envelope::new(Source::Caller, ty, id.clone(), now_unix_ts()).with_body(params);
        if let Some(session) = session {
            envelope = envelope.with_session(session);
        }

        if !peer.send(&envelope) {
            // Unlike the normal table, a send failure here does not fail the
            // call outright: the reply is expected to survive the peer that
            // received the request. The caller simply waits
            // out the refresh timeout for a reply on a future peer.
            debug!(id = %id, "refresh request send failed, awaiting reply on a future peer");
        }

        await_reply(&self.core, &id, rx, self.core.config.refresh_timeout).await
    }

    fn resolve_target(&self) -> Result<Arc<Peer>, CallError> {
        let project = self.core.target.current().ok_or(CallError::NoConnection)?;
        self.core
            .registry
            .session_for_project(&project)
            .ok_or(CallError::NoConnection)
    }

    /// Normalizes `path` and sets it as the active target, emitting
    /// `connection-change` if the resolved peer availability changed.
    pub fn set_target_project(&self, path: &str) {
        let previous = self.core.target.set(path);
        let new_target = self.core.target.current().unwrap_or_default();

        let now_connected = self.core.registry.session_for_project(&new_target).is_some();
        if now_connected {
            let _ = self.core.connection_change.send(ConnectionChangeEvent {
                project: new_target,
                connected: true,
            });
        } else if previous.as_deref() != Some(new_target.as_str()) {
            let _ = self.core.connection_change.send(ConnectionChangeEvent {
                project: new_target,
                connected: false,
            });
        }
    }

    pub fn connected_projects(&self) -> Vec<String> {
        self.core.registry.connected_projects()
    }

    pub fn subscribe_connection_change(&self) -> broadcast::Receiver<ConnectionChangeEvent> {
        self.core.connection_change.subscribe()
    }

    pub fn subscribe_domain_event(&self) -> broadcast::Receiver<DomainEvent> {
        self.core.domain_event.subscribe()
    }

    /// Stops the sweeper, fails every outstanding correlation (both tables),
    /// closes every registered transport with `GOING_AWAY`, and clears the
    /// registry.
    pub fn close_all(&self) {
        self.core.shutdown_sweeper();
        self.core.correlation.cancel_all_reload(CallError::Shutdown);
        self.core.correlation.cancel_all_normal(CallError::Shutdown);
        for peer in self.core.registry.clear_all() {
            peer.close(CloseCode::GoingAway, CloseCode::GoingAway.reason());
        }
    }
}

async fn await_reply(
    core: &Arc<HubCore>,
    id: &str,
    rx: tokio::sync::oneshot::Receiver<Result<Map<String, Value>, CallError>>,
    timeout: Duration,
) -> Result<Map<String, Value>, CallError> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(result)) => result,
        // Sender dropped without resolving: treat as a shutdown race.
        Ok(Err(_)) => Err(CallError::Shutdown),
        Err(_) => {
            core.correlation.cancel_one(id, CallError::Timeout);
            Err(CallError::Timeout)
        }
    }
}
