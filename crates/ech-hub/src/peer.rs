use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ech_proto::{CloseCode, Envelope};

use crate::ids::SessionId;
use crate::transport::Transport;

/// Lifecycle state of one connection.
///
/// `Connecting` -> `Open` -> `Closing` -> `Closed`. A peer is owned
/// exclusively by its receive loop; the registry and sweeper hold read-only
/// views plus a close capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Point-in-time, lock-free copy of a peer's mutable fields, for callers
/// (the sweeper, diagnostics) that need to read several fields consistently
/// without holding the peer's lock across other work.
#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    pub state: PeerState,
    pub alive: bool,
    pub missed_probes: u32,
    pub connected_at: Instant,
    pub last_activity: Instant,
    pub last_probe_sent: Option<Instant>,
    pub closing_since: Option<Instant>,
    pub latency: Option<Duration>,
    pub is_compiling: bool,
}

#[derive(Debug)]
struct PeerInner {
    state: PeerState,
    alive: bool,
    missed_probes: u32,
    connected_at: Instant,
    last_activity: Instant,
    last_probe_sent: Option<Instant>,
    closing_since: Option<Instant>,
    latency: Option<Duration>,
    is_compiling: bool,
}

/// One live (or recently live) connection from an external editor process.
///
/// All mutable fields are behind a single lock, touched by the peer's own
/// receive loop, the liveness sweeper, and the router.
#[derive(Debug)]
pub struct Peer {
    pub conn_id: String,
    session_id: Mutex<Option<SessionId>>,
    pub seq: u64,
    project_path: Mutex<Option<String>>,
    transport: Arc<dyn Transport>,
    inner: Mutex<PeerInner>,
}

impl Peer {
    pub fn new(
        conn_id: String,
        session_id: Option<SessionId>,
        seq: u64,
        project_path: Option<String>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let now = Instant::now();
        Arc::new(Self {
            conn_id,
            session_id: Mutex::new(session_id),
            seq,
            project_path: Mutex::new(project_path),
            transport,
            inner: Mutex::new(PeerInner {
                state: PeerState::Connecting,
                alive: true,
                missed_probes: 0,
                connected_at: now,
                last_activity: now,
                last_probe_sent: None,
                closing_since: None,
                latency: None,
                is_compiling: false,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PeerInner> {
        crate::error::recover_lock(self.inner.lock(), "peer.inner")
    }

    pub fn session_id(&self) -> Option<SessionId> {
        crate::error::recover_lock(self.session_id.lock(), "peer.session_id").clone()
    }

    /// Adopts a session id if and only if the peer does not already have one.
    pub fn adopt_session_id_if_empty(&self, session_id: SessionId) {
        let mut guard = crate::error::recover_lock(self.session_id.lock(), "peer.session_id");
        if guard.is_none() {
            *guard = Some(session_id);
        }
    }

    pub fn project_path(&self) -> Option<String> {
        crate::error::recover_lock(self.project_path.lock(), "peer.project_path").clone()
    }

    pub fn set_project_path(&self, path: Option<String>) {
        *crate::error::recover_lock(self.project_path.lock(), "peer.project_path") = path;
    }

    pub fn state(&self) -> PeerState {
        self.lock().state
    }

    pub fn mark_open(&self) {
        self.lock().state = PeerState::Open;
    }

    pub fn is_compiling(&self) -> bool {
        self.lock().is_compiling
    }

    pub fn set_compiling(&self, compiling: bool) {
        self.lock().is_compiling = compiling;
    }

    pub fn snapshot(&self) -> PeerSnapshot {
        let inner = self.lock();
        PeerSnapshot {
            state: inner.state,
            alive: inner.alive,
            missed_probes: inner.missed_probes,
            connected_at: inner.connected_at,
            last_activity: inner.last_activity,
            last_probe_sent: inner.last_probe_sent,
            closing_since: inner.closing_since,
            latency: inner.latency,
            is_compiling: inner.is_compiling,
        }
    }

    /// Records inbound traffic: every inbound frame raises the alive bit,
    /// resets the missed-probe counter, and bumps `last_activity`.
    pub fn touch_activity(&self) {
        let mut inner = self.lock();
        inner.last_activity = Instant::now();
        inner.alive = true;
        inner.missed_probes = 0;
    }

    /// Clears the alive bit to true and resets the missed-probe counter
    /// without touching `last_activity`. Used by the sweeper when a peer is
    /// idle but still within the pre-probe grace window.
    pub fn reset_probe_state(&self) {
        let mut inner = self.lock();
        inner.alive = true;
        inner.missed_probes = 0;
    }

    /// Records that the sweeper just sent a probe; clears the alive bit so a
    /// later `pong` (or any other inbound frame) can raise it again.
    pub fn record_probe_sent(&self) {
        let mut inner = self.lock();
        inner.alive = false;
        inner.last_probe_sent = Some(Instant::now());
    }

    pub fn record_missed_probe(&self) -> u32 {
        let mut inner = self.lock();
        inner.missed_probes += 1;
        inner.missed_probes
    }

    /// Records a `pong` for the most recent outstanding probe and computes
    /// latency. An unsolicited `pong` that matches no outstanding probe is a
    /// pure liveness signal and simply leaves
    /// latency unchanged.
    pub fn record_pong(&self) {
        let mut inner = self.lock();
        if let Some(sent_at) = inner.last_probe_sent {
            inner.latency = Some(sent_at.elapsed());
        }
        inner.alive = true;
        inner.missed_probes = 0;
    }

    pub fn begin_closing(&self) {
        let mut inner = self.lock();
        if inner.state != PeerState::Closed {
            inner.state = PeerState::Closing;
            inner.closing_since = Some(Instant::now());
        }
    }

    pub fn mark_closed(&self) {
        self.lock().state = PeerState::Closed;
    }

    /// Sends an envelope through this peer's transport. Returns `false` if
    /// the transport reports the send failed, meaning the peer is dead.
    pub fn send(&self, envelope: &Envelope) -> bool {
        self.transport.send_raw(envelope.to_wire())
    }

    /// Initiates an orderly close with the given code; the transport
    /// performs the actual close asynchronously on its own writer task.
    pub fn close(&self, code: CloseCode, reason: impl Into<String>) {
        self.begin_closing();
        self.transport.close(code, reason.into());
    }
}
