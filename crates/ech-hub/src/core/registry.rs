//! Session identity and monotonic takeover.
//!
//! Maps session id to current live peer, enforces strictly-increasing
//! connection sequences per session, and maintains the secondary
//! project-path index used by the target selector.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::ids::{normalize_project_path, SessionId};
use crate::peer::{Peer, PeerState};

/// One registry entry: the session's current connection sequence and live peer.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub seq: u64,
    pub peer: Arc<Peer>,
    pub created_at: Instant,
}

/// Outcome of [`Registry::accept`].
#[derive(Debug, Clone)]
pub enum AcceptDecision {
    /// A strictly newer connection sequence replaced the previous entry;
    /// the caller must close `.0` with `SUPERSEDED`.
    AcceptWithSupersede(Arc<Peer>),
    /// No prior entry for this session; the peer is now registered.
    Accept,
    /// An equal-or-stale connection sequence arrived late; the caller must
    /// close the new connection with `DUPLICATE_SESSION`. The registry is
    /// unchanged.
    Reject(String),
}

#[derive(Debug, Default)]
struct RegistryState {
    sessions: HashMap<SessionId, RegistryEntry>,
    /// Normalized project path -> session id.
    projects: HashMap<String, SessionId>,
}

/// Session registry. Writers (`accept`, `clear_if_match`, `close_all`) take
/// one critical section each; readers (`session_for_project`, `snapshot`)
/// may run concurrently with each other but not with a writer.
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        crate::error::recover_lock(self.state.lock(), "registry.state")
    }

    /// Accepts or rejects a new connection attempt for `session_id` per the
    /// monotonic-takeover rules:
    ///
    /// 1. No entry for the session: insert and accept.
    /// 2. `seq <= existing.seq`: reject, registry unchanged.
    /// 3. `seq > existing.seq`: replace, caller must close the old transport.
    pub fn accept(
        &self,
        session_id: SessionId,
        seq: u64,
        peer: Arc<Peer>,
        project_path: Option<String>,
    ) -> AcceptDecision {
        let mut state = self.lock();

        let decision = match state.sessions.get(&session_id) {
            None => AcceptDecision::Accept,
            Some(existing) if seq <= existing.seq => {
                return AcceptDecision::Reject(format!(
                    "connection sequence {seq} is not newer than the current sequence {}",
                    existing.seq
                ));
            }
            Some(existing) => AcceptDecision::AcceptWithSupersede(existing.peer.clone()),
        };

        peer.set_project_path(project_path.clone());
        state.sessions.insert(
            session_id.clone(),
            RegistryEntry {
                seq,
                peer,
                created_at: Instant::now(),
            },
        );

        if let Some(path) = project_path {
            state.projects.insert(normalize_project_path(&path), session_id);
        }

        decision
    }

    /// Deletes the entry for `session_id` only if it still points at `peer`.
    ///
    /// Guards against a late disconnect from an already-superseded peer
    /// erasing the newer entry (invariant 3 in the crate docs).
    pub fn clear_if_match(&self, session_id: &SessionId, peer: &Arc<Peer>) -> bool {
        let mut state = self.lock();
        let matches = matches!(state.sessions.get(session_id), Some(entry) if Arc::ptr_eq(&entry.peer, peer));
        if matches {
            state.sessions.remove(session_id);
            state.projects.retain(|_, sid| sid != session_id);
        }
        matches
    }

    /// O(1) lookup of the peer currently bound to a normalized project path.
    pub fn session_for_project(&self, normalized_path: &str) -> Option<Arc<Peer>> {
        let state = self.lock();
        let sid = state.projects.get(normalized_path)?;
        state.sessions.get(sid).map(|e| e.peer.clone())
    }

    /// A stable snapshot of all registered peers for the sweeper to iterate.
    /// Readers must tolerate entries vanishing mid-iteration.
    pub fn snapshot(&self) -> Vec<Arc<Peer>> {
        self.lock().sessions.values().map(|e| e.peer.clone()).collect()
    }

    /// Project paths of every peer currently `Open`.
    pub fn connected_projects(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter(|p| p.state() == PeerState::Open)
            .filter_map(|p| p.project_path())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }

    /// Clears every entry, returning the peers that were registered so the
    /// caller can close their transports outside the lock.
    pub fn clear_all(&self) -> Vec<Arc<Peer>> {
        let mut state = self.lock();
        state.projects.clear();
        state.sessions.drain().map(|(_, e)| e.peer).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::transport::Transport;
    use ech_proto::CloseCode;

    #[derive(Debug, Default)]
    struct NullTransport {
        closed: AtomicBool,
    }

    impl Transport for NullTransport {
        fn send_raw(&self, _data: Vec<u8>) -> bool {
            true
        }
        fn close(&self, _code: CloseCode, _reason: String) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn peer(seq: u64) -> Arc<Peer> {
        Peer::new(
            "c".into(),
            Some(SessionId::from("s1")),
            seq,
            None,
            Arc::new(NullTransport::default()),
        )
    }

    #[test]
    fn first_accept_for_session_succeeds() {
        let reg = Registry::default();
        let p = peer(0);
        let decision = reg.accept(SessionId::from("s1"), 0, p, None);
        assert!(matches!(decision, AcceptDecision::Accept));
    }

    #[test]
    fn monotone_takeover_higher_seq_supersedes_lower() {
        let reg = Registry::default();
        let a = peer(0);
        reg.accept(SessionId::from("s1"), 0, a.clone(), None);

        let b = peer(1);
        let decision = reg.accept(SessionId::from("s1"), 1, b.clone(), None);
        match decision {
            AcceptDecision::AcceptWithSupersede(old) => assert!(Arc::ptr_eq(&old, &a)),
            other => panic!("expected supersede, got {other:?}"),
        }
    }

    #[test]
    fn stale_or_equal_seq_is_rejected_and_registry_unchanged() {
        let reg = Registry::default();
        let a = peer(1);
        reg.accept(SessionId::from("s1"), 1, a.clone(), None);

        let c = peer(0);
        let decision = reg.accept(SessionId::from("s1"), 0, c, None);
        assert!(matches!(decision, AcceptDecision::Reject(_)));

        let equal = peer(1);
        let decision = reg.accept(SessionId::from("s1"), 1, equal, None);
        assert!(matches!(decision, AcceptDecision::Reject(_)));

        let snapshot = reg.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(Arc::ptr_eq(&snapshot[0], &a));
    }

    #[test]
    fn clear_if_match_ignores_late_close_from_superseded_peer() {
        let reg = Registry::default();
        let a = peer(0);
        reg.accept(SessionId::from("s1"), 0, a.clone(), None);
        let b = peer(1);
        reg.accept(SessionId::from("s1"), 1, b.clone(), None);

        // A late close notification from the superseded peer A must not
        // evict B.
        let removed = reg.clear_if_match(&SessionId::from("s1"), &a);
        assert!(!removed);
        assert_eq!(reg.snapshot().len(), 1);
        assert!(Arc::ptr_eq(&reg.snapshot()[0], &b));
    }

    #[test]
    fn clear_if_match_removes_current_peer_and_project_index() {
        let reg = Registry::default();
        let a = peer(0);
        reg.accept(SessionId::from("s1"), 0, a.clone(), Some("/proj".into()));
        assert!(reg.session_for_project("/proj").is_some());

        assert!(reg.clear_if_match(&SessionId::from("s1"), &a));
        assert!(reg.session_for_project("/proj").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn project_index_is_case_and_separator_normalized() {
        let reg = Registry::default();
        let a = peer(0);
        reg.accept(SessionId::from("s1"), 0, a, Some(r"C:\Proj\Root\".into()));
        assert!(reg.session_for_project("c:/proj/root").is_some());
    }
}
