//! Two tables of outstanding caller promises keyed by envelope id.
//!
//! The normal table is drained on peer disconnect and on `compile_started`;
//! the reload-surviving table is drained only on its own timeout or on
//! `close_all`, since a refresh reply is expected to arrive after a domain
//! reload, possibly on a different peer (invariant 5).

use std::collections::HashMap;
use std::sync::Mutex;

use ech_proto::CallError;
use serde_json::Map;
use serde_json::Value;
use tokio::sync::oneshot;

struct PendingEntry {
    reply: oneshot::Sender<Result<Map<String, Value>, CallError>>,
    /// The peer this request was sent to; used to scope bulk cancellation
    /// to the disconnecting/compiling peer rather than every outstanding
    /// correlation in the table.
    peer_conn_id: String,
}

#[derive(Default)]
struct Table {
    entries: HashMap<String, PendingEntry>,
}

/// Holds the normal and reload-surviving pending-correlation tables behind
/// independent locks, since they are drained by different triggers and
/// never need to be mutated together atomically.
#[derive(Debug, Default)]
pub struct CorrelationStore {
    normal: Mutex<Table>,
    reload: Mutex<Table>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl CorrelationStore {
    fn lock_normal(&self) -> std::sync::MutexGuard<'_, Table> {
        crate::error::recover_lock(self.normal.lock(), "correlation.normal")
    }

    fn lock_reload(&self) -> std::sync::MutexGuard<'_, Table> {
        crate::error::recover_lock(self.reload.lock(), "correlation.reload")
    }

    /// Registers a normal-table promise for `envelope_id`, returning the
    /// receiver half that `send_and_wait` awaits.
    pub fn insert_normal(
        &self,
        envelope_id: String,
        peer_conn_id: String,
    ) -> oneshot::Receiver<Result<Map<String, Value>, CallError>> {
        let (tx, rx) = oneshot::channel();
        self.lock_normal().entries.insert(
            envelope_id,
            PendingEntry {
                reply: tx,
                peer_conn_id,
            },
        );
        rx
    }

    /// Registers a reload-surviving promise for `envelope_id`.
    pub fn insert_reload(
        &self,
        envelope_id: String,
        peer_conn_id: String,
    ) -> oneshot::Receiver<Result<Map<String, Value>, CallError>> {
        let (tx, rx) = oneshot::channel();
        self.lock_reload().entries.insert(
            envelope_id,
            PendingEntry {
                reply: tx,
                peer_conn_id,
            },
        );
        rx
    }

    /// Per-id test-and-remove: the reload table is checked first, then the
    /// normal table, matching the router's dispatch order. Returns `true`
    /// if some pending entry matched and was resolved.
    pub fn resolve_any(&self, envelope_id: &str, body: Map<String, Value>) -> bool {
        if let Some(entry) = self.lock_reload().entries.remove(envelope_id) {
            let _ = entry.reply.send(Ok(body));
            return true;
        }
        if let Some(entry) = self.lock_normal().entries.remove(envelope_id) {
            let _ = entry.reply.send(Ok(body));
            return true;
        }
        false
    }

    /// Removes a single entry regardless of table, failing it with `err`.
    /// Used by the per-call timeout and explicit cancellation paths, which
    /// know only the envelope id, not which table it lives in.
    pub fn cancel_one(&self, envelope_id: &str, err: CallError) {
        if let Some(entry) = self.lock_normal().entries.remove(envelope_id) {
            let _ = entry.reply.send(Err(err));
            return;
        }
        if let Some(entry) = self.lock_reload().entries.remove(envelope_id) {
            let _ = entry.reply.send(Err(err));
        }
    }

    /// Fails and removes every normal-table entry targeted at `peer_conn_id`.
    /// Used on peer disconnect and on `compile_started` —
    /// the reload table is untouched.
    pub fn cancel_normal_for_peer(&self, peer_conn_id: &str, err: CallError) {
        let mut table = self.lock_normal();
        let ids: Vec<String> = table
            .entries
            .iter()
            .filter(|(_, e)| e.peer_conn_id == peer_conn_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            if let Some(entry) = table.entries.remove(&id) {
                let _ = entry.reply.send(Err(err.clone()));
            }
        }
    }

    /// Fails and removes every reload-table entry, regardless of peer.
    /// Used by `close_all`: reload-surviving pending correlations cannot
    /// survive a hub shutdown.
    pub fn cancel_all_reload(&self, err: CallError) {
        let mut table = self.lock_reload();
        for (_, entry) in table.entries.drain() {
            let _ = entry.reply.send(Err(err.clone()));
        }
    }

    /// Fails and removes every normal-table entry, regardless of peer.
    /// Used by `close_all`.
    pub fn cancel_all_normal(&self, err: CallError) {
        let mut table = self.lock_normal();
        for (_, entry) in table.entries.drain() {
            let _ = entry.reply.send(Err(err.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_any_checks_reload_table_before_normal() {
        let store = CorrelationStore::default();
        let rx_reload = store.insert_reload("id-1".into(), "peer-a".into());
        // Same id inserted into normal too, to prove reload wins the race.
        let rx_normal = store.insert_normal("id-1".into(), "peer-a".into());

        let mut body = Map::new();
        body.insert("ok".into(), Value::Bool(true));
        assert!(store.resolve_any("id-1", body));

        assert!(rx_reload.await.unwrap().is_ok());
        // The normal-table entry for the same id is untouched since
        // resolve_any only removes one match.
        drop(rx_normal);
    }

    #[tokio::test]
    async fn cancel_normal_for_peer_only_touches_that_peer() {
        let store = CorrelationStore::default();
        let rx_a = store.insert_normal("id-a".into(), "peer-a".into());
        let rx_b = store.insert_normal("id-b".into(), "peer-b".into());

        store.cancel_normal_for_peer("peer-a", CallError::ConnectionClosed);

        assert_eq!(rx_a.await.unwrap().unwrap_err(), CallError::ConnectionClosed);
        assert!(!store.resolve_any("id-b", Map::new()));
        drop(rx_b);
    }

    #[tokio::test]
    async fn cancel_normal_for_peer_does_not_touch_reload_table() {
        let store = CorrelationStore::default();
        let rx = store.insert_reload("id-r".into(), "peer-a".into());
        store.cancel_normal_for_peer("peer-a", CallError::CompileStarted);

        let mut body = Map::new();
        body.insert("k".into(), Value::String("v".into()));
        assert!(store.resolve_any("id-r", body));
        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn cancel_all_reload_drains_regardless_of_peer() {
        let store = CorrelationStore::default();
        let rx_a = store.insert_reload("id-a".into(), "peer-a".into());
        let rx_b = store.insert_reload("id-b".into(), "peer-b".into());
        store.cancel_all_reload(CallError::Shutdown);
        assert_eq!(rx_a.await.unwrap().unwrap_err(), CallError::Shutdown);
        assert_eq!(rx_b.await.unwrap().unwrap_err(), CallError::Shutdown);
    }
}
