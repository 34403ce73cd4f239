//! Shared broker-style state for the hub, split by concern:
//! registry, correlation tables, and target selector each live behind their
//! own lock, and no code path acquires more than one at a time across an
//! await point or a transport send.

pub mod acceptor;
pub mod correlation;
pub mod events;
pub mod hub;
pub mod registry;
pub mod router;
pub mod sweeper;
pub mod target;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use events::{ConnectionChangeEvent, DomainEvent};

struct SweeperTask {
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

/// The hub's shared state, owned by an `Arc` and handed to every background
/// task and every peer runtime.
#[derive(Debug)]
pub(crate) struct HubCore {
    pub registry: registry::Registry,
    pub correlation: correlation::CorrelationStore,
    pub target: target::TargetSelector,
    pub config: HubConfig,
    pub connection_change: broadcast::Sender<ConnectionChangeEvent>,
    pub domain_event: broadcast::Sender<DomainEvent>,
    suspended_until: Mutex<Instant>,
    sweeper: Mutex<Option<SweeperTask>>,
}

impl std::fmt::Debug for SweeperTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweeperTask").finish()
    }
}

impl HubCore {
    pub fn new(config: HubConfig) -> Arc<Self> {
        let (connection_change, _) = broadcast::channel(64);
        let (domain_event, _) = broadcast::channel(256);
        Arc::new(Self {
            registry: registry::Registry::default(),
            correlation: correlation::CorrelationStore::default(),
            target: target::TargetSelector::default(),
            config,
            connection_change,
            domain_event,
            suspended_until: Mutex::new(Instant::now()),
            sweeper: Mutex::new(None),
        })
    }

    /// Extends the sweeper suspension window; never shortens it.
    pub fn suspend(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut guard = crate::error::recover_lock(self.suspended_until.lock(), "core.suspended_until");
        if deadline > *guard {
            *guard = deadline;
        }
    }

    pub fn is_suspended(&self) -> bool {
        Instant::now() < *crate::error::recover_lock(self.suspended_until.lock(), "core.suspended_until")
    }

    /// Spawns the liveness sweeper if it is not already running. Called from
    /// `accept` when a peer is admitted into a possibly-empty registry.
    /// Restart is implicit: cleanup stops the sweeper once the registry is
    /// empty, and the next accept starts it again.
    pub fn ensure_sweeper_started(self: &Arc<Self>) {
        let mut guard = crate::error::recover_lock(self.sweeper.lock(), "core.sweeper");
        if guard.is_some() {
            return;
        }
        let shutdown = CancellationToken::new();
        let core = self.clone();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            sweeper::run(core, token).await;
        });
        *guard = Some(SweeperTask { handle, shutdown });
    }

    /// Stops the sweeper once the registry has become empty.
    pub fn stop_sweeper_if_idle(&self) {
        if !self.registry.is_empty() {
            return;
        }
        self.shutdown_sweeper();
    }

    /// Unconditionally stops the sweeper; used by `close_all`.
    pub fn shutdown_sweeper(&self) {
        let task = crate::error::recover_lock(self.sweeper.lock(), "core.sweeper").take();
        if let Some(task) = task {
            task.shutdown.cancel();
            task.handle.abort();
        }
    }
}
