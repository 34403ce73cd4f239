//! Editor Connection Hub: multiplexes a request/reply control protocol over
//! many persistent duplex connections from external editor processes.
//!
//! # Purpose
//!
//! - Accept reconnecting editor connections identified by a session id, and
//!   enforce monotonic takeover between reconnect attempts.
//! - Tolerate long adversarial pauses (editor compilation, domain reload)
//!   without mistaking them for a dead peer.
//! - Correlate a typed request sent to a peer with its eventual typed reply,
//!   even when the reply arrives on a different physical connection than the
//!   one the request went out on.
//! - Route caller commands to the one peer bound to the currently selected
//!   project path.
//!
//! Transport is abstracted behind [`Transport`]; this crate never opens a
//! socket itself. A host binds a real duplex connection (WebSocket, pipe,
//! whatever) to [`EditorHub::accept`].
//!
//! # Mental model
//!
//! - [`EditorHub`] is the public surface: `send_and_wait`, `send_refresh_and_wait`,
//!   `set_target_project`, `connected_projects`, `subscribe_connection_change`,
//!   `subscribe_domain_event`, `close_all`.
//! - Internally, [`core::HubCore`] holds the session registry, the two
//!   correlation tables, and the target selector, each behind its own lock.
//! - [`Peer`] is one live connection; its mutable fields (liveness, timestamps,
//!   state) are behind a single per-peer lock, touched by the receive loop,
//!   the sweeper, and the router.
//!
//! # Invariants
//!
//! 1. At most one peer is `Open` per session id at any instant.
//!    Enforced in: `Registry::accept`. Tested by:
//!    `core::registry::tests::first_accept_for_session_succeeds`.
//! 2. Connection sequence is strictly monotone per session; a late or equal
//!    sequence is rejected, never silently ignored.
//!    Enforced in: `Registry::accept`. Tested by:
//!    `core::registry::tests::monotone_takeover_higher_seq_supersedes_lower`
//!    and `::stale_or_equal_seq_is_rejected_and_registry_unchanged`.
//! 3. A late disconnect notification from a superseded peer never evicts the
//!    newer peer (`clear_if_match` compares peer identity, not session id).
//!    Enforced in: `Registry::clear_if_match`. Tested by:
//!    `core::registry::tests::clear_if_match_ignores_late_close_from_superseded_peer`.
//! 4. A reload-surviving correlation is resolved only by a matching reply or
//!    cancelled only by its own timeout or `close_all` — never by the
//!    disconnect or `compile_started` of the peer that originally received it.
//!    Enforced in: `core::correlation`, `core::router`. Tested by: `tests/scenarios.rs::s3_reload_survival`.
//! 5. The sweeper never shortens a suspension window; successive `suspend`
//!    calls take the max of the requested deadlines.
//!    Enforced in: `core::HubCore::suspend`. Tested by: `core::tests::suspend_never_shortens`.
//! 6. Registry and correlation-table mutation never happens while a transport
//!    send is in flight, and vice versa; no lock is held across a `.await`.
//!    Enforced in: every `core` module. Tested by: review (no dedicated test
//!    can observe a lock-ordering violation directly; see `core/mod.rs` docs).
//!
//! # Concurrency
//!
//! Registry, the two correlation tables, the target selector, and each
//! peer's mutable fields are independent `std::sync::Mutex`-guarded regions.
//! A caller never holds more than one at a time across an await point.
//! Transport sends happen after releasing whatever lock produced the sink,
//! matching the no-deadlock rule: never do I/O while holding a registry or
//! correlation lock.

mod config;
mod core;
mod error;
mod ids;
mod peer;
mod transport;

pub use config::HubConfig;
pub use core::acceptor::{AcceptOutcome, Handshake};
pub use core::events::{ConnectionChangeEvent, DomainEvent};
pub use core::hub::EditorHub;
pub use ech_proto::{CallError, CloseCode, Envelope, Source};
pub use error::HubError;
pub use ids::SessionId;
pub use peer::{Peer, PeerSnapshot, PeerState};
pub use transport::Transport;
