//! Subscriber-facing notifications: connection changes on the target project,
//! and forwarded domain events/command replies that matched no correlation.

use ech_proto::Envelope;

/// Emitted whenever the peer bound to the current target project becomes
/// connected or disconnected. Accept emits `true`
/// before the welcome is sent if this peer matches the target; cleanup
/// emits `false` after the peer is marked closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionChangeEvent {
    pub project: String,
    pub connected: bool,
}

/// A full envelope forwarded to subscribers because it matched no pending
/// correlation: either a genuine domain event (`assets_imported`,
/// `selection_changed`, ...) or a reply whose id the caller never tracked.
#[derive(Debug, Clone)]
pub struct DomainEvent {
    pub envelope: Envelope,
}
