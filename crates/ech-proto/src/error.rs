/// Errors surfaced to a caller of the hub's external surface.
///
/// These are the only errors that propagate past a public call-point; see
/// `ech-hub`'s internal `HubError` for conditions that are logged and
/// recovered locally instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// No peer matches the current target at request time.
    #[error("no connection for the current target project")]
    NoConnection,

    /// The correlation's deadline elapsed before a reply arrived.
    #[error("timed out waiting for a reply")]
    Timeout,

    /// The target peer disconnected while a normal correlation was outstanding.
    #[error("connection closed while waiting for a reply")]
    ConnectionClosed,

    /// A normal correlation was cancelled because the editor entered a
    /// domain-reload phase.
    #[error("cancelled: editor entered compilation")]
    CompileStarted,

    /// The caller-supplied envelope type was invalid; the hub refused to send.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The hub is closing and all pending work is being drained.
    #[error("hub is shutting down")]
    Shutdown,
}
