/// Close codes the hub uses on the underlying duplex transport.
///
/// Values match the WebSocket close-code space so the server crate can hand
/// these straight to a `WebSocket::close` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Orderly close.
    Normal,
    /// Idle timeout or shutdown drain.
    GoingAway,
    /// Missed probes exhausted, or any other forced termination.
    InternalError,
    /// Replaced by a newer connection on the same session.
    Superseded,
    /// Rejected: an older connection sequence arrived after a newer one.
    DuplicateSession,
    /// Reserved: project identity mismatch.
    ProjectMismatch,
}

impl CloseCode {
    pub const fn code(self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::InternalError => 1011,
            CloseCode::Superseded => 4001,
            CloseCode::DuplicateSession => 4002,
            CloseCode::ProjectMismatch => 4006,
        }
    }

    pub const fn reason(self) -> &'static str {
        match self {
            CloseCode::Normal => "normal",
            CloseCode::GoingAway => "going away",
            CloseCode::InternalError => "internal error",
            CloseCode::Superseded => "superseded by a newer connection",
            CloseCode::DuplicateSession => "duplicate session: stale connection sequence",
            CloseCode::ProjectMismatch => "project mismatch",
        }
    }
}
