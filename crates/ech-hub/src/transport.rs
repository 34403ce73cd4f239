use ech_proto::CloseCode;

/// A handle to the outbound half of one duplex connection.
///
/// Implementations own the single-writer queue that guarantees frames sent
/// on one peer are never interleaved at the byte level
/// (ordering guarantee). The hub never reads from a transport directly;
/// a host binding drives the receive loop and feeds frames into
/// [`crate::EditorHub::handle_incoming`].
pub trait Transport: Send + Sync + std::fmt::Debug + 'static {
    /// Enqueue a raw frame for writing. Returns `false` if the transport is
    /// already known to be dead, which the caller treats as a send failure
    /// and triggers authoritative peer cleanup.
    fn send_raw(&self, data: Vec<u8>) -> bool;

    /// Request that the connection be closed with the given code and reason.
    /// Must not block; the actual close happens on whatever task owns the
    /// transport's write half.
    fn close(&self, code: CloseCode, reason: String);
}
