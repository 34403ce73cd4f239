//! Wire contract for the Editor Connection Hub.
//!
//! This crate defines the envelope format that editor processes and the hub
//! exchange, the codec that parses and emits it, the close codes used on the
//! underlying duplex transport, and the error kinds a caller of the hub's
//! external surface can observe.
//!
//! Kept separate from `ech-hub` so that downstream consumers (the agent loop,
//! tool wrappers, anything that only needs to know the shape of a message)
//! can depend on the wire types without pulling in the runtime.

mod close_codes;
mod envelope;
mod error;

pub use close_codes::CloseCode;
pub use envelope::{CodecError, Envelope, Source, ACK_REQUIRED_TYPES};
pub use error::CallError;
