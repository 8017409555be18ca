//! Revision shifting
//!
//! The heart of the shim: opcode mapping between revisions (`registry`),
//! generic payload conversion (`transcoder`), the login key exchange
//! (`handshake`), recursive envelope re-dispatch (`batch`, `invoke`), and
//! the per-packet interception pipeline that ties them together
//! (`pipeline`).

pub mod batch;
pub mod handshake;
pub mod invoke;
pub mod pipeline;
pub mod registry;
pub mod transcoder;

pub use invoke::DispatchTables;
pub use pipeline::{Pipeline, ShiftedPacket, MAX_SHIFT_DEPTH};
pub use registry::{Direction, MessageRegistry, Opcode, RegistryEntry};
pub use transcoder::Transcoder;
