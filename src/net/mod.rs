//! Networking module
//!
//! Per-connection session state and the outbound packet channel toward the
//! transport layer.

pub mod session;

pub use session::{
    EncryptMode, OutboundPacket, PendingInteraction, Session, SessionState,
};
