//! wireshift - protocol-revision shim
//!
//! Bridges a game client speaking the NEW protocol revision to a server
//! speaking the OLD one. The transport host deframes and decrypts packets
//! and feeds them through the [`shift::Pipeline`]; the shim rewrites
//! opcodes and payloads between revisions, drives the login key exchange,
//! and optionally injects an administrative console into the client's chat
//! and social surfaces.

pub mod config;
pub mod crypto;
pub mod error;
pub mod inject;
pub mod net;
pub mod proto;
pub mod shift;
pub mod state;

pub use config::Config;
pub use error::{Result, ShiftError};
pub use net::{Session, SessionState};
pub use shift::{Direction, Opcode, Pipeline, ShiftedPacket};
pub use state::AppState;

/// Version of the shim
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
