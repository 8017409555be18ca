//! Packet interception pipeline
//!
//! Every deframed, decrypted packet enters here as `(opcode, direction,
//! payload)` together with its session. The pipeline gates on session state,
//! drives the login handshake, re-dispatches structural envelopes
//! recursively, fires console injections, and otherwise transcodes between
//! revisions. Unregistered opcodes pass through byte-identical.
//!
//! Per-packet decode and crypto failures are logged and the original bytes
//! are forwarded; only a state violation is fatal for the connection.

use tracing::{trace, warn};

use crate::crypto::KeyRing;
use crate::error::{Result, ShiftError};
use crate::inject::Injections;
use crate::net::{Session, SessionState};
use crate::shift::batch::reshift_batch;
use crate::shift::handshake;
use crate::shift::invoke::{reshift_invoke_args, DispatchTables};
use crate::shift::registry::{Direction, MessageRegistry, Opcode, RegistryEntry};
use crate::shift::transcoder::Transcoder;

/// Upper bound on nested re-dispatch (batches inside batches)
pub const MAX_SHIFT_DEPTH: usize = 4;

/// A packet after revision shifting, carrying its outgoing opcode value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftedPacket {
    pub opcode: u16,
    pub payload: Vec<u8>,
}

fn passthrough(opcode: Opcode, payload: &[u8]) -> ShiftedPacket {
    ShiftedPacket {
        opcode: opcode.value,
        payload: payload.to_vec(),
    }
}

/// The assembled interception pipeline, shared read-only across sessions
pub struct Pipeline {
    registry: MessageRegistry,
    transcoder: Transcoder,
    tables: DispatchTables,
    keys: KeyRing,
    /// Console injections; `None` when the console is disabled
    console: Option<Injections>,
}

impl Pipeline {
    pub fn new(
        registry: MessageRegistry,
        transcoder: Transcoder,
        tables: DispatchTables,
        keys: KeyRing,
        console: Option<Injections>,
    ) -> Self {
        Self {
            registry,
            transcoder,
            tables,
            keys,
            console,
        }
    }

    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    pub fn tables(&self) -> &DispatchTables {
        &self.tables
    }

    pub fn console_enabled(&self) -> bool {
        self.console.is_some()
    }

    /// Shift one packet. `depth` is 0 for packets arriving from the
    /// transport and grows by one per nested re-dispatch.
    pub fn pre_handle(
        &self,
        session: &mut Session,
        opcode: Opcode,
        payload: &[u8],
        depth: usize,
    ) -> Result<ShiftedPacket> {
        if depth > MAX_SHIFT_DEPTH {
            return Err(ShiftError::DepthExceeded {
                depth,
                max: MAX_SHIFT_DEPTH,
            });
        }

        match session.state() {
            SessionState::Inactive => Err(ShiftError::StateViolation(format!(
                "packet {} received before the handshake began",
                opcode.value
            ))),
            SessionState::WaitingForToken => self.handle_waiting(session, opcode, payload),
            SessionState::Active => self.handle_active(session, opcode, payload, depth),
        }
    }

    /// Handshake in progress: the token exchange is observed and transcoded,
    /// everything else passes through with no side effects
    fn handle_waiting(
        &self,
        session: &mut Session,
        opcode: Opcode,
        payload: &[u8],
    ) -> Result<ShiftedPacket> {
        match self.registry.lookup(opcode) {
            Some(entry) if handshake::is_handshake(&entry.name) => {
                self.handle_handshake(session, entry, opcode, payload)
            }
            _ => {
                trace!(
                    session_id = session.id,
                    opcode = opcode.value,
                    "Pre-login packet, passthrough"
                );
                Ok(passthrough(opcode, payload))
            }
        }
    }

    fn handle_active(
        &self,
        session: &mut Session,
        opcode: Opcode,
        payload: &[u8],
        depth: usize,
    ) -> Result<ShiftedPacket> {
        let Some(entry) = self.registry.lookup(opcode) else {
            trace!(
                opcode = opcode.value,
                direction = %opcode.direction,
                "Unregistered opcode, passthrough"
            );
            return Ok(passthrough(opcode, payload));
        };
        let direction = opcode.direction;

        if handshake::is_handshake(&entry.name) {
            // Late or replayed handshake traffic; the handler decides
            return self.handle_handshake(session, entry, opcode, payload);
        }
        if self.tables.is_batch(&entry.name) {
            return Ok(self.handle_batch(session, entry, opcode, payload, depth));
        }
        if let Some(table) = self.tables.invoke_for(&entry.name) {
            let mut value = match self.transcoder.decode(&entry.name, direction, payload) {
                Ok(value) => value,
                Err(e) => return Ok(self.forward_undecodable(entry, opcode, payload, &e)),
            };
            reshift_invoke_args(table, &self.transcoder, direction, &mut value);
            return Ok(self.encode_shifted(entry, opcode, payload, &value));
        }

        let mut value = match self.transcoder.decode(&entry.name, direction, payload) {
            Ok(value) => value,
            Err(e) => return Ok(self.forward_undecodable(entry, opcode, payload, &e)),
        };
        if let Some(console) = &self.console {
            match direction {
                Direction::ClientToServer => console.observe(session, &entry.name, &value),
                Direction::ServerToClient => {
                    console.rewrite(session, &entry.name, &mut value);
                }
            }
        }
        Ok(self.encode_shifted(entry, opcode, payload, &value))
    }

    fn handle_batch(
        &self,
        session: &mut Session,
        entry: &RegistryEntry,
        opcode: Opcode,
        payload: &[u8],
        depth: usize,
    ) -> ShiftedPacket {
        let mut value = match self.transcoder.decode(&entry.name, opcode.direction, payload) {
            Ok(value) => value,
            Err(e) => return self.forward_undecodable(entry, opcode, payload, &e),
        };
        reshift_batch(self, session, opcode.direction, &mut value, depth);
        self.encode_shifted(entry, opcode, payload, &value)
    }

    fn handle_handshake(
        &self,
        session: &mut Session,
        entry: &RegistryEntry,
        opcode: Opcode,
        payload: &[u8],
    ) -> Result<ShiftedPacket> {
        let value = match self.transcoder.decode(&entry.name, opcode.direction, payload) {
            Ok(value) => value,
            Err(e) => return Ok(self.forward_undecodable(entry, opcode, payload, &e)),
        };
        match (entry.name.as_str(), opcode.direction) {
            (handshake::TOKEN_REQ_MSG, Direction::ClientToServer) => {
                handshake::observe_token_req(&self.keys, session, &value);
            }
            (handshake::TOKEN_RSP_MSG, Direction::ServerToClient) => {
                handshake::observe_token_rsp(&self.keys, session, &value)?;
            }
            // A handshake message on the unexpected leg still transcodes
            _ => {}
        }
        Ok(self.encode_shifted(entry, opcode, payload, &value))
    }

    /// Encode under the target revision, falling back to the original bytes
    /// when the intermediate form does not fit the target schema
    fn encode_shifted(
        &self,
        entry: &RegistryEntry,
        opcode: Opcode,
        payload: &[u8],
        value: &serde_json::Value,
    ) -> ShiftedPacket {
        match self.transcoder.encode(&entry.name, opcode.direction, value) {
            Ok(shifted) => ShiftedPacket {
                opcode: entry.outgoing(opcode.direction),
                payload: shifted,
            },
            Err(e) => self.forward_undecodable(entry, opcode, payload, &e),
        }
    }

    fn forward_undecodable(
        &self,
        entry: &RegistryEntry,
        opcode: Opcode,
        payload: &[u8],
        error: &crate::error::DecodeError,
    ) -> ShiftedPacket {
        warn!(
            message = %entry.name,
            opcode = opcode.value,
            error = %error,
            "Payload does not shift, forwarded unmodified"
        );
        passthrough(opcode, payload)
    }
}
