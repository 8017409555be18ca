//! Session module
//!
//! Per-connection mutable state. A `Session` is exclusively owned by its
//! connection task and handed to the pipeline by `&mut`; packets for one
//! connection are processed strictly in arrival order, so no interior
//! locking is needed. Outbound packets produced by feature injections are
//! forwarded to the transport over a bounded channel.

use tokio::sync::mpsc;
use tracing::debug;

use crate::crypto::SESSION_KEY_LEN;
use crate::error::{CryptoError, Result, ShiftError};

/// Session state in the connection lifecycle. Only ever advances forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Initial state; the pipeline must not be invoked yet
    Inactive,
    /// Handshake in progress; only the token exchange is meaningful
    WaitingForToken,
    /// Session key derived; all registered opcodes flow
    Active,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Inactive => "Inactive",
            SessionState::WaitingForToken => "WaitingForToken",
            SessionState::Active => "Active",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Pending console interaction. One injection sets it on the request leg,
/// the paired response injection consumes it. A single enum instead of
/// independent flags keeps impossible combinations unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingInteraction {
    #[default]
    None,
    /// A chat command was routed to the console; rewrite the chat response
    AwaitingCommandReply,
    /// A chat-history pull targeted the console pseudo-player
    AwaitingConsoleHistory,
    /// A social-detail lookup targeted the console pseudo-player
    AwaitingSocialDetail,
}

/// Whether the transport should encrypt an outbound frame with the session
/// key. The actual encryption is the transport's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptMode {
    None,
    SessionKey,
}

/// A packet queued toward the client through the transport layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    pub opcode: u16,
    pub payload: Vec<u8>,
    pub encrypt: EncryptMode,
}

/// A bridged client connection
pub struct Session {
    /// Unique session identifier
    pub id: u64,
    state: SessionState,
    uid: u32,
    client_seed: Option<u64>,
    session_key: Option<Box<[u8; SESSION_KEY_LEN]>>,
    pending: PendingInteraction,
    /// Outbound packet channel (absent in tests that don't need a transport)
    outbound_tx: Option<mpsc::Sender<OutboundPacket>>,
}

impl Session {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: SessionState::Inactive,
            uid: 0,
            client_seed: None,
            session_key: None,
            pending: PendingInteraction::None,
            outbound_tx: None,
        }
    }

    /// Create a session with an outbound channel to the transport
    pub fn with_channel(id: u64, outbound_tx: mpsc::Sender<OutboundPacket>) -> Self {
        let mut session = Self::new(id);
        session.outbound_tx = Some(outbound_tx);
        session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Advance the session state. Transitions never regress.
    pub fn advance(&mut self, new_state: SessionState) -> Result<()> {
        if new_state < self.state {
            return Err(ShiftError::StateViolation(format!(
                "state regression {} -> {}",
                self.state, new_state
            )));
        }
        if new_state != self.state {
            debug!(
                session_id = self.id,
                old_state = %self.state,
                new_state = %new_state,
                "Session state changed"
            );
            self.state = new_state;
        }
        Ok(())
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn client_seed(&self) -> Option<u64> {
        self.client_seed
    }

    /// Store the decrypted client seed. A retried token request may
    /// legitimately overwrite an earlier value.
    pub fn set_client_seed(&mut self, seed: u64) {
        if self.client_seed.is_some() {
            debug!(session_id = self.id, "Client seed overwritten by retry");
        }
        self.client_seed = Some(seed);
    }

    pub fn session_key(&self) -> Option<&[u8; SESSION_KEY_LEN]> {
        self.session_key.as_deref()
    }

    /// Install the derived key and identity and activate the session.
    /// Rejected if a key was already derived; the key is never recomputed.
    pub fn establish(&mut self, uid: u32, key: Box<[u8; SESSION_KEY_LEN]>) -> Result<()> {
        if self.session_key.is_some() {
            return Err(ShiftError::Crypto(CryptoError::KeyAlreadyDerived));
        }
        self.uid = uid;
        self.session_key = Some(key);
        self.advance(SessionState::Active)
    }

    pub fn pending(&self) -> PendingInteraction {
        self.pending
    }

    pub fn set_pending(&mut self, pending: PendingInteraction) {
        self.pending = pending;
    }

    /// Consume the pending interaction, resetting it to `None`
    pub fn take_pending(&mut self) -> PendingInteraction {
        std::mem::take(&mut self.pending)
    }

    /// Queue a packet toward the client without blocking
    pub fn send(&self, opcode: u16, payload: Vec<u8>, encrypt: EncryptMode) -> Result<()> {
        let tx = match &self.outbound_tx {
            Some(tx) => tx,
            None => {
                debug!(session_id = self.id, opcode, "No outbound channel, packet dropped");
                return Ok(());
            }
        };
        tx.try_send(OutboundPacket {
            opcode,
            payload,
            encrypt,
        })
        .map_err(|e| ShiftError::Send(e.to_string()))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("uid", &self.uid)
            .field("has_key", &self.session_key.is_some())
            .field("pending", &self.pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::derive_session_key;

    #[test]
    fn test_session_creation() {
        let session = Session::new(1);
        assert_eq!(session.id, 1);
        assert_eq!(session.state(), SessionState::Inactive);
        assert_eq!(session.pending(), PendingInteraction::None);
        assert!(session.session_key().is_none());
    }

    #[test]
    fn test_state_advances_forward() {
        let mut session = Session::new(1);
        session.advance(SessionState::WaitingForToken).unwrap();
        assert_eq!(session.state(), SessionState::WaitingForToken);
        session.advance(SessionState::Active).unwrap();
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn test_state_regression_rejected() {
        let mut session = Session::new(1);
        session.advance(SessionState::Active).unwrap();
        assert!(session.advance(SessionState::WaitingForToken).is_err());
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn test_establish_once() {
        let mut session = Session::new(1);
        session.advance(SessionState::WaitingForToken).unwrap();
        session.establish(77, derive_session_key(0x3)).unwrap();

        assert_eq!(session.uid(), 77);
        assert_eq!(session.state(), SessionState::Active);

        let result = session.establish(78, derive_session_key(0x4));
        assert!(matches!(
            result,
            Err(ShiftError::Crypto(CryptoError::KeyAlreadyDerived))
        ));
        assert_eq!(session.uid(), 77);
    }

    #[test]
    fn test_take_pending_resets() {
        let mut session = Session::new(1);
        session.set_pending(PendingInteraction::AwaitingCommandReply);
        assert_eq!(
            session.take_pending(),
            PendingInteraction::AwaitingCommandReply
        );
        assert_eq!(session.pending(), PendingInteraction::None);
    }

    #[test]
    fn test_send_through_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let session = Session::with_channel(1, tx);

        session
            .send(55, vec![1, 2, 3], EncryptMode::SessionKey)
            .unwrap();

        let packet = rx.try_recv().unwrap();
        assert_eq!(packet.opcode, 55);
        assert_eq!(packet.payload, vec![1, 2, 3]);
        assert_eq!(packet.encrypt, EncryptMode::SessionKey);
    }

    #[test]
    fn test_send_without_channel_is_noop() {
        let session = Session::new(1);
        assert!(session.send(55, vec![], EncryptMode::None).is_ok());
    }
}
