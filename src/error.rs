//! Error handling module
//!
//! Defines the error types for the wireshift shim. Per-packet failures
//! (`DecodeError`, `CryptoError`) are contained at the smallest enclosing
//! unit and logged; only `StateViolation` is fatal for a connection.

use thiserror::Error;

/// Main error type for the wireshift shim
#[derive(Error, Debug)]
pub enum ShiftError {
    /// Payload does not parse under the expected schema
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Asymmetric or key-derivation failure
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Pipeline invoked out of contract; fatal for the connection
    #[error("Protocol state violation: {0}")]
    StateViolation(String),

    /// Nested re-dispatch exceeded the recursion bound
    #[error("Shift depth exceeded: {depth} (max {max})")]
    DepthExceeded { depth: usize, max: usize },

    /// Outbound channel to the transport is gone or full
    #[error("Send error: {0}")]
    Send(String),
}

/// Schema decoding errors
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Truncated varint")]
    TruncatedVarint,

    #[error("Truncated payload: need {need} bytes, {have} remain")]
    Truncated { need: usize, have: usize },

    #[error("Field {field} has wire type {got}, expected {expected}")]
    WireType { field: String, expected: u8, got: u8 },

    #[error("Length-delimited field overruns payload: {len} bytes")]
    LengthOverrun { len: u64 },

    #[error("Message '{0}' not present in catalog")]
    UnknownMessage(String),

    #[error("Invalid UTF-8 in string field '{0}'")]
    InvalidUtf8(String),

    #[error("Invalid base64 in bytes field '{0}'")]
    InvalidBase64(String),

    #[error("Intermediate value for field '{field}' is not a {expected}")]
    ValueType { field: String, expected: &'static str },
}

/// Cryptographic errors
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Empty ciphertext")]
    EmptyCiphertext,

    #[error("Ciphertext does not fit the RSA modulus")]
    BlockTooLarge,

    #[error("Invalid PKCS#1 v1.5 padding")]
    InvalidPadding,

    #[error("Decrypted seed has {0} bytes, expected 8")]
    SeedLength(usize),

    #[error("No server key registered for key id {0}")]
    UnknownKeyId(u32),

    #[error("Invalid base64 in encrypted seed")]
    InvalidBase64,

    #[error("Session key already derived")]
    KeyAlreadyDerived,
}

/// Result type alias for wireshift operations
pub type Result<T> = std::result::Result<T, ShiftError>;
