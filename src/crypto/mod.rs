//! Cryptography module
//!
//! Cryptographic primitives used by the shim:
//! - RSA (raw modexp + PKCS#1 v1.5) for decrypting handshake seeds
//! - MT19937-64 expansion of the combined seed into the session key

pub mod mt64;
pub mod rsa;

// Re-export commonly used types
pub use mt64::{derive_session_key, Mt19937_64, SESSION_KEY_LEN};
pub use rsa::{KeyRing, RsaDecryptor, RsaEncryptor, RsaKeyPair};
