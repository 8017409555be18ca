//! Login key-exchange handshake
//!
//! The token request carries the client's random seed, RSA-encrypted under
//! the fixed signing key; the token response carries the server's seed,
//! either in the clear or RSA-encrypted under a key selected by id. Both
//! seeds XOR into the input of the deterministic session-key expansion. The
//! handshake only observes the packets; the pipeline still transcodes them
//! so both endpoints see a well-formed exchange.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::crypto::{derive_session_key, KeyRing};
use crate::error::{Result, ShiftError};
use crate::net::Session;

/// Token request message name (NEW revision, client to server)
pub const TOKEN_REQ_MSG: &str = "GetPlayerTokenReq";
/// Token response message name (OLD revision, server to client)
pub const TOKEN_RSP_MSG: &str = "GetPlayerTokenRsp";

pub fn is_handshake(name: &str) -> bool {
    name == TOKEN_REQ_MSG || name == TOKEN_RSP_MSG
}

/// Observe a decoded token request: recover the client seed. Failures are
/// logged and the handshake simply does not advance; the packet itself is
/// forwarded regardless.
pub fn observe_token_req(keys: &KeyRing, session: &mut Session, value: &Value) {
    let encoded = match value.get("client_rand_key").and_then(Value::as_str) {
        Some(encoded) if !encoded.is_empty() => encoded,
        _ => {
            warn!(session_id = session.id, "Token request carries no client rand key");
            return;
        }
    };
    let ciphertext = match BASE64.decode(encoded) {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!(session_id = session.id, "Client rand key is not valid base64");
            return;
        }
    };
    match keys.decrypt_client_seed(&ciphertext) {
        Ok(seed) => {
            debug!(session_id = session.id, "Client seed recovered");
            session.set_client_seed(seed);
        }
        Err(e) => {
            warn!(session_id = session.id, error = %e, "Client seed decryption failed");
        }
    }
}

/// Observe a decoded token response: combine the seeds, derive the session
/// key and activate the session. A response replayed after the key exists is
/// a fatal state violation; the key is never re-derived.
pub fn observe_token_rsp(keys: &KeyRing, session: &mut Session, value: &Value) -> Result<()> {
    if session.session_key().is_some() {
        return Err(ShiftError::StateViolation(
            "token response replayed after key derivation".into(),
        ));
    }

    let retcode = value.get("retcode").and_then(Value::as_i64).unwrap_or(0);
    if retcode != 0 {
        debug!(session_id = session.id, retcode, "Login rejected upstream");
        return Ok(());
    }

    let uid = value.get("uid").and_then(Value::as_u64).unwrap_or(0) as u32;
    let direct_seed = value
        .get("secret_key_seed")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let seed = if direct_seed != 0 {
        direct_seed
    } else {
        let key_id = value.get("key_id").and_then(Value::as_u64).unwrap_or(0) as u32;
        let encoded = match value.get("server_rand_key").and_then(Value::as_str) {
            Some(encoded) if !encoded.is_empty() => encoded,
            _ => {
                warn!(session_id = session.id, "Token response carries no seed at all");
                return Ok(());
            }
        };
        let ciphertext = match BASE64.decode(encoded) {
            Ok(bytes) => bytes,
            Err(_) => {
                warn!(session_id = session.id, "Server rand key is not valid base64");
                return Ok(());
            }
        };
        let server_seed = match keys.decrypt_server_seed(key_id, &ciphertext) {
            Ok(seed) => seed,
            Err(e) => {
                warn!(
                    session_id = session.id,
                    key_id,
                    error = %e,
                    "Server seed decryption failed"
                );
                return Ok(());
            }
        };
        let client_seed = session.client_seed().unwrap_or_else(|| {
            warn!(
                session_id = session.id,
                "No client seed recorded, combining against zero"
            );
            0
        });
        server_seed ^ client_seed
    };

    session.establish(uid, derive_session_key(seed))?;
    info!(session_id = session.id, uid, "Session key established");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    use crate::crypto::{RsaDecryptor, RsaEncryptor, RsaKeyPair};
    use crate::net::SessionState;

    // Same throwaway 512-bit key as the crypto tests
    const TEST_N: &str = "7d2be5742569abe235b6d2bdab82b610f5862282b9a1a75aac22f672cbf97c339a4af34718beb80c25953e352fe1e2db9283de56df4a1a7290c7f4e82761d45b";
    const TEST_D: &str = "26f20c7f79d08a2964fb1050f157471cb9b7d56f0520f5f8314ce38f4e45becdc3af6fea95dfca232e980ff56034caa50f8632f74af8a80a989b970498e416c1";

    fn key_pair() -> RsaKeyPair {
        RsaKeyPair::from_hex(TEST_N, TEST_D, 65537).unwrap()
    }

    fn key_ring() -> KeyRing {
        let mut server = HashMap::new();
        server.insert(2u32, RsaDecryptor::new(key_pair()));
        KeyRing::new(RsaDecryptor::new(key_pair()), server)
    }

    fn encrypt_seed(seed: u64) -> String {
        let ciphertext = RsaEncryptor::new(key_pair())
            .encrypt_pkcs1(&seed.to_be_bytes())
            .unwrap();
        BASE64.encode(ciphertext)
    }

    fn waiting_session() -> Session {
        let mut session = Session::new(1);
        session.advance(SessionState::WaitingForToken).unwrap();
        session
    }

    #[test]
    fn test_direct_seed_path() {
        let keys = key_ring();
        let mut session = waiting_session();

        observe_token_rsp(
            &keys,
            &mut session,
            &json!({ "uid": 700, "secret_key_seed": 3u64 }),
        )
        .unwrap();

        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.uid(), 700);
        assert_eq!(session.session_key().unwrap()[..], derive_session_key(3)[..]);
    }

    #[test]
    fn test_encrypted_seeds_xor() {
        let keys = key_ring();
        let mut session = waiting_session();

        observe_token_req(
            &keys,
            &mut session,
            &json!({ "client_rand_key": encrypt_seed(0x1) }),
        );
        assert_eq!(session.client_seed(), Some(0x1));

        observe_token_rsp(
            &keys,
            &mut session,
            &json!({ "uid": 5, "key_id": 2, "server_rand_key": encrypt_seed(0x2) }),
        )
        .unwrap();

        // 0x1 ^ 0x2 = 0x3
        assert_eq!(session.session_key().unwrap()[..], derive_session_key(3)[..]);
    }

    #[test]
    fn test_missing_client_seed_combines_with_zero() {
        let keys = key_ring();
        let mut session = waiting_session();

        observe_token_rsp(
            &keys,
            &mut session,
            &json!({ "uid": 5, "key_id": 2, "server_rand_key": encrypt_seed(0x2) }),
        )
        .unwrap();

        assert_eq!(session.session_key().unwrap()[..], derive_session_key(2)[..]);
    }

    #[test]
    fn test_failed_login_does_not_activate() {
        let keys = key_ring();
        let mut session = waiting_session();

        observe_token_rsp(&keys, &mut session, &json!({ "retcode": -1 })).unwrap();

        assert_eq!(session.state(), SessionState::WaitingForToken);
        assert!(session.session_key().is_none());
    }

    #[test]
    fn test_replay_rejected() {
        let keys = key_ring();
        let mut session = waiting_session();

        observe_token_rsp(&keys, &mut session, &json!({ "uid": 5, "secret_key_seed": 9u64 }))
            .unwrap();
        let result =
            observe_token_rsp(&keys, &mut session, &json!({ "uid": 5, "secret_key_seed": 9u64 }));

        assert!(matches!(result, Err(ShiftError::StateViolation(_))));
    }

    #[test]
    fn test_bad_client_key_is_not_fatal() {
        let keys = key_ring();
        let mut session = waiting_session();

        observe_token_req(&keys, &mut session, &json!({ "client_rand_key": "@@@" }));
        assert_eq!(session.client_seed(), None);

        observe_token_req(&keys, &mut session, &json!({}));
        assert_eq!(session.client_seed(), None);
    }
}
