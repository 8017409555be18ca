//! RSA decryption module
//!
//! The client encrypts its random seed with the fixed signing public key;
//! the token response may carry a server seed encrypted under one of several
//! keys selected by a key-identifier field. Both use PKCS#1 v1.5 padding.

use std::collections::HashMap;
use std::fmt;

use anyhow::{Context, Result};
use num_bigint::BigUint;

use crate::error::CryptoError;

/// RSA key pair for encryption/decryption
#[derive(Clone)]
pub struct RsaKeyPair {
    /// RSA modulus (N)
    pub modulus: BigUint,
    /// RSA private exponent (D)
    pub private_exponent: BigUint,
    /// RSA public exponent (E) - typically 65537
    pub public_exponent: BigUint,
}

impl RsaKeyPair {
    /// Create a new RSA key pair from hex strings
    pub fn from_hex(modulus: &str, private_exponent: &str, public_exponent: u64) -> Result<Self> {
        let modulus =
            BigUint::parse_bytes(modulus.as_bytes(), 16).context("Failed to parse RSA modulus")?;

        let private_exponent = BigUint::parse_bytes(private_exponent.as_bytes(), 16)
            .context("Failed to parse RSA private exponent")?;

        Ok(Self {
            modulus,
            private_exponent,
            public_exponent: BigUint::from(public_exponent),
        })
    }

    pub fn new(modulus: BigUint, private_exponent: BigUint, public_exponent: BigUint) -> Self {
        Self {
            modulus,
            private_exponent,
            public_exponent,
        }
    }

    /// Get the key size in bits
    pub fn key_size_bits(&self) -> usize {
        self.modulus.bits() as usize
    }

    /// Get the key size in bytes
    pub fn key_size_bytes(&self) -> usize {
        (self.key_size_bits() + 7) / 8
    }
}

impl fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("key_size_bits", &self.key_size_bits())
            .field("public_exponent", &self.public_exponent)
            // Don't log the private key!
            .finish()
    }
}

/// RSA decryptor for seed blocks
pub struct RsaDecryptor {
    key_pair: RsaKeyPair,
}

impl RsaDecryptor {
    pub fn new(key_pair: RsaKeyPair) -> Self {
        Self { key_pair }
    }

    pub fn from_hex(modulus: &str, private_exponent: &str, public_exponent: u64) -> Result<Self> {
        Ok(Self::new(RsaKeyPair::from_hex(
            modulus,
            private_exponent,
            public_exponent,
        )?))
    }

    /// Raw RSA: plaintext = ciphertext^d mod n, big-endian
    pub fn decrypt_raw(&self, ciphertext: &[u8]) -> std::result::Result<Vec<u8>, CryptoError> {
        if ciphertext.is_empty() {
            return Err(CryptoError::EmptyCiphertext);
        }

        let cipher_int = BigUint::from_bytes_be(ciphertext);
        if cipher_int >= self.key_pair.modulus {
            return Err(CryptoError::BlockTooLarge);
        }

        let plain_int = cipher_int.modpow(&self.key_pair.private_exponent, &self.key_pair.modulus);
        Ok(plain_int.to_bytes_be())
    }

    /// Decrypt and strip PKCS#1 v1.5 block-type-2 padding.
    ///
    /// After the big-endian conversion the leading 0x00 of the padded block
    /// is already gone, so a valid block reads `02 <padding> 00 <message>`.
    pub fn decrypt_pkcs1(&self, ciphertext: &[u8]) -> std::result::Result<Vec<u8>, CryptoError> {
        let block = self.decrypt_raw(ciphertext)?;

        if block.first() != Some(&0x02) {
            return Err(CryptoError::InvalidPadding);
        }
        let separator = block[1..]
            .iter()
            .position(|&b| b == 0x00)
            .ok_or(CryptoError::InvalidPadding)?;
        // At least 8 nonzero padding bytes before the separator
        if separator < 8 {
            return Err(CryptoError::InvalidPadding);
        }

        Ok(block[separator + 2..].to_vec())
    }

    /// Decrypt a PKCS#1 v1.5 block carrying a big-endian 64-bit seed
    pub fn decrypt_seed(&self, ciphertext: &[u8]) -> std::result::Result<u64, CryptoError> {
        let message = self.decrypt_pkcs1(ciphertext)?;
        if message.len() != 8 {
            return Err(CryptoError::SeedLength(message.len()));
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&message);
        Ok(u64::from_be_bytes(buf))
    }

    pub fn key_pair(&self) -> &RsaKeyPair {
        &self.key_pair
    }

    /// Expected encrypted block size
    pub fn block_size(&self) -> usize {
        self.key_pair.key_size_bytes()
    }
}

impl fmt::Debug for RsaDecryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaDecryptor")
            .field("key_pair", &self.key_pair)
            .finish()
    }
}

/// RSA encryptor
/// (Used for testing and tooling; the shim itself only decrypts)
pub struct RsaEncryptor {
    key_pair: RsaKeyPair,
}

impl RsaEncryptor {
    pub fn new(key_pair: RsaKeyPair) -> Self {
        Self { key_pair }
    }

    /// Raw RSA: ciphertext = plaintext^e mod n, padded to key size
    pub fn encrypt_raw(&self, plaintext: &[u8]) -> std::result::Result<Vec<u8>, CryptoError> {
        if plaintext.is_empty() {
            return Err(CryptoError::EmptyCiphertext);
        }

        let plain_int = BigUint::from_bytes_be(plaintext);
        if plain_int >= self.key_pair.modulus {
            return Err(CryptoError::BlockTooLarge);
        }

        let cipher_int = plain_int.modpow(&self.key_pair.public_exponent, &self.key_pair.modulus);
        let mut ciphertext = cipher_int.to_bytes_be();

        let key_bytes = self.key_pair.key_size_bytes();
        if ciphertext.len() < key_bytes {
            let mut padded = vec![0u8; key_bytes - ciphertext.len()];
            padded.append(&mut ciphertext);
            ciphertext = padded;
        }
        Ok(ciphertext)
    }

    /// Apply PKCS#1 v1.5 block-type-2 padding and encrypt. Padding bytes are
    /// fixed, which is fine for the decryption tests this exists for.
    pub fn encrypt_pkcs1(&self, message: &[u8]) -> std::result::Result<Vec<u8>, CryptoError> {
        let key_bytes = self.key_pair.key_size_bytes();
        if message.len() + 11 > key_bytes {
            return Err(CryptoError::BlockTooLarge);
        }

        let mut block = Vec::with_capacity(key_bytes - 1);
        block.push(0x02);
        block.resize(key_bytes - 2 - message.len(), 0xaa);
        block.push(0x00);
        block.extend_from_slice(message);
        self.encrypt_raw(&block)
    }
}

/// Process-wide asymmetric key material: the fixed signing key used for
/// client seeds plus the key-id-indexed keys used for server seeds. Built
/// once at startup, shared read-only across sessions.
pub struct KeyRing {
    signing: RsaDecryptor,
    server: HashMap<u32, RsaDecryptor>,
}

impl KeyRing {
    pub fn new(signing: RsaDecryptor, server: HashMap<u32, RsaDecryptor>) -> Self {
        Self { signing, server }
    }

    /// Decrypt the client-supplied 64-bit seed with the signing key
    pub fn decrypt_client_seed(&self, ciphertext: &[u8]) -> std::result::Result<u64, CryptoError> {
        self.signing.decrypt_seed(ciphertext)
    }

    /// Decrypt the server-supplied 64-bit seed with the key selected by id
    pub fn decrypt_server_seed(
        &self,
        key_id: u32,
        ciphertext: &[u8],
    ) -> std::result::Result<u64, CryptoError> {
        let key = self
            .server
            .get(&key_id)
            .ok_or(CryptoError::UnknownKeyId(key_id))?;
        key.decrypt_seed(ciphertext)
    }

    pub fn server_key_count(&self) -> usize {
        self.server.len()
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRing")
            .field("signing", &self.signing)
            .field("server_key_ids", &self.server.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Small primes, test only: p = 61, q = 53, n = 3233, e = 17, d = 2753
    fn small_key_pair() -> RsaKeyPair {
        RsaKeyPair::new(
            BigUint::from(3233u32),
            BigUint::from(2753u32),
            BigUint::from(17u32),
        )
    }

    // 512-bit key, large enough for PKCS#1 v1.5 blocks carrying a u64.
    // Generated once for the test suite; never use outside tests.
    const TEST_N: &str = "7d2be5742569abe235b6d2bdab82b610f5862282b9a1a75aac22f672cbf97c339a4af34718beb80c25953e352fe1e2db9283de56df4a1a7290c7f4e82761d45b";
    const TEST_D: &str = "26f20c7f79d08a2964fb1050f157471cb9b7d56f0520f5f8314ce38f4e45becdc3af6fea95dfca232e980ff56034caa50f8632f74af8a80a989b970498e416c1";

    fn pkcs1_round_trip_key() -> RsaKeyPair {
        RsaKeyPair::from_hex(TEST_N, TEST_D, 65537).unwrap()
    }

    #[test]
    fn test_raw_encrypt_decrypt() {
        let key_pair = small_key_pair();
        let encryptor = RsaEncryptor::new(key_pair.clone());
        let decryptor = RsaDecryptor::new(key_pair);

        let plaintext = vec![65u8];
        let ciphertext = encryptor.encrypt_raw(&plaintext).unwrap();
        let decrypted = decryptor.decrypt_raw(&ciphertext).unwrap();
        assert_eq!(plaintext, decrypted);
    }

    #[test]
    fn test_empty_ciphertext() {
        let decryptor = RsaDecryptor::new(small_key_pair());
        assert!(matches!(
            decryptor.decrypt_raw(&[]),
            Err(CryptoError::EmptyCiphertext)
        ));
    }

    #[test]
    fn test_ciphertext_exceeding_modulus() {
        let decryptor = RsaDecryptor::new(small_key_pair());
        let result = decryptor.decrypt_raw(&[0xff, 0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(CryptoError::BlockTooLarge)));
    }

    #[test]
    fn test_invalid_hex_rejected() {
        assert!(RsaKeyPair::from_hex("not_valid_hex!", "ee", 65537).is_err());
    }

    #[test]
    fn test_seed_round_trip_pkcs1() {
        let key_pair = pkcs1_round_trip_key();
        let encryptor = RsaEncryptor::new(key_pair.clone());
        let decryptor = RsaDecryptor::new(key_pair);

        let seed = 0x1122_3344_5566_7788u64;
        let ciphertext = encryptor.encrypt_pkcs1(&seed.to_be_bytes()).unwrap();
        assert_eq!(decryptor.decrypt_seed(&ciphertext).unwrap(), seed);
    }

    #[test]
    fn test_bad_padding_rejected() {
        let key_pair = pkcs1_round_trip_key();
        let encryptor = RsaEncryptor::new(key_pair.clone());
        let decryptor = RsaDecryptor::new(key_pair);

        // Raw block without the 0x02 marker
        let ciphertext = encryptor.encrypt_raw(&[0x01, 0x02, 0x03]).unwrap();
        assert!(matches!(
            decryptor.decrypt_pkcs1(&ciphertext),
            Err(CryptoError::InvalidPadding)
        ));
    }

    #[test]
    fn test_seed_length_enforced() {
        let key_pair = pkcs1_round_trip_key();
        let encryptor = RsaEncryptor::new(key_pair.clone());
        let decryptor = RsaDecryptor::new(key_pair);

        let ciphertext = encryptor.encrypt_pkcs1(b"short").unwrap();
        assert!(matches!(
            decryptor.decrypt_seed(&ciphertext),
            Err(CryptoError::SeedLength(5))
        ));
    }

    #[test]
    fn test_key_ring_unknown_id() {
        let ring = KeyRing::new(RsaDecryptor::new(pkcs1_round_trip_key()), HashMap::new());
        assert!(matches!(
            ring.decrypt_server_seed(4, &[1, 2, 3]),
            Err(CryptoError::UnknownKeyId(4))
        ));
    }

    #[test]
    fn test_key_ring_routes_by_id() {
        let key_pair = pkcs1_round_trip_key();
        let encryptor = RsaEncryptor::new(key_pair.clone());

        let mut server = HashMap::new();
        server.insert(3u32, RsaDecryptor::new(key_pair.clone()));
        let ring = KeyRing::new(RsaDecryptor::new(key_pair), server);

        let seed = 42u64;
        let ciphertext = encryptor.encrypt_pkcs1(&seed.to_be_bytes()).unwrap();
        assert_eq!(ring.decrypt_server_seed(3, &ciphertext).unwrap(), seed);
    }
}
