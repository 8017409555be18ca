//! MT19937-64 generator and session key expansion
//!
//! The session's symmetric key is a 4096-byte XOR pad expanded from the
//! 64-bit combined handshake seed with a Mersenne Twister. The expansion is
//! fixed: seed the generator, reseed it with its first output, discard one
//! more output, then emit 512 big-endian words. Both halves of the bridged
//! connection derive the identical pad from the identical seed.
//!
//! Reference: Nishimura & Matsumoto, mt19937-64.c

const NN: usize = 312;
const MM: usize = 156;
const MATRIX_A: u64 = 0xb502_6f5a_a966_19e9;
const UPPER_MASK: u64 = 0xffff_ffff_8000_0000;
const LOWER_MASK: u64 = 0x0000_0000_7fff_ffff;

/// Length of the derived session key in bytes
pub const SESSION_KEY_LEN: usize = 4096;

/// 64-bit Mersenne Twister state
pub struct Mt19937_64 {
    mt: [u64; NN],
    index: usize,
}

impl Mt19937_64 {
    /// Create a generator from a 64-bit seed
    pub fn new(seed: u64) -> Self {
        let mut mt = [0u64; NN];
        mt[0] = seed;
        for i in 1..NN {
            mt[i] = 6_364_136_223_846_793_005u64
                .wrapping_mul(mt[i - 1] ^ (mt[i - 1] >> 62))
                .wrapping_add(i as u64);
        }
        Self { mt, index: NN }
    }

    /// Get the next value from the generator
    pub fn next_u64(&mut self) -> u64 {
        if self.index >= NN {
            self.twist();
        }

        let mut x = self.mt[self.index];
        self.index += 1;

        x ^= (x >> 29) & 0x5555_5555_5555_5555;
        x ^= (x << 17) & 0x71d6_7fff_eda6_0000;
        x ^= (x << 37) & 0xfff7_eee0_0000_0000;
        x ^= x >> 43;
        x
    }

    /// Regenerate the state block
    fn twist(&mut self) {
        for i in 0..NN {
            let x = (self.mt[i] & UPPER_MASK) | (self.mt[(i + 1) % NN] & LOWER_MASK);
            let mut next = x >> 1;
            if x & 1 != 0 {
                next ^= MATRIX_A;
            }
            self.mt[i] = self.mt[(i + MM) % NN] ^ next;
        }
        self.index = 0;
    }
}

impl std::fmt::Debug for Mt19937_64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mt19937_64")
            .field("index", &self.index)
            .finish()
    }
}

/// Derive the 4096-byte session key from the combined handshake seed
pub fn derive_session_key(seed: u64) -> Box<[u8; SESSION_KEY_LEN]> {
    let mut seeder = Mt19937_64::new(seed);
    let mut generator = Mt19937_64::new(seeder.next_u64());
    generator.next_u64(); // first output is discarded

    let mut key = Box::new([0u8; SESSION_KEY_LEN]);
    for chunk in key.chunks_exact_mut(8) {
        chunk.copy_from_slice(&generator.next_u64().to_be_bytes());
    }
    key
}
