//! Seeded RNG for deterministic synthetic workloads (no OS entropy).
//!
//! The mapping from `u64` to the ChaCha20 32-byte seed is explicit:
//! `seed.to_le_bytes()` into the first 8 bytes, the rest zero. This avoids
//! endianness ambiguity and keeps the stream stable across platforms.

use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};

/// Deterministic RNG seeded only from an explicit `u64`.
#[derive(Debug, Clone)]
pub struct ReplayRng(ChaCha20Rng);

impl ReplayRng {
    #[inline]
    pub fn from_seed_u64(seed: u64) -> Self {
        let mut seed32 = [0u8; 32];
        seed32[..8].copy_from_slice(&seed.to_le_bytes());
        Self(ChaCha20Rng::from_seed(seed32))
    }

    /// Draw the next u64 from the stream.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    /// Unbiased integer in `[0, n)` via rejection sampling with the standard
    /// threshold trick (`threshold = 2^64 mod n`). Returns `None` if `n == 0`.
    pub fn gen_range(&mut self, n: u64) -> Option<u64> {
        if n == 0 {
            return None;
        }
        let threshold = n.wrapping_neg() % n;
        loop {
            let x = self.next_u64();
            if x >= threshold {
                return Some(x % n);
            }
        }
    }

    /// Choose an index in `[0, len)`; `None` on an empty slice.
    pub fn choose_index(&mut self, len: usize) -> Option<usize> {
        self.gen_range(len as u64).map(|v| v as usize)
    }
}
