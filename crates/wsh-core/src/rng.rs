//! Randomness: a cryptographic default source and a seedable deterministic
//! one used for reproducible chaos-injection tests.

use parking_lot::Mutex;
use rand::RngCore;

/// A source of random bytes.
pub trait Rng: Send + Sync + std::fmt::Debug {
    /// Returns `n` random bytes.
    fn get(&self, n: usize) -> Vec<u8>;

    /// Returns a random `f64` in `[0, 1)`, built from [`Rng::get`].
    fn next_f64(&self) -> f64 {
        let bytes = self.get(8);
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes);
        // Use the top 53 bits for a uniform double in [0, 1), the standard
        // construction for turning a random u64 into a random float.
        let bits = u64::from_le_bytes(buf) >> 11;
        (bits as f64) / ((1u64 << 53) as f64)
    }
}

/// Cryptographically secure RNG, backed by the OS random source.
#[derive(Debug, Default)]
pub struct CryptoRng;

impl CryptoRng {
    /// Creates a new crypto RNG handle.
    pub fn new() -> Self {
        Self
    }
}

impl Rng for CryptoRng {
    fn get(&self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        rand::rngs::OsRng.fill_bytes(&mut buf);
        buf
    }
}

/// A seedable `xorshift128+` RNG. Same seed, same output sequence — the only
/// randomness the chaos engine may use when reproducibility is required.
#[derive(Debug)]
pub struct SeededRng {
    state: Mutex<[u64; 2]>,
}

impl SeededRng {
    /// Creates a seeded RNG. The second state word is mixed with the
    /// constant multiplier `2654435761` (Knuth's multiplicative hash) so
    /// that a seed of zero still produces a non-degenerate stream.
    pub fn new(seed: u64) -> Self {
        let s0 = seed;
        let s1 = seed.wrapping_mul(2_654_435_761);
        let s1 = if s1 == 0 { 1 } else { s1 };
        let s0 = if s0 == 0 && s1 == 1 { 1 } else { s0 };
        Self {
            state: Mutex::new([s0, s1]),
        }
    }

    fn next_u64(&self) -> u64 {
        let mut state = self.state.lock();
        let mut s1 = state[0];
        let s0 = state[1];
        state[0] = s0;
        s1 ^= s1 << 23;
        s1 ^= s1 >> 17;
        s1 ^= s0 ^ (s0 >> 26);
        state[1] = s1;
        s0.wrapping_add(s1)
    }
}

impl Rng for SeededRng {
    fn get(&self, n: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            out.extend_from_slice(&self.next_u64().to_le_bytes());
        }
        out.truncate(n);
        out
    }
}

/// Convenience constructor for a seeded RNG.
pub fn seeded(seed: u64) -> SeededRng {
    SeededRng::new(seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let a = SeededRng::new(999);
        let b = SeededRng::new(999);
        let seq_a: Vec<u8> = (0..10).flat_map(|_| a.get(4)).collect();
        let seq_b: Vec<u8> = (0..10).flat_map(|_| b.get(4)).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn different_seeds_diverge() {
        let a = SeededRng::new(1);
        let b = SeededRng::new(2);
        assert_ne!(a.get(16), b.get(16));
    }

    #[test]
    fn crypto_rng_returns_requested_length() {
        let rng = CryptoRng::new();
        assert_eq!(rng.get(32).len(), 32);
    }
}
