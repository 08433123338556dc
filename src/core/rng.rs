//! Deterministic Random Number Generator
//!
//! 32-bit xorshift with the (13, 17, 5) shift triple. The generator state is a
//! single word, so it can be logged, stored in a checkpoint and restored
//! exactly. Given the same seed and call sequence, the output is identical on
//! every platform and in every client build.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

/// Deterministic PRNG (xorshift32).
///
/// `Clone` yields an independent generator whose future output matches the
/// source until either one is advanced.
///
/// # Example
///
/// ```
/// use fortress_sim::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(42);
/// let mut b = a.clone();
/// assert_eq!(a.next_u32(), b.next_u32());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: u32,
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(1)
    }
}

impl DeterministicRng {
    /// Create a new RNG. A zero seed is coerced to 1 (zero never advances).
    pub fn new(seed: u32) -> Self {
        Self { state: non_zero(seed) }
    }

    /// Advance and return the next 32-bit value.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform float in `[0, 1)`. Never returns 1.0.
    ///
    /// Presentation and probability checks only; simulation quantities stay in
    /// fixed-point.
    #[inline]
    pub fn next_float(&mut self) -> f64 {
        self.next_u32() as f64 / 4_294_967_296.0
    }

    /// Integer in `[min, max]`, both inclusive.
    ///
    /// Modulo reduction; `min == max` returns `min` without advancing.
    #[inline]
    pub fn next_int(&mut self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        let range = (max as i64 - min as i64 + 1) as u64;
        let offset = self.next_u32() as u64 % range;
        (min as i64 + offset as i64) as i32
    }

    /// Bernoulli draw with probability `p`.
    ///
    /// Always consumes one value. `p <= 0` is always false and `p >= 1` always
    /// true because `next_float` lies in `[0, 1)`.
    #[inline]
    pub fn next_bool(&mut self, probability: f64) -> bool {
        self.next_float() < probability
    }

    /// Fair coin flip.
    #[inline]
    pub fn coin(&mut self) -> bool {
        self.next_bool(0.5)
    }

    /// Shuffle a slice in place (Fisher-Yates, back to front) and return it.
    pub fn shuffle<'a, T>(&mut self, slice: &'a mut [T]) -> &'a mut [T] {
        let len = slice.len();
        for i in (1..len).rev() {
            let j = self.next_int(0, i as i32) as usize;
            slice.swap(i, j);
        }
        slice
    }

    /// Select a random element from a slice.
    pub fn pick<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let idx = self.next_int(0, slice.len() as i32 - 1) as usize;
            Some(&slice[idx])
        }
    }

    /// Up to `n` distinct elements, leaving the input untouched.
    ///
    /// Shuffles a copy and keeps the first `min(n, len)` entries.
    pub fn pick_n<T: Clone>(&mut self, slice: &[T], n: usize) -> Vec<T> {
        let mut pool = slice.to_vec();
        self.shuffle(&mut pool);
        pool.truncate(n.min(slice.len()));
        pool
    }

    /// Current generator word (for checkpointing).
    pub fn state(&self) -> u32 {
        self.state
    }

    /// Restore a saved generator word. Zero is coerced to 1.
    pub fn set_state(&mut self, state: u32) {
        self.state = non_zero(state);
    }
}

#[inline]
fn non_zero(word: u32) -> u32 {
    if word == 0 { 1 } else { word }
}

/// Derive a run seed from the run id and server-held entropy.
///
/// The client learns the seed only through the signed run token, so it cannot
/// grind run ids for favourable seeds. Never returns zero.
pub fn derive_run_seed(run_id: &[u8; 16], server_entropy: &[u8; 32]) -> u32 {
    let mut hasher = Sha256::new();

    // Domain separator
    hasher.update(b"FORTRESS_SIM_SEED_V1");
    hasher.update(run_id);
    hasher.update(server_entropy);

    let hash = hasher.finalize();
    let mut word = [0u8; 4];
    word.copy_from_slice(&hash[0..4]);
    non_zero(u32::from_le_bytes(word))
}

// =============================================================================
// TESTS
// =============================================================================
