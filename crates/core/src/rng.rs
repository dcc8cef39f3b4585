//! RNG module - Lehmer / Park-Miller "minimal standard" generator
//!
//! The generator is a pure function of its 31-bit state, so a seed replays the
//! exact same piece sequence on every platform and in every port of the game.
//! Do not swap it for a "better" generator: seeded games depend on the exact
//! output sequence.

/// Modulus of the generator (2^31 - 1).
pub const MODULUS: u64 = 2_147_483_647;

/// Multiplier of the generator (7^5).
pub const MULTIPLIER: u64 = 16_807;

/// Park-Miller linear congruential generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rng {
    state: u32,
}

impl Rng {
    /// Create a new RNG with the given seed
    ///
    /// The seed is reduced into `[0, M)`; a zero state would repeat forever,
    /// so it becomes 1.
    pub fn new(seed: i64) -> Self {
        let m = MODULUS as i64;
        let state = ((seed % m) + m) % m;
        let state = if state == 0 { 1 } else { state as u32 };
        Self { state }
    }

    /// Advance the generator and return the new state, in `1..M`.
    pub fn next_u32(&mut self) -> u32 {
        self.state = ((MULTIPLIER * u64::from(self.state)) % MODULUS) as u32;
        self.state
    }

    /// Next value mapped to `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32() - 1) / (MODULUS - 1) as f64
    }

    /// Shuffle a slice in place using Fisher-Yates
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let j = (self.next_f64() * (i + 1) as f64) as usize;
            slice.swap(i, j);
        }
    }

    /// Current internal state.
    pub fn state(&self) -> u32 {
        self.state
    }
}
