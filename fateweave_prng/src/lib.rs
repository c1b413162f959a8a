// Deterministic, portable pseudo-random number generator.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seeding.
// Hand-rolled with zero external dependencies so the output is identical on
// every platform, compiler version, and optimization level.
//
// This crate is the single source of randomness for the whole Fateweave
// workspace. Champion decision windows, party awareness rolls, and spell
// cast-chance rolls all draw from a `SimRng` owned by the magic system,
// seeded once at world creation. By not depending on external RNG crates
// (like `rand`) we guarantee reproducible behavior given the same seed.
//
// **Critical constraint: determinism.** Every method on `SimRng` must
// produce identical output given the same prior state. No floating-point
// arithmetic in the core generator, no stdlib PRNG, no OS entropy.

use serde::{Deserialize, Serialize};

/// Xoshiro256++ PRNG — the project's sole source of randomness.
///
/// The generator state serializes with the rest of the simulation, so a
/// loaded save continues the exact random stream it was saved with.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimRng {
    s: [u64; 4],
}

impl SimRng {
    /// Create a new PRNG seeded from a `u64`.
    ///
    /// Uses SplitMix64 to expand the seed into the 256-bit internal state,
    /// per the xoshiro authors' recommendation. Two `SimRng` instances
    /// created with the same seed produce identical output sequences.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Generate a `u32` by taking the upper 32 bits of a `u64`.
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Generate a uniform `f32` in [0, 1).
    ///
    /// Fills the 24-bit f32 mantissa from the upper bits of a `u64`.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Generate a uniform `f64` in [0, 1).
    ///
    /// Fills the 53-bit f64 mantissa from the upper bits of a `u64`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate a uniform random value in `[low, high)`.
    ///
    /// This is how decision windows are rolled: `range_f32(4.0, 7.0)`
    /// gives a window length in seconds.
    ///
    /// Panics if `low >= high`.
    pub fn range_f32(&mut self, low: f32, high: f32) -> f32 {
        assert!(low < high, "range_f32: low must be less than high");
        low + self.next_f32() * (high - low)
    }

    /// Generate a uniform random integer in `[low, high)`.
    ///
    /// Uses rejection sampling to avoid modulo bias.
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        // Rejection sampling to avoid modulo bias.
        let threshold = range.wrapping_neg() % range; // = (2^64 - range) % range
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Generate a uniform random `usize` in `[low, high)`.
    ///
    /// Delegates to `range_u64` for the actual sampling.
    /// Panics if `low >= high`.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Return `true` with probability `p`, `false` otherwise.
    ///
    /// `p <= 0.0` always returns false, `p >= 1.0` always returns true.
    /// Awareness rolls and cast-chance rolls go through here.
    pub fn random_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// SplitMix64 — used only for seeding xoshiro256++ from a single `u64`.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
