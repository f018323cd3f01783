//! Seedable PCG32 random number generator.
//!
//! Every source of randomness in a run (payload contents and lengths, loopback
//! delivery delays) draws from a [`Pcg32`] so a run can be replayed from its seed.
//!
//! # PCG32 Algorithm
//!
//! PCG-XSH-RR with 64 bits of state and 32-bit output, period 2^64.
//! Reference: <https://www.pcg-random.org/>
//!
//! # Usage
//!
//! ```rust
//! use netfuzz::rng::{Pcg32, Rng, SeedableRng};
//!
//! let mut rng = Pcg32::seed_from_u64(12345);
//! let value = rng.gen_range(0..100);
//! assert!(value < 100);
//! ```

use crate::{
    report_violation,
    telemetry::{ViolationKind, ViolationSeverity},
};

/// PCG32 random number generator.
///
/// Not cryptographically secure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

/// Default increment for single-stream PCG32.
const PCG_DEFAULT_INCREMENT: u64 = 1442695040888963407;

/// Multiplier constant for the LCG step.
const PCG_MULTIPLIER: u64 = 6364136223846793005;

impl Pcg32 {
    /// Creates a new PCG32 generator with the given state and stream.
    ///
    /// The stream selects one of 2^63 independent sequences.
    #[must_use]
    pub const fn new(state: u64, stream: u64) -> Self {
        // The increment must be odd
        let inc = (stream << 1) | 1;
        let mut pcg = Self { state: 0, inc };
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg.state = pcg.state.wrapping_add(state);
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg
    }

    /// Derives an independent generator for a sub-component of the run.
    ///
    /// Using the component index as the stream keeps the loopback network and the
    /// payload generator from consuming each other's sequence.
    #[must_use]
    pub fn fork(&mut self, stream: u64) -> Self {
        Self::new(self.next_u64(), stream)
    }
}

/// Trait for seeding random number generators.
pub trait SeedableRng: Sized {
    /// Creates a new RNG seeded from a 64-bit value.
    #[must_use]
    fn seed_from_u64(seed: u64) -> Self;

    /// Creates a new RNG with a seed derived from the wall clock.
    #[must_use]
    fn from_entropy() -> Self;
}

impl SeedableRng for Pcg32 {
    fn seed_from_u64(seed: u64) -> Self {
        Self::new(seed, PCG_DEFAULT_INCREMENT)
    }

    fn from_entropy() -> Self {
        Self::seed_from_u64(entropy_seed())
    }
}

/// Trait for random number generation.
pub trait Rng {
    /// Returns the next 32-bit random value.
    fn next_u32(&mut self) -> u32;

    /// Returns the next 64-bit random value.
    fn next_u64(&mut self) -> u64;

    /// Generates a random `u32` value in the given range `[low, high)`.
    ///
    /// # Empty Range Behavior
    /// If `range.is_empty()`, reports a violation via telemetry and returns `range.start`.
    fn gen_range(&mut self, range: std::ops::Range<u32>) -> u32 {
        let span = range.end.wrapping_sub(range.start);
        if range.is_empty() || span == 0 {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::Configuration,
                "gen_range called with empty range [{}..{})",
                range.start,
                range.end
            );
            return range.start;
        }

        // Rejection sampling avoids modulo bias
        let threshold = span.wrapping_neg() % span;
        loop {
            let random_value = self.next_u32();
            if random_value >= threshold {
                return range.start.wrapping_add(random_value % span);
            }
        }
    }

    /// Generates a random `usize` value in the given inclusive range `[low, high]`.
    ///
    /// # Empty Range Behavior
    /// If `start > end`, reports a violation via telemetry and returns `start`.
    fn gen_range_usize_inclusive(&mut self, range: std::ops::RangeInclusive<usize>) -> usize {
        let start = *range.start();
        let end = *range.end();
        if start > end {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::Configuration,
                "gen_range_usize_inclusive called with invalid range [{}..={}]",
                start,
                end
            );
            return start;
        }

        let span = (end - start) as u64 + 1;
        // span wraps to zero only for the full usize range on 64-bit targets
        if span == 0 {
            return self.next_u64() as usize;
        }
        let threshold = span.wrapping_neg() % span;
        loop {
            let random_value = self.next_u64();
            if random_value >= threshold {
                return start + (random_value % span) as usize;
            }
        }
    }

    /// Fills the given slice with random bytes.
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut chunks = dest.chunks_exact_mut(4);
        for chunk in chunks.by_ref() {
            chunk.copy_from_slice(&self.next_u32().to_le_bytes());
        }
        let remainder = chunks.into_remainder();
        if !remainder.is_empty() {
            let val = self.next_u32().to_le_bytes();
            if let Some(val_slice) = val.get(..remainder.len()) {
                remainder.copy_from_slice(val_slice);
            }
        }
    }
}

impl Rng for Pcg32 {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        let old_state = self.state;
        self.state = old_state
            .wrapping_mul(PCG_MULTIPLIER)
            .wrapping_add(self.inc);
        // XSH-RR output permutation
        let xorshifted = (((old_state >> 18) ^ old_state) >> 27) as u32;
        let rot = (old_state >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// High word first.
    #[inline]
    fn next_u64(&mut self) -> u64 {
        let high = u64::from(self.next_u32());
        let low = u64::from(self.next_u32());
        (high << 32) | low
    }
}

/// Gets a clock-based seed for runs started without `--seed`.
///
/// Intentionally non-deterministic; the chosen seed is logged by the run driver so a
/// failing run can be replayed.
pub(crate) fn entropy_seed() -> u64 {
    use web_time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos() as u64);

    // splitmix64 finalizer spreads the low-entropy clock bits
    let mut z = nanos.wrapping_add(0x9e3779b97f4a7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn test_pcg32_deterministic() {
        let mut rng1 = Pcg32::seed_from_u64(12345);
        let mut rng2 = Pcg32::seed_from_u64(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u32(), rng2.next_u32());
        }
    }

    #[test]
    fn test_pcg32_different_seeds() {
        let mut rng1 = Pcg32::seed_from_u64(12345);
        let mut rng2 = Pcg32::seed_from_u64(54321);

        let mut same_count = 0;
        for _ in 0..100 {
            if rng1.next_u32() == rng2.next_u32() {
                same_count += 1;
            }
        }
        assert!(same_count < 10);
    }

    #[test]
    fn test_fork_is_deterministic_and_distinct() {
        let mut parent_a = Pcg32::seed_from_u64(7);
        let mut parent_b = Pcg32::seed_from_u64(7);
        let mut child_a = parent_a.fork(1);
        let child_b = parent_b.fork(1);
        assert_eq!(child_a, child_b);

        let mut sibling = parent_a.fork(2);
        let child_values: Vec<u32> = (0..8).map(|_| child_a.next_u32()).collect();
        let sibling_values: Vec<u32> = (0..8).map(|_| sibling.next_u32()).collect();
        assert_ne!(child_values, sibling_values);
    }

    #[test]
    fn test_gen_range() {
        let mut rng = Pcg32::seed_from_u64(42);

        for _ in 0..1000 {
            let val = rng.gen_range(10..20);
            assert!((10..20).contains(&val));
        }
    }

    #[test]
    fn test_gen_range_empty_returns_start() {
        let mut rng = Pcg32::seed_from_u64(42);
        assert_eq!(rng.gen_range(5..5), 5);
    }

    #[test]
    fn test_gen_range_usize_inclusive_hits_both_ends() {
        let mut rng = Pcg32::seed_from_u64(42);
        let mut seen_low = false;
        let mut seen_high = false;
        for _ in 0..1000 {
            let val = rng.gen_range_usize_inclusive(1..=4);
            assert!((1..=4).contains(&val));
            seen_low |= val == 1;
            seen_high |= val == 4;
        }
        assert!(seen_low && seen_high);
        assert_eq!(rng.gen_range_usize_inclusive(9..=9), 9);
    }

    #[test]
    fn test_fill_bytes() {
        let mut rng = Pcg32::seed_from_u64(42);

        for len in [0, 1, 2, 3, 4, 5, 7, 8, 9, 15, 16, 17] {
            let mut buf = vec![0u8; len];
            rng.fill_bytes(&mut buf);
            if len >= 4 {
                assert!(
                    !buf.iter().all(|&b| b == 0),
                    "fill_bytes produced all zeros for len={len}"
                );
            }
        }
    }

    #[test]
    fn test_entropy_seeds_construct() {
        let mut rng = Pcg32::from_entropy();
        let _ = rng.next_u64();
    }
}
