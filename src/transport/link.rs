//! Delivery conditions for the loopback medium.
//!
//! Delays are counted in service calls of the receiving host rather than wall time, so a
//! seeded run delivers every datagram at the same point of the schedule on every replay.
//! Delivery stays reliable and in order per receiver; a delayed datagram holds back the
//! ones queued behind it.
//!
//! ```
//! use netfuzz::transport::LinkConditions;
//!
//! let conditions = LinkConditions::builder()
//!     .delay(1)
//!     .jitter(2)
//!     .seed(42)
//!     .build();
//! assert_eq!(conditions.min_delay, 1);
//! assert_eq!(conditions.max_delay, 3);
//! ```

use serde::Serialize;

use crate::rng::{Pcg32, Rng};

/// How long the medium holds datagrams before the receiver can see them.
///
/// Use [`LinkConditions::builder()`] for a fluent configuration API. The default delivers
/// on the receiver's next service call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkConditions {
    /// Fewest extra service calls a datagram waits (default: 0)
    pub min_delay: u32,

    /// Most extra service calls a datagram waits (default: 0)
    pub max_delay: u32,

    /// Random seed for the delay draw (default: clock-derived)
    pub seed: Option<u64>,
}

impl LinkConditions {
    /// Creates a new builder for fluent configuration.
    #[must_use]
    pub fn builder() -> LinkConditionsBuilder {
        LinkConditionsBuilder::new()
    }

    /// Conditions with no added delay.
    #[must_use]
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Up to three extra service calls per datagram.
    #[must_use]
    pub fn sluggish() -> Self {
        Self {
            min_delay: 0,
            max_delay: 3,
            seed: None,
        }
    }

    /// Two to eight extra service calls per datagram.
    #[must_use]
    pub fn congested() -> Self {
        Self {
            min_delay: 2,
            max_delay: 8,
            seed: None,
        }
    }

    /// Returns `true` if no datagram is ever held back.
    #[must_use]
    pub const fn is_passthrough(&self) -> bool {
        self.max_delay == 0
    }

    /// Draws the extra delay for one datagram.
    pub(crate) fn sample_delay(&self, rng: &mut Pcg32) -> u64 {
        if self.max_delay <= self.min_delay {
            return u64::from(self.min_delay);
        }
        u64::from(rng.gen_range(self.min_delay..self.max_delay.saturating_add(1)))
    }
}

/// Builder for [`LinkConditions`].
#[derive(Debug, Clone, Default)]
pub struct LinkConditionsBuilder {
    conditions: LinkConditions,
}

impl LinkConditionsBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the constant delay. Raises the maximum if it falls below.
    #[must_use]
    pub fn delay(mut self, services: u32) -> Self {
        let jitter = self
            .conditions
            .max_delay
            .saturating_sub(self.conditions.min_delay);
        self.conditions.min_delay = services;
        self.conditions.max_delay = services.saturating_add(jitter);
        self
    }

    /// Sets the random extra delay on top of the constant delay.
    #[must_use]
    pub fn jitter(mut self, services: u32) -> Self {
        self.conditions.max_delay = self.conditions.min_delay.saturating_add(services);
        self
    }

    /// Sets the delay range directly. A reversed range is swapped.
    #[must_use]
    pub fn delay_range(mut self, min: u32, max: u32) -> Self {
        self.conditions.min_delay = min.min(max);
        self.conditions.max_delay = min.max(max);
        self
    }

    /// Sets the random seed for deterministic behavior.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.conditions.seed = Some(seed);
        self
    }

    /// Builds the conditions.
    #[must_use]
    pub fn build(self) -> LinkConditions {
        self.conditions
    }
}

/// Statistics about the loopback medium.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Datagrams handed to the medium
    pub datagrams_sent: u64,
    /// Datagrams a receiver picked up
    pub datagrams_delivered: u64,
    /// Datagrams that waited at least one extra service call
    pub datagrams_delayed: u64,
    /// Datagrams addressed to an unbound address
    pub datagrams_unreachable: u64,
    /// Datagrams that failed to decode on arrival
    pub datagrams_corrupt: u64,
    /// Data packets that arrived for a peer that was no longer connected
    pub packets_discarded: u64,
    /// Payload bytes carried by data packets
    pub payload_bytes: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::rng::SeedableRng;

    #[test]
    fn passthrough_never_delays() {
        let conditions = LinkConditions::passthrough();
        assert!(conditions.is_passthrough());
        let mut rng = Pcg32::seed_from_u64(1);
        assert!((0..100).all(|_| conditions.sample_delay(&mut rng) == 0));
    }

    #[test]
    fn delay_samples_stay_in_range() {
        let conditions = LinkConditions::builder().delay_range(5, 2).build();
        assert_eq!((conditions.min_delay, conditions.max_delay), (2, 5));
        let mut rng = Pcg32::seed_from_u64(9);
        let samples: Vec<u64> = (0..500).map(|_| conditions.sample_delay(&mut rng)).collect();
        assert!(samples.iter().all(|d| (2..=5).contains(d)));
        assert!(samples.contains(&2));
        assert!(samples.contains(&5));
    }

    #[test]
    fn delay_keeps_existing_jitter() {
        let conditions = LinkConditions::builder().jitter(3).delay(4).build();
        assert_eq!((conditions.min_delay, conditions.max_delay), (4, 7));
    }

    #[test]
    fn presets() {
        assert!(!LinkConditions::sluggish().is_passthrough());
        assert_eq!(LinkConditions::congested().min_delay, 2);
    }
}
