//! Random payloads for the echo traffic.

use crate::rng::{Pcg32, Rng};
use crate::transport::Packet;

/// Size of the payload buffer the actors draw from.
pub const DEFAULT_PAYLOAD_CAPACITY: usize = 1024;

/// Produces payloads of random length in `1..=capacity` filled with random bytes.
///
/// The buffer is reused; every call overwrites the prefix it hands out.
#[derive(Debug, Clone)]
pub struct PayloadGenerator {
    buffer: Vec<u8>,
    rng: Pcg32,
}

impl PayloadGenerator {
    /// Creates a generator. A capacity of 0 is raised to 1.
    #[must_use]
    pub fn new(capacity: usize, rng: Pcg32) -> Self {
        Self {
            buffer: vec![0; capacity.max(1)],
            rng,
        }
    }

    /// Largest payload this generator produces.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Fills a random-length prefix of the buffer and returns it.
    pub fn generate(&mut self) -> &[u8] {
        let len = self.rng.gen_range_usize_inclusive(1..=self.buffer.len());
        let chunk = self.buffer.get_mut(..len).unwrap_or_default();
        self.rng.fill_bytes(chunk);
        chunk
    }

    /// Generates a payload wrapped in a reliable packet.
    pub fn packet(&mut self) -> Packet {
        Packet::reliable(self.generate())
    }
}
