//! Run configuration.
//!
//! # Example
//!
//! ```
//! use netfuzz::config::{FuzzConfig, Library};
//!
//! let config = FuzzConfig::builder()
//!     .library(Library::Loopback)
//!     .clients(16)
//!     .connection_iterations(50)
//!     .message_iterations(10)
//!     .seed(7)
//!     .build()
//!     .expect("valid configuration");
//! assert_eq!(config.server_address().to_string(), "[::1]:9500");
//! ```

use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use serde::Serialize;

use crate::payload::DEFAULT_PAYLOAD_CAPACITY;
use crate::state::RunTargets;
use crate::transport::{HostSettings, LinkConditions};
use crate::FuzzError;

/// Default number of clients.
pub const DEFAULT_CLIENTS: usize = 256;

/// Default server port.
pub const DEFAULT_PORT: u16 = 9500;

/// Channels every client connection requests.
pub const DEFAULT_CHANNELS: usize = 2;

/// Default per-host buffer size.
pub const DEFAULT_HOST_BUFFER: usize = 1024 * 1024;

/// Networking library under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
pub enum Library {
    /// Recognized but not implemented.
    #[value(name = "hypernet", alias = "0")]
    HyperNet,
    /// The in-process reliable datagram transport.
    #[value(name = "loopback", alias = "1")]
    Loopback,
}

impl Library {
    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::HyperNet => "HyperNet",
            Self::Loopback => "Loopback",
        }
    }
}

/// Everything that shapes a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzConfig {
    /// Backend selection.
    pub library: Library,
    /// Number of client actors.
    pub clients: usize,
    /// Server port on `::1`.
    pub port: u16,
    /// Iteration targets.
    pub targets: RunTargets,
    /// Largest payload size.
    pub payload_capacity: usize,
    /// Channels per client connection.
    pub channels: usize,
    /// Per-host buffer size in bytes.
    pub buffer_size: usize,
    /// Seed for payloads and link delays. `None` picks one from the clock.
    pub seed: Option<u64>,
    /// Delivery conditions of the loopback medium.
    pub link: LinkConditions,
    /// Fail the run after this many scheduler turns.
    pub max_turns: Option<u64>,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            library: Library::Loopback,
            clients: DEFAULT_CLIENTS,
            port: DEFAULT_PORT,
            targets: RunTargets::default(),
            payload_capacity: DEFAULT_PAYLOAD_CAPACITY,
            channels: DEFAULT_CHANNELS,
            buffer_size: DEFAULT_HOST_BUFFER,
            seed: None,
            link: LinkConditions::passthrough(),
            max_turns: None,
        }
    }
}

impl FuzzConfig {
    /// Starts a builder from the defaults.
    #[must_use]
    pub fn builder() -> FuzzConfigBuilder {
        FuzzConfigBuilder::default()
    }

    /// Address the server listens on.
    #[must_use]
    pub fn server_address(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), self.port)
    }

    /// Host settings of the server: one peer slot per client.
    #[must_use]
    pub fn server_settings(&self) -> HostSettings {
        HostSettings::server(
            self.server_address(),
            self.clients,
            self.channels,
            self.buffer_size,
        )
    }

    /// Host settings of each client.
    #[must_use]
    pub fn client_settings(&self) -> HostSettings {
        HostSettings::client(self.buffer_size)
    }

    /// Checks every field.
    pub fn validate(&self) -> Result<(), FuzzError> {
        let invalid = |info: &str| Err(FuzzError::InvalidConfig { info: info.to_owned() });
        if self.clients == 0 {
            return invalid("the number of clients must be at least 1");
        }
        if self.port == 0 {
            return invalid("the port must be between 1 and 65535");
        }
        if self.targets.connection_iterations == 0 {
            return invalid("connection iterations must be at least 1");
        }
        if self.targets.message_iterations == 0 {
            return invalid("message iterations must be at least 1");
        }
        if self.payload_capacity == 0 {
            return invalid("payload capacity must be at least 1 byte");
        }
        if self.payload_capacity > self.buffer_size {
            return invalid("payload capacity exceeds the host buffer");
        }
        if self.channels < 2 || self.channels > usize::from(u8::MAX) {
            return invalid("connections need between 2 and 255 channels");
        }
        if self.max_turns == Some(0) {
            return invalid("the turn limit must be at least 1");
        }
        Ok(())
    }
}

/// Builder for [`FuzzConfig`]. Validation happens in [`build`](Self::build).
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct FuzzConfigBuilder {
    config: FuzzConfig,
}

impl FuzzConfigBuilder {
    /// Selects the backend.
    pub fn library(mut self, library: Library) -> Self {
        self.config.library = library;
        self
    }

    /// Sets the number of clients.
    pub fn clients(mut self, clients: usize) -> Self {
        self.config.clients = clients;
        self
    }

    /// Sets the server port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the connection churn target.
    pub fn connection_iterations(mut self, iterations: u64) -> Self {
        self.config.targets.connection_iterations = iterations;
        self
    }

    /// Sets the per-client round trip count.
    pub fn message_iterations(mut self, iterations: u64) -> Self {
        self.config.targets.message_iterations = iterations;
        self
    }

    /// Sets the largest payload size.
    pub fn payload_capacity(mut self, capacity: usize) -> Self {
        self.config.payload_capacity = capacity;
        self
    }

    /// Sets the per-connection channel count.
    pub fn channels(mut self, channels: usize) -> Self {
        self.config.channels = channels;
        self
    }

    /// Sets the per-host buffer size.
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.config.buffer_size = bytes;
        self
    }

    /// Fixes the seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Sets the loopback delivery conditions.
    pub fn link_conditions(mut self, link: LinkConditions) -> Self {
        self.config.link = link;
        self
    }

    /// Caps the number of scheduler turns.
    pub fn max_turns(mut self, turns: u64) -> Self {
        self.config.max_turns = Some(turns);
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<FuzzConfig, FuzzError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_classic_run() {
        let config = FuzzConfig::builder().build().unwrap();
        assert_eq!(config.clients, 256);
        assert_eq!(config.port, 9500);
        assert_eq!(config.targets.connection_iterations, 1000);
        assert_eq!(config.targets.message_iterations, 100);
        assert_eq!(config.payload_capacity, 1024);
        assert_eq!(config.server_settings().peer_limit, 256);
        assert_eq!(config.client_settings().peer_limit, 1);
    }

    #[test]
    fn zero_values_are_rejected() {
        for builder in [
            FuzzConfig::builder().clients(0),
            FuzzConfig::builder().port(0),
            FuzzConfig::builder().connection_iterations(0),
            FuzzConfig::builder().message_iterations(0),
            FuzzConfig::builder().payload_capacity(0),
            FuzzConfig::builder().max_turns(0),
        ] {
            let err = builder.build().unwrap_err();
            assert!(matches!(err, FuzzError::InvalidConfig { .. }), "{err}");
            assert!(!err.is_fatal());
        }
    }

    #[test]
    fn payload_must_fit_the_host_buffer() {
        let err = FuzzConfig::builder()
            .buffer_size(512)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("host buffer"));
    }

    #[test]
    fn data_channel_must_exist() {
        assert!(FuzzConfig::builder().channels(1).build().is_err());
        assert!(FuzzConfig::builder().channels(3).build().is_ok());
    }
}
