//! Capability interface between the fuzzing actors and the transport under test.
//!
//! Actors only ever see [`Transport`] (a host factory) and [`Host`] (one endpoint with
//! its peers). A backend delivers everything that happens on an endpoint as a
//! [`HostEvent`]; "nothing pending" is `None`.
//!
//! Destroying a packet is dropping the [`Packet`] handed out by a receive event.
//! Destroying a host is [`Host::destroy`] (or dropping it).

use std::fmt;
use std::net::SocketAddr;

use crate::config::{FuzzConfig, Library};
use crate::FuzzError;

pub mod codec;
pub mod link;
pub mod loopback;

pub use link::{LinkConditions, LinkConditionsBuilder, LinkStats};
pub use loopback::{LoopbackHost, LoopbackNetwork};

/// Channel the fuzzing traffic is sent on. Channel 0 stays unused, as with the
/// two-channel layout the harness requests from every backend.
pub const DATA_CHANNEL: u8 = 1;

/// Identifies a peer slot within one host.
///
/// Slots are reused after a peer fully disconnects, so an id is only meaningful
/// until the matching disconnect event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(u32);

impl PeerId {
    /// Creates a peer id from a slot index.
    #[must_use]
    pub const fn new(slot: u32) -> Self {
        Self(slot)
    }

    /// Returns the slot index.
    #[must_use]
    pub const fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// A payload travelling through a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    data: Vec<u8>,
    reliable: bool,
}

impl Packet {
    /// Creates a packet that must be delivered.
    #[must_use]
    pub fn reliable(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            reliable: true,
        }
    }

    /// Creates a best-effort packet.
    #[must_use]
    pub fn unreliable(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            reliable: false,
        }
    }

    pub(crate) fn from_parts(data: Vec<u8>, reliable: bool) -> Self {
        Self { data, reliable }
    }

    /// Returns the payload bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if the packet was sent reliably.
    #[must_use]
    pub const fn is_reliable(&self) -> bool {
        self.reliable
    }

    pub(crate) fn into_parts(self) -> (Vec<u8>, bool) {
        (self.data, self.reliable)
    }
}

/// Something that happened on a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A connection with `peer` completed, in either direction.
    Connect {
        /// The newly connected peer.
        peer: PeerId,
    },
    /// A connection with `peer` was closed gracefully.
    Disconnect {
        /// The peer that went away.
        peer: PeerId,
    },
    /// A connection with `peer` was lost or never came up.
    DisconnectTimeout {
        /// The peer that went away.
        peer: PeerId,
    },
    /// `peer` delivered a packet on `channel`.
    Receive {
        /// The sending peer.
        peer: PeerId,
        /// Channel the packet arrived on.
        channel: u8,
        /// The payload. Dropping it releases it.
        packet: Packet,
    },
}

impl HostEvent {
    /// Returns the peer this event concerns.
    #[must_use]
    pub const fn peer(&self) -> PeerId {
        match self {
            Self::Connect { peer }
            | Self::Disconnect { peer }
            | Self::DisconnectTimeout { peer }
            | Self::Receive { peer, .. } => *peer,
        }
    }
}

/// Parameters for creating a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSettings {
    /// Address to listen on. `None` asks the backend for an ephemeral address.
    pub address: Option<SocketAddr>,
    /// Maximum number of simultaneous peers.
    pub peer_limit: usize,
    /// Maximum channels per connection.
    pub channel_limit: usize,
    /// Incoming bandwidth cap in bytes per second, 0 for unlimited.
    pub incoming_bandwidth: u32,
    /// Outgoing bandwidth cap in bytes per second, 0 for unlimited.
    pub outgoing_bandwidth: u32,
    /// Per-host buffer size in bytes; also the largest packet accepted by `send`.
    pub buffer_size: usize,
}

impl HostSettings {
    /// Settings for the listening endpoint.
    #[must_use]
    pub const fn server(
        address: SocketAddr,
        peer_limit: usize,
        channel_limit: usize,
        buffer_size: usize,
    ) -> Self {
        Self {
            address: Some(address),
            peer_limit,
            channel_limit,
            incoming_bandwidth: 0,
            outgoing_bandwidth: 0,
            buffer_size,
        }
    }

    /// Settings for a single-connection client endpoint.
    ///
    /// A channel limit of 0 lets the connecting side pick the channel count.
    #[must_use]
    pub const fn client(buffer_size: usize) -> Self {
        Self {
            address: None,
            peer_limit: 1,
            channel_limit: 0,
            incoming_bandwidth: 0,
            outgoing_bandwidth: 0,
            buffer_size,
        }
    }
}

/// Errors a backend can report.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// Another host already listens on this address.
    AddressInUse {
        /// The contested address.
        address: SocketAddr,
    },
    /// No ephemeral address was left to bind.
    AddressSpaceExhausted,
    /// The host settings were unusable.
    InvalidSettings {
        /// Further specifies the problem.
        info: String,
    },
    /// Every peer slot is taken.
    PeerLimitReached {
        /// The host's peer limit.
        limit: usize,
    },
    /// The requested channel count is outside `1..=limit`.
    InvalidChannelCount {
        /// Channels requested.
        requested: usize,
        /// Channels allowed.
        limit: usize,
    },
    /// A send named a channel the connection does not have.
    InvalidChannel {
        /// The channel that was used.
        channel: u8,
        /// Channels on the connection.
        channels: usize,
    },
    /// The peer id does not name an occupied slot.
    UnknownPeer {
        /// The offending id.
        peer: PeerId,
    },
    /// The peer exists but is not connected.
    PeerNotConnected {
        /// The offending id.
        peer: PeerId,
    },
    /// The packet exceeds the host buffer.
    PacketTooLarge {
        /// Packet size in bytes.
        size: usize,
        /// Largest accepted size.
        limit: usize,
    },
    /// A datagram could not be encoded or decoded.
    Codec {
        /// Codec failure description.
        context: String,
    },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressInUse { address } => write!(f, "address {} already in use", address),
            Self::AddressSpaceExhausted => write!(f, "no ephemeral address available"),
            Self::InvalidSettings { info } => write!(f, "invalid host settings: {}", info),
            Self::PeerLimitReached { limit } => {
                write!(f, "all {} peer slots are in use", limit)
            },
            Self::InvalidChannelCount { requested, limit } => write!(
                f,
                "requested {} channels, host allows 1..={}",
                requested, limit
            ),
            Self::InvalidChannel { channel, channels } => write!(
                f,
                "channel {} does not exist on a {}-channel connection",
                channel, channels
            ),
            Self::UnknownPeer { peer } => write!(f, "{} is not a known peer", peer),
            Self::PeerNotConnected { peer } => write!(f, "{} is not connected", peer),
            Self::PacketTooLarge { size, limit } => write!(
                f,
                "packet of {} bytes exceeds the {} byte host buffer",
                size, limit
            ),
            Self::Codec { context } => write!(f, "datagram codec failure: {}", context),
        }
    }
}

impl std::error::Error for TransportError {}

/// Host factory for one backend.
pub trait Transport {
    /// The endpoint type this backend produces.
    type Host: Host;

    /// Display name of the backend.
    fn name(&self) -> &'static str;

    /// Creates a host. With `settings.address` set the host listens there.
    fn create_host(&self, settings: HostSettings) -> Result<Self::Host, TransportError>;

    /// Medium statistics, for backends that simulate their medium.
    fn link_stats(&self) -> Option<LinkStats> {
        None
    }
}

/// One endpoint and its peers.
///
/// Every method is non-blocking.
pub trait Host {
    /// Address this host is bound to.
    fn address(&self) -> SocketAddr;

    /// Starts connecting to `address`. The returned peer reports
    /// [`HostEvent::Connect`] or [`HostEvent::DisconnectTimeout`] later.
    fn connect(&mut self, address: SocketAddr, channel_count: usize)
        -> Result<PeerId, TransportError>;

    /// Pops an already-buffered event without touching the network.
    fn check_events(&mut self) -> Option<HostEvent>;

    /// Flushes queued traffic, ingests whatever arrived and returns the first
    /// pending event. Never waits: the timeout is always zero.
    fn service(&mut self) -> Result<Option<HostEvent>, TransportError>;

    /// Queues `packet` for `peer` on `channel`.
    fn send(&mut self, peer: PeerId, channel: u8, packet: Packet) -> Result<(), TransportError>;

    /// Starts a graceful disconnect. Both sides later see [`HostEvent::Disconnect`].
    fn disconnect(&mut self, peer: PeerId);

    /// Number of peers currently in the connected state.
    fn connected_peers(&self) -> usize;

    /// Sends all queued traffic now.
    fn flush(&mut self);

    /// Tears the host down. Remote peers observe a timeout.
    fn destroy(self)
    where
        Self: Sized;
}

/// Resolves the configured library to a backend.
///
/// HyperNet is recognized but has no implementation; selecting it fails here, before
/// any actor is created.
pub fn select_transport(config: &FuzzConfig) -> Result<LoopbackNetwork, FuzzError> {
    match config.library {
        Library::HyperNet => Err(FuzzError::UnsupportedBackend {
            library: Library::HyperNet.name(),
        }),
        Library::Loopback => {
            let mut conditions = config.link.clone();
            if conditions.seed.is_none() {
                conditions.seed = config.seed.map(|seed| seed ^ LINK_SEED_SALT);
            }
            Ok(LoopbackNetwork::new(conditions))
        },
    }
}

/// Keeps link delays independent of payload randomness when both derive from `--seed`.
const LINK_SEED_SALT: u64 = 0x6c69_6e6b_5f73_6565;
