//! In-process reliable datagram transport.
//!
//! [`LoopbackNetwork`] is a shared medium with one mailbox per bound address. Hosts
//! exchange bincode-encoded datagrams through it: a connect handshake, sequenced data,
//! and a disconnect handshake. Delivery is reliable and ordered per receiver; only
//! [`LinkConditions`] decide *when* a datagram becomes visible.
//!
//! Outgoing datagrams sit in the host until [`Host::service`] or [`Host::flush`], the
//! same way a real host batches its sends.
//!
//! A datagram addressed to an unbound address bounces immediately: the sender's peer
//! times out. Destroying a host resets its connections, which the remote side also
//! observes as a timeout.

use std::collections::{BTreeMap, VecDeque};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::codec;
use super::link::{LinkConditions, LinkStats};
use super::{Host, HostEvent, HostSettings, Packet, PeerId, Transport, TransportError};
use crate::report_violation;
use crate::rng::{Pcg32, SeedableRng};
use crate::telemetry::{ViolationKind, ViolationSeverity};

const EPHEMERAL_FIRST: u16 = 49152;
const EPHEMERAL_LAST: u16 = u16::MAX;

/// Channel cap used when the host leaves the limit to the connecting side.
const MAX_CHANNELS: usize = u8::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Datagram {
    Connect {
        session: u32,
        channels: u8,
    },
    Accept {
        session: u32,
    },
    Refuse {
        session: u32,
    },
    Data {
        session: u32,
        channel: u8,
        reliable: bool,
        payload: Vec<u8>,
    },
    Disconnect {
        session: u32,
    },
    DisconnectAck {
        session: u32,
    },
    Reset {
        session: u32,
    },
}

#[derive(Debug)]
struct InFlight {
    from: SocketAddr,
    bytes: Vec<u8>,
    ready_at: u64,
}

#[derive(Debug, Default)]
struct Mailbox {
    inbox: VecDeque<InFlight>,
    services: u64,
}

#[derive(Debug)]
struct Medium {
    mailboxes: BTreeMap<SocketAddr, Mailbox>,
    next_ephemeral: u16,
    conditions: LinkConditions,
    rng: Pcg32,
    stats: LinkStats,
}

impl Medium {
    fn bind(&mut self, requested: Option<SocketAddr>) -> Result<SocketAddr, TransportError> {
        if let Some(address) = requested {
            if self.mailboxes.contains_key(&address) {
                return Err(TransportError::AddressInUse { address });
            }
            self.mailboxes.insert(address, Mailbox::default());
            return Ok(address);
        }

        let span = u32::from(EPHEMERAL_LAST - EPHEMERAL_FIRST) + 1;
        for _ in 0..span {
            let port = self.next_ephemeral;
            self.next_ephemeral = if port == EPHEMERAL_LAST {
                EPHEMERAL_FIRST
            } else {
                port + 1
            };
            let address = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), port);
            if !self.mailboxes.contains_key(&address) {
                self.mailboxes.insert(address, Mailbox::default());
                return Ok(address);
            }
        }
        Err(TransportError::AddressSpaceExhausted)
    }

    fn unbind(&mut self, address: SocketAddr) {
        self.mailboxes.remove(&address);
    }

    /// Returns `false` if nothing is bound at `to`.
    fn transmit(&mut self, from: SocketAddr, to: SocketAddr, bytes: Vec<u8>) -> bool {
        self.stats.datagrams_sent += 1;
        let delay = self.conditions.sample_delay(&mut self.rng);
        let Some(mailbox) = self.mailboxes.get_mut(&to) else {
            self.stats.datagrams_unreachable += 1;
            return false;
        };
        if delay > 0 {
            self.stats.datagrams_delayed += 1;
        }
        // never overtake a datagram already queued for this receiver
        let earliest = mailbox.services + 1 + delay;
        let ready_at = mailbox
            .inbox
            .back()
            .map_or(earliest, |last| last.ready_at.max(earliest));
        mailbox.inbox.push_back(InFlight {
            from,
            bytes,
            ready_at,
        });
        true
    }

    fn collect(&mut self, address: SocketAddr) -> Vec<(SocketAddr, Vec<u8>)> {
        let Some(mailbox) = self.mailboxes.get_mut(&address) else {
            return Vec::new();
        };
        mailbox.services += 1;
        let now = mailbox.services;
        let mut ready = Vec::new();
        while mailbox.inbox.front().is_some_and(|d| d.ready_at <= now) {
            if let Some(datagram) = mailbox.inbox.pop_front() {
                ready.push((datagram.from, datagram.bytes));
            }
        }
        self.stats.datagrams_delivered += ready.len() as u64;
        ready
    }
}

/// The shared loopback medium. Cloning yields another handle to the same medium.
///
/// # Example
///
/// ```
/// use netfuzz::transport::{Host, HostSettings, LinkConditions, LoopbackNetwork, Transport};
///
/// let network = LoopbackNetwork::new(LinkConditions::builder().seed(1).build());
/// let listen = "[::1]:9500".parse().unwrap();
/// let mut server = network.create_host(HostSettings::server(listen, 4, 2, 1 << 20)).unwrap();
/// let mut client = network.create_host(HostSettings::client(1 << 20)).unwrap();
///
/// client.connect(listen, 2).unwrap();
/// client.flush();
/// assert!(server.service().unwrap().is_some());
/// assert_eq!(server.connected_peers(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct LoopbackNetwork {
    medium: Arc<Mutex<Medium>>,
}

impl LoopbackNetwork {
    /// Creates an empty medium.
    #[must_use]
    pub fn new(conditions: LinkConditions) -> Self {
        let rng = conditions
            .seed
            .map_or_else(Pcg32::from_entropy, Pcg32::seed_from_u64);
        Self {
            medium: Arc::new(Mutex::new(Medium {
                mailboxes: BTreeMap::new(),
                next_ephemeral: EPHEMERAL_FIRST,
                conditions,
                rng,
                stats: LinkStats::default(),
            })),
        }
    }

    /// Returns a snapshot of the medium statistics.
    #[must_use]
    pub fn stats(&self) -> LinkStats {
        self.medium.lock().stats
    }

    /// Returns the conditions the medium applies.
    #[must_use]
    pub fn conditions(&self) -> LinkConditions {
        self.medium.lock().conditions.clone()
    }

    /// Returns `true` if a host is bound at `address`.
    #[must_use]
    pub fn is_bound(&self, address: SocketAddr) -> bool {
        self.medium.lock().mailboxes.contains_key(&address)
    }
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new(LinkConditions::passthrough())
    }
}

impl Transport for LoopbackNetwork {
    type Host = LoopbackHost;

    fn name(&self) -> &'static str {
        "Loopback"
    }

    fn create_host(&self, settings: HostSettings) -> Result<LoopbackHost, TransportError> {
        if settings.peer_limit == 0 {
            return Err(TransportError::InvalidSettings {
                info: "peer limit must be at least 1".to_owned(),
            });
        }
        if settings.buffer_size == 0 {
            return Err(TransportError::InvalidSettings {
                info: "buffer size must be at least 1 byte".to_owned(),
            });
        }
        let address = self.medium.lock().bind(settings.address)?;
        debug!(%address, peer_limit = settings.peer_limit, "loopback host bound");
        Ok(LoopbackHost {
            medium: Arc::clone(&self.medium),
            address,
            peers: (0..settings.peer_limit).map(|_| None).collect(),
            settings,
            events: VecDeque::new(),
            outgoing: VecDeque::new(),
            next_session: 1,
            released: false,
        })
    }

    fn link_stats(&self) -> Option<LinkStats> {
        Some(self.stats())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeerState {
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug)]
struct PeerSlot {
    remote: SocketAddr,
    session: u32,
    channels: usize,
    state: PeerState,
}

/// One endpoint on a [`LoopbackNetwork`].
#[derive(Debug)]
pub struct LoopbackHost {
    medium: Arc<Mutex<Medium>>,
    address: SocketAddr,
    settings: HostSettings,
    peers: Vec<Option<PeerSlot>>,
    events: VecDeque<HostEvent>,
    outgoing: VecDeque<(SocketAddr, Datagram)>,
    next_session: u32,
    released: bool,
}

fn peer_id(index: usize) -> PeerId {
    PeerId::new(index as u32)
}

impl LoopbackHost {
    fn find_peer(&self, remote: SocketAddr, session: u32) -> Option<usize> {
        self.peers.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|s| s.remote == remote && s.session == session)
        })
    }

    fn state_of(&self, index: usize) -> Option<PeerState> {
        self.peers
            .get(index)
            .and_then(Option::as_ref)
            .map(|slot| slot.state)
    }

    fn set_state(&mut self, index: usize, state: PeerState) {
        if let Some(Some(slot)) = self.peers.get_mut(index) {
            slot.state = state;
        }
    }

    fn release(&mut self, index: usize) {
        if let Some(slot) = self.peers.get_mut(index) {
            *slot = None;
        }
    }

    fn channel_limit(&self) -> usize {
        if self.settings.channel_limit == 0 {
            MAX_CHANNELS
        } else {
            self.settings.channel_limit.min(MAX_CHANNELS)
        }
    }

    fn handle(&mut self, from: SocketAddr, datagram: Datagram) {
        match datagram {
            Datagram::Connect { session, channels } => {
                if self.find_peer(from, session).is_some() {
                    return;
                }
                let channels = usize::from(channels);
                let acceptable = channels >= 1 && channels <= self.channel_limit();
                let free = self.peers.iter().position(Option::is_none);
                match free {
                    Some(index) if acceptable => {
                        if let Some(slot) = self.peers.get_mut(index) {
                            *slot = Some(PeerSlot {
                                remote: from,
                                session,
                                channels,
                                state: PeerState::Connected,
                            });
                        }
                        self.outgoing
                            .push_back((from, Datagram::Accept { session }));
                        self.events.push_back(HostEvent::Connect {
                            peer: peer_id(index),
                        });
                    },
                    _ => {
                        debug!(host = %self.address, remote = %from, channels, "refusing connection");
                        self.outgoing
                            .push_back((from, Datagram::Refuse { session }));
                    },
                }
            },
            Datagram::Accept { session } => {
                if let Some(index) = self.find_peer(from, session) {
                    if self.state_of(index) == Some(PeerState::Connecting) {
                        self.set_state(index, PeerState::Connected);
                        self.events.push_back(HostEvent::Connect {
                            peer: peer_id(index),
                        });
                    }
                }
            },
            Datagram::Refuse { session } => {
                if let Some(index) = self.find_peer(from, session) {
                    self.release(index);
                    self.events.push_back(HostEvent::DisconnectTimeout {
                        peer: peer_id(index),
                    });
                }
            },
            Datagram::Data {
                session,
                channel,
                reliable,
                payload,
            } => match self.find_peer(from, session) {
                Some(index) if self.state_of(index) == Some(PeerState::Connected) => {
                    self.events.push_back(HostEvent::Receive {
                        peer: peer_id(index),
                        channel,
                        packet: Packet::from_parts(payload, reliable),
                    });
                },
                _ => {
                    trace!(host = %self.address, remote = %from, "discarding data for inactive peer");
                    self.medium.lock().stats.packets_discarded += 1;
                },
            },
            Datagram::Disconnect { session } => {
                self.outgoing
                    .push_back((from, Datagram::DisconnectAck { session }));
                if let Some(index) = self.find_peer(from, session) {
                    self.release(index);
                    self.events.push_back(HostEvent::Disconnect {
                        peer: peer_id(index),
                    });
                }
            },
            Datagram::DisconnectAck { session } => {
                if let Some(index) = self.find_peer(from, session) {
                    if self.state_of(index) == Some(PeerState::Disconnecting) {
                        self.release(index);
                        self.events.push_back(HostEvent::Disconnect {
                            peer: peer_id(index),
                        });
                    }
                }
            },
            Datagram::Reset { session } => {
                if let Some(index) = self.find_peer(from, session) {
                    self.release(index);
                    self.events.push_back(HostEvent::DisconnectTimeout {
                        peer: peer_id(index),
                    });
                }
            },
        }
    }

    /// The peer behind a bounced datagram is gone.
    fn bounce(&mut self, to: SocketAddr, datagram: &Datagram) {
        let session = match datagram {
            Datagram::Connect { session, .. }
            | Datagram::Data { session, .. }
            | Datagram::Disconnect { session } => *session,
            _ => return,
        };
        if let Some(index) = self.find_peer(to, session) {
            self.release(index);
            self.events.push_back(HostEvent::DisconnectTimeout {
                peer: peer_id(index),
            });
        }
    }

    fn transmit(&mut self, to: SocketAddr, datagram: Datagram) {
        let bytes = match codec::encode(&datagram) {
            Ok(bytes) => bytes,
            Err(err) => {
                report_violation!(
                    ViolationSeverity::Error,
                    ViolationKind::Transport,
                    "failed to encode datagram for {}: {}",
                    to,
                    err
                );
                return;
            },
        };
        let delivered = {
            let mut medium = self.medium.lock();
            if let Datagram::Data { payload, .. } = &datagram {
                medium.stats.payload_bytes += payload.len() as u64;
            }
            medium.transmit(self.address, to, bytes)
        };
        if !delivered {
            trace!(host = %self.address, remote = %to, "datagram unreachable");
            self.bounce(to, &datagram);
        }
    }

    fn shutdown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let resets: Vec<(SocketAddr, u32)> = self
            .peers
            .iter_mut()
            .filter_map(Option::take)
            .map(|slot| (slot.remote, slot.session))
            .collect();
        for (remote, session) in resets {
            self.transmit(remote, Datagram::Reset { session });
        }
        self.outgoing.clear();
        self.medium.lock().unbind(self.address);
        debug!(address = %self.address, "loopback host released");
    }
}

impl Host for LoopbackHost {
    fn address(&self) -> SocketAddr {
        self.address
    }

    fn connect(
        &mut self,
        address: SocketAddr,
        channel_count: usize,
    ) -> Result<PeerId, TransportError> {
        let limit = self.channel_limit();
        if channel_count == 0 || channel_count > limit {
            return Err(TransportError::InvalidChannelCount {
                requested: channel_count,
                limit,
            });
        }
        let index = self
            .peers
            .iter()
            .position(Option::is_none)
            .ok_or(TransportError::PeerLimitReached {
                limit: self.peers.len(),
            })?;
        let session = self.next_session;
        self.next_session = self.next_session.wrapping_add(1);
        if let Some(slot) = self.peers.get_mut(index) {
            *slot = Some(PeerSlot {
                remote: address,
                session,
                channels: channel_count,
                state: PeerState::Connecting,
            });
        }
        self.outgoing.push_back((
            address,
            Datagram::Connect {
                session,
                channels: channel_count as u8,
            },
        ));
        Ok(peer_id(index))
    }

    fn check_events(&mut self) -> Option<HostEvent> {
        self.events.pop_front()
    }

    fn service(&mut self) -> Result<Option<HostEvent>, TransportError> {
        self.flush();
        let arrivals = self.medium.lock().collect(self.address);
        for (from, bytes) in arrivals {
            match codec::decode_exact::<Datagram>(&bytes) {
                Ok(datagram) => self.handle(from, datagram),
                Err(err) => {
                    self.medium.lock().stats.datagrams_corrupt += 1;
                    report_violation!(
                        ViolationSeverity::Warning,
                        ViolationKind::Transport,
                        "discarding corrupt datagram from {}: {}",
                        from,
                        err
                    );
                },
            }
        }
        Ok(self.events.pop_front())
    }

    fn send(&mut self, peer: PeerId, channel: u8, packet: Packet) -> Result<(), TransportError> {
        let slot = self
            .peers
            .get(peer.slot())
            .and_then(Option::as_ref)
            .ok_or(TransportError::UnknownPeer { peer })?;
        if slot.state != PeerState::Connected {
            return Err(TransportError::PeerNotConnected { peer });
        }
        if usize::from(channel) >= slot.channels {
            return Err(TransportError::InvalidChannel {
                channel,
                channels: slot.channels,
            });
        }
        if packet.len() > self.settings.buffer_size {
            return Err(TransportError::PacketTooLarge {
                size: packet.len(),
                limit: self.settings.buffer_size,
            });
        }
        let (remote, session) = (slot.remote, slot.session);
        let (payload, reliable) = packet.into_parts();
        self.outgoing.push_back((
            remote,
            Datagram::Data {
                session,
                channel,
                reliable,
                payload,
            },
        ));
        Ok(())
    }

    fn disconnect(&mut self, peer: PeerId) {
        let Some(Some(slot)) = self.peers.get_mut(peer.slot()) else {
            trace!(host = %self.address, %peer, "disconnect of unknown peer ignored");
            return;
        };
        if slot.state == PeerState::Disconnecting {
            return;
        }
        slot.state = PeerState::Disconnecting;
        let datagram = Datagram::Disconnect {
            session: slot.session,
        };
        self.outgoing.push_back((slot.remote, datagram));
    }

    fn connected_peers(&self) -> usize {
        self.peers
            .iter()
            .flatten()
            .filter(|slot| slot.state == PeerState::Connected)
            .count()
    }

    fn flush(&mut self) {
        while let Some((to, datagram)) = self.outgoing.pop_front() {
            self.transmit(to, datagram);
        }
    }

    fn destroy(mut self) {
        self.flush();
        self.shutdown();
    }
}

impl Drop for LoopbackHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    const BUFFER: usize = 1 << 20;

    fn listen_address() -> SocketAddr {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 9500)
    }

    fn network() -> LoopbackNetwork {
        LoopbackNetwork::new(LinkConditions::builder().seed(7).build())
    }

    fn server(network: &LoopbackNetwork, peer_limit: usize) -> LoopbackHost {
        network
            .create_host(HostSettings::server(listen_address(), peer_limit, 2, BUFFER))
            .unwrap()
    }

    fn client(network: &LoopbackNetwork) -> LoopbackHost {
        network.create_host(HostSettings::client(BUFFER)).unwrap()
    }

    fn drain(host: &mut LoopbackHost) -> Vec<HostEvent> {
        let mut events = Vec::new();
        if let Some(event) = host.service().unwrap() {
            events.push(event);
        }
        while let Some(event) = host.check_events() {
            events.push(event);
        }
        events
    }

    /// Connects `client` to `server` and returns (server-side peer, client-side peer).
    fn handshake(server: &mut LoopbackHost, client: &mut LoopbackHost) -> (PeerId, PeerId) {
        let client_peer = client.connect(listen_address(), 2).unwrap();
        client.flush();
        let server_peer = match drain(server).as_slice() {
            [HostEvent::Connect { peer }] => *peer,
            other => panic!("unexpected server events {other:?}"),
        };
        server.flush();
        assert_eq!(
            drain(client),
            vec![HostEvent::Connect { peer: client_peer }]
        );
        (server_peer, client_peer)
    }

    #[test]
    fn handshake_connects_both_sides() {
        let network = network();
        let mut server = server(&network, 4);
        let mut client = client(&network);
        handshake(&mut server, &mut client);
        assert_eq!(server.connected_peers(), 1);
        assert_eq!(client.connected_peers(), 1);
    }

    #[test]
    fn data_arrives_on_its_channel() {
        let network = network();
        let mut server = server(&network, 4);
        let mut client = client(&network);
        let (server_peer, client_peer) = handshake(&mut server, &mut client);

        client
            .send(client_peer, 1, Packet::reliable(&[1, 2, 3]))
            .unwrap();
        client.flush();
        let events = drain(&mut server);
        assert_eq!(
            events,
            vec![HostEvent::Receive {
                peer: server_peer,
                channel: 1,
                packet: Packet::reliable(&[1, 2, 3]),
            }]
        );
        assert_eq!(network.stats().payload_bytes, 3);
    }

    #[test]
    fn full_server_refuses_with_timeout() {
        let network = network();
        let mut server = server(&network, 1);
        let mut first = client(&network);
        let mut second = client(&network);
        handshake(&mut server, &mut first);

        let peer = second.connect(listen_address(), 2).unwrap();
        second.flush();
        assert!(drain(&mut server).is_empty());
        server.flush();
        assert_eq!(
            drain(&mut second),
            vec![HostEvent::DisconnectTimeout { peer }]
        );
        assert_eq!(second.connected_peers(), 0);
    }

    #[test]
    fn graceful_disconnect_notifies_both_sides_and_frees_slot() {
        let network = network();
        let mut server = server(&network, 1);
        let mut client = client(&network);
        let (server_peer, client_peer) = handshake(&mut server, &mut client);

        server.disconnect(server_peer);
        assert_eq!(server.connected_peers(), 0);
        server.flush();
        assert_eq!(
            drain(&mut client),
            vec![HostEvent::Disconnect { peer: client_peer }]
        );
        client.flush();
        assert_eq!(
            drain(&mut server),
            vec![HostEvent::Disconnect { peer: server_peer }]
        );

        // the freed slot accepts the reconnect
        handshake(&mut server, &mut client);
    }

    #[test]
    fn disconnecting_twice_is_harmless() {
        let network = network();
        let mut server = server(&network, 1);
        let mut client = client(&network);
        let (server_peer, _) = handshake(&mut server, &mut client);
        server.disconnect(server_peer);
        server.disconnect(server_peer);
        server.disconnect(PeerId::new(40));
        assert_eq!(server.outgoing.len(), 1);
    }

    #[test]
    fn unreachable_address_times_out() {
        let network = network();
        let mut client = client(&network);
        let peer = client.connect(listen_address(), 2).unwrap();
        assert_eq!(
            drain(&mut client),
            vec![HostEvent::DisconnectTimeout { peer }]
        );
        assert_eq!(network.stats().datagrams_unreachable, 1);
    }

    #[test]
    fn destroying_a_host_resets_its_peers() {
        let network = network();
        let mut server = server(&network, 2);
        let mut client = client(&network);
        let (_, client_peer) = handshake(&mut server, &mut client);

        server.destroy();
        assert!(!network.is_bound(listen_address()));
        assert_eq!(
            drain(&mut client),
            vec![HostEvent::DisconnectTimeout { peer: client_peer }]
        );
    }

    #[test]
    fn bound_address_cannot_be_reused() {
        let network = network();
        let _server = server(&network, 1);
        let err = network
            .create_host(HostSettings::server(listen_address(), 1, 2, BUFFER))
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::AddressInUse {
                address: listen_address()
            }
        );
    }

    #[test]
    fn dropping_a_host_unbinds_it() {
        let network = network();
        drop(server(&network, 1));
        assert!(!network.is_bound(listen_address()));
        let _again = server(&network, 1);
    }

    #[test]
    fn clients_get_distinct_ephemeral_addresses() {
        let network = network();
        let a = client(&network);
        let b = client(&network);
        assert_ne!(a.address(), b.address());
        assert_eq!(a.address().port(), EPHEMERAL_FIRST);
    }

    #[test]
    fn zero_peer_limit_is_rejected() {
        let network = network();
        let err = network
            .create_host(HostSettings::server(listen_address(), 0, 2, BUFFER))
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidSettings { .. }));
    }

    #[test]
    fn send_validation() {
        let network = network();
        let mut server = server(&network, 1);
        let mut client = client(&network);

        assert_eq!(
            client.send(PeerId::new(0), 1, Packet::reliable(&[1])),
            Err(TransportError::UnknownPeer {
                peer: PeerId::new(0)
            })
        );
        let peer = client.connect(listen_address(), 2).unwrap();
        assert_eq!(
            client.send(peer, 1, Packet::reliable(&[1])),
            Err(TransportError::PeerNotConnected { peer })
        );
        client.flush();
        drain(&mut server);
        server.flush();
        drain(&mut client);

        assert!(matches!(
            client.send(peer, 2, Packet::reliable(&[1])),
            Err(TransportError::InvalidChannel { channel: 2, .. })
        ));
        let oversized = vec![0u8; BUFFER + 1];
        assert!(matches!(
            client.send(peer, 1, Packet::reliable(&oversized)),
            Err(TransportError::PacketTooLarge { .. })
        ));
    }

    #[test]
    fn channel_count_is_checked() {
        let network = network();
        let mut client = client(&network);
        assert!(matches!(
            client.connect(listen_address(), 0),
            Err(TransportError::InvalidChannelCount { requested: 0, .. })
        ));
        let mut server = server(&network, 1);
        let mut other = client_with_channels(&network, 3);
        other.flush();
        // server allows 2 channels, a 3-channel request is refused
        assert!(drain(&mut server).is_empty());
    }

    fn client_with_channels(network: &LoopbackNetwork, channels: usize) -> LoopbackHost {
        let mut host = client(network);
        host.connect(listen_address(), channels).unwrap();
        host
    }

    #[test]
    fn client_host_holds_a_single_peer() {
        let network = network();
        let mut client = client(&network);
        client.connect(listen_address(), 2).unwrap();
        assert_eq!(
            client.connect(listen_address(), 2),
            Err(TransportError::PeerLimitReached { limit: 1 })
        );
    }

    #[test]
    fn delay_holds_datagrams_back_in_order() {
        let network = LoopbackNetwork::new(LinkConditions::builder().delay(2).seed(3).build());
        let mut server = server(&network, 1);
        let mut client = client(&network);
        client.connect(listen_address(), 2).unwrap();
        client.flush();

        assert!(drain(&mut server).is_empty());
        assert!(drain(&mut server).is_empty());
        assert_eq!(drain(&mut server).len(), 1);
        assert!(network.stats().datagrams_delayed >= 1);
    }

    #[test]
    fn corrupt_datagrams_are_counted_and_skipped() {
        let network = network();
        let mut server = server(&network, 1);
        let from = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 1);
        assert!(network
            .medium
            .lock()
            .transmit(from, listen_address(), vec![0xFF; 3]));
        assert!(drain(&mut server).is_empty());
        assert_eq!(network.stats().datagrams_corrupt, 1);
    }

    #[test]
    fn data_for_inactive_peer_is_discarded() {
        let network = network();
        let mut server = server(&network, 1);
        let mut client = client(&network);
        let (server_peer, client_peer) = handshake(&mut server, &mut client);

        server.disconnect(server_peer);
        client.send(client_peer, 1, Packet::reliable(&[5])).unwrap();
        client.flush();
        // the data lands while the server side is already disconnecting
        assert!(drain(&mut server).is_empty());
        assert_eq!(network.stats().packets_discarded, 1);
    }
}
