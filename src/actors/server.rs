use tracing::{debug, info, trace};

use super::{FuzzContext, TurnEvents};
use crate::report_violation_to;
use crate::scheduler::{Actor, Turn};
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::transport::{Host, HostEvent, HostSettings, PeerId, Transport, DATA_CHANNEL};
use crate::FuzzError;

const ROLE: &str = "Server";

/// The listening side of the swarm.
///
/// While the churn target is not reached, every incoming connection is counted and
/// disconnected right away. Afterwards connections are kept and served with a payload;
/// each received packet is echoed back until the exchange target is reached, after
/// which the sending peer is disconnected instead.
pub struct ServerActor<T: Transport> {
    transport: T,
    settings: HostSettings,
    host: Option<T::Host>,
}

impl<T: Transport> ServerActor<T> {
    /// Creates the actor. The host is created on its first turn.
    #[must_use]
    pub const fn new(transport: T, settings: HostSettings) -> Self {
        Self {
            transport,
            settings,
            host: None,
        }
    }

    fn listen(&self) -> Result<T::Host, FuzzError> {
        let host = self
            .transport
            .create_host(self.settings.clone())
            .map_err(|source| FuzzError::HostCreation { role: ROLE, source })?;
        info!(
            address = %host.address(),
            peer_limit = self.settings.peer_limit,
            backend = self.transport.name(),
            "server listening"
        );
        Ok(host)
    }

    fn handle(host: &mut T::Host, event: HostEvent, ctx: &mut FuzzContext) {
        match event {
            HostEvent::Connect { peer } => {
                ctx.state.set_connected(host.connected_peers());
                if ctx.state.try_record_connection_churn() {
                    trace!(%peer, "churning connection");
                    host.disconnect(peer);
                } else {
                    Self::send_payload(host, peer, ctx);
                }
            },
            HostEvent::Disconnect { peer } | HostEvent::DisconnectTimeout { peer } => {
                trace!(%peer, "peer disconnected");
                ctx.state.record_disconnection();
            },
            HostEvent::Receive { peer, packet, .. } => {
                drop(packet);
                if ctx.state.record_message() {
                    Self::send_payload(host, peer, ctx);
                } else {
                    debug!(%peer, "exchange target reached, disconnecting");
                    host.disconnect(peer);
                }
            },
        }
    }

    fn send_payload(host: &mut T::Host, peer: PeerId, ctx: &mut FuzzContext) {
        if let Err(err) = host.send(peer, DATA_CHANNEL, ctx.payloads.packet()) {
            report_violation_to!(
                ctx.state.violation_observer(),
                ViolationSeverity::Warning,
                ViolationKind::Transport,
                "server send to {} failed: {}",
                peer,
                err
            );
        }
    }
}

impl<T: Transport> Actor<FuzzContext> for ServerActor<T> {
    fn name(&self) -> &str {
        "server"
    }

    fn turn(&mut self, ctx: &mut FuzzContext) -> Result<Turn, FuzzError> {
        let mut host = match self.host.take() {
            Some(host) => host,
            None => self.listen()?,
        };

        if ctx.interrupted() {
            host.destroy();
            ctx.state.mark_server_parked();
            info!("server parked");
            return Ok(Turn::Park);
        }

        let mut events = TurnEvents::default();
        while let Some(event) = events
            .next(&mut host)
            .map_err(|source| FuzzError::Service { role: ROLE, source })?
        {
            Self::handle(&mut host, event, ctx);
        }

        self.host = Some(host);
        Ok(Turn::Yield)
    }
}
