use std::net::SocketAddr;

use tracing::{debug, info, trace};

use super::{FuzzContext, TurnEvents};
use crate::report_violation_to;
use crate::scheduler::{Actor, Turn};
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::transport::{Host, HostEvent, HostSettings, PeerId, Transport, DATA_CHANNEL};
use crate::FuzzError;

const ROLE: &str = "Client";

/// One connecting endpoint of the swarm.
///
/// Reconnects whenever it is disconnected before the exchange target is reached and
/// echoes every payload it receives. Its first disconnect after the target counts as
/// its final one.
pub struct ClientActor<T: Transport> {
    index: usize,
    name: String,
    transport: T,
    server: SocketAddr,
    settings: HostSettings,
    channels: usize,
    host: Option<T::Host>,
    peer: Option<PeerId>,
    finished: bool,
}

impl<T: Transport> ClientActor<T> {
    /// Creates client number `index`. The host is created on its first turn.
    #[must_use]
    pub fn new(
        index: usize,
        transport: T,
        server: SocketAddr,
        settings: HostSettings,
        channels: usize,
    ) -> Self {
        Self {
            index,
            name: format!("client-{}", index),
            transport,
            server,
            settings,
            channels,
            host: None,
            peer: None,
            finished: false,
        }
    }

    /// Position of this client in spawn order.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    fn start(&mut self, ctx: &mut FuzzContext) -> Result<T::Host, FuzzError> {
        let mut host = self
            .transport
            .create_host(self.settings.clone())
            .map_err(|source| FuzzError::HostCreation { role: ROLE, source })?;
        ctx.state.record_spawn();
        self.connect(&mut host)?;
        trace!(client = self.index, address = %host.address(), "client started");
        Ok(host)
    }

    fn connect(&mut self, host: &mut T::Host) -> Result<(), FuzzError> {
        let peer = host
            .connect(self.server, self.channels)
            .map_err(|source| FuzzError::Connection {
                address: self.server,
                source,
            })?;
        self.peer = Some(peer);
        Ok(())
    }

    fn handle(
        &mut self,
        host: &mut T::Host,
        event: HostEvent,
        ctx: &mut FuzzContext,
    ) -> Result<(), FuzzError> {
        match event {
            HostEvent::Connect { peer } => {
                trace!(client = self.index, %peer, "connected");
            },
            HostEvent::Disconnect { .. } | HostEvent::DisconnectTimeout { .. } => {
                self.peer = None;
                if !ctx.state.exchange_complete() {
                    self.connect(host)?;
                } else if !self.finished {
                    self.finished = true;
                    ctx.state.record_full_disconnect(self.index);
                    debug!(client = self.index, "final disconnect");
                }
            },
            HostEvent::Receive { packet, .. } => {
                drop(packet);
                ctx.state.record_message();
                self.echo(host, ctx);
            },
        }
        Ok(())
    }

    fn echo(&self, host: &mut T::Host, ctx: &mut FuzzContext) {
        let Some(peer) = self.peer else {
            report_violation_to!(
                ctx.state.violation_observer(),
                ViolationSeverity::Warning,
                ViolationKind::Transport,
                "client {} received data without a server peer",
                self.index
            );
            return;
        };
        if let Err(err) = host.send(peer, DATA_CHANNEL, ctx.payloads.packet()) {
            report_violation_to!(
                ctx.state.violation_observer(),
                ViolationSeverity::Warning,
                ViolationKind::Transport,
                "client {} send failed: {}",
                self.index,
                err
            );
        }
    }
}

impl<T: Transport> Actor<FuzzContext> for ClientActor<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn turn(&mut self, ctx: &mut FuzzContext) -> Result<Turn, FuzzError> {
        let mut host = match self.host.take() {
            Some(host) => host,
            None => self.start(ctx)?,
        };

        if ctx.interrupted() {
            host.destroy();
            ctx.state.record_client_parked();
            info!(client = self.index, "client parked");
            return Ok(Turn::Park);
        }

        let mut events = TurnEvents::default();
        while let Some(event) = events
            .next(&mut host)
            .map_err(|source| FuzzError::Service { role: ROLE, source })?
        {
            self.handle(&mut host, event, ctx)?;
        }

        self.host = Some(host);
        Ok(Turn::Yield)
    }
}
