//! Wires a configuration, a backend and the console collaborators into a run.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, info_span};

use crate::actors::{ClientActor, FuzzContext, ServerActor};
use crate::config::FuzzConfig;
use crate::interrupt::Interrupt;
use crate::payload::PayloadGenerator;
use crate::phase::{PhaseController, PhaseRenderer, RunOutcome};
use crate::rng::{entropy_seed, Pcg32, SeedableRng};
use crate::scheduler::Scheduler;
use crate::state::{FuzzState, FuzzStats};
use crate::telemetry::ViolationObserver;
use crate::transport::{LinkStats, Transport};
use crate::FuzzError;

/// Stream id of the payload generator forked from the run seed.
const PAYLOAD_STREAM: u64 = 1;

/// Result of a run that returned control to the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Final counters.
    pub stats: FuzzStats,
    /// Scheduler turns executed.
    pub turns: u64,
    /// Seed the payloads were drawn from.
    pub seed: u64,
    /// Backend medium statistics, when the backend keeps them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkStats>,
}

/// A configured run, ready to start.
///
/// ```
/// use netfuzz::config::FuzzConfig;
/// use netfuzz::interrupt::NoInterrupt;
/// use netfuzz::console::PlainRenderer;
/// use netfuzz::phase::RunOutcome;
/// use netfuzz::runner::Swarm;
/// use netfuzz::transport::select_transport;
///
/// let config = FuzzConfig::builder()
///     .clients(2)
///     .connection_iterations(4)
///     .message_iterations(3)
///     .seed(1)
///     .build()
///     .unwrap();
/// let transport = select_transport(&config).unwrap();
/// let report = Swarm::new(&config)
///     .run(transport, PlainRenderer::new(std::io::sink()), NoInterrupt)
///     .unwrap();
/// assert_eq!(report.outcome, RunOutcome::Completed);
/// ```
#[must_use]
pub struct Swarm<'a> {
    config: &'a FuzzConfig,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl<'a> Swarm<'a> {
    /// Prepares a run of `config`.
    pub fn new(config: &'a FuzzConfig) -> Self {
        Self {
            config,
            violation_observer: None,
        }
    }

    /// Forwards every violation reported during the run to `observer`: counter and
    /// transport anomalies as well as invariant failures.
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Spawns the controller, the server and the clients, then schedules them until the
    /// controller hands back an outcome.
    pub fn run<T, R, I>(self, transport: T, renderer: R, interrupt: I) -> Result<RunReport, FuzzError>
    where
        T: Transport + Clone + 'static,
        R: PhaseRenderer + 'static,
        I: Interrupt + 'static,
    {
        let config = self.config;
        config.validate()?;

        let seed = config.seed.unwrap_or_else(entropy_seed);
        let span = info_span!("swarm", backend = transport.name(), clients = config.clients, seed);
        let _guard = span.enter();
        info!(
            connection_iterations = config.targets.connection_iterations,
            message_iterations = config.targets.message_iterations,
            "starting run"
        );

        let mut rng = Pcg32::seed_from_u64(seed);
        let payloads = PayloadGenerator::new(config.payload_capacity, rng.fork(PAYLOAD_STREAM));
        let mut state = FuzzState::new(config.clients, config.targets);
        let mut scheduler = Scheduler::new();
        if let Some(limit) = config.max_turns {
            scheduler = scheduler.with_turn_limit(limit);
        }
        if let Some(observer) = self.violation_observer {
            state = state.with_violation_observer(Arc::clone(&observer));
            scheduler = scheduler.with_violation_observer(observer);
        }
        let mut ctx = FuzzContext::new(state, payloads, Box::new(interrupt));

        scheduler.spawn(Box::new(PhaseController::new(renderer)));
        scheduler.spawn(Box::new(ServerActor::new(
            transport.clone(),
            config.server_settings(),
        )));
        let server = config.server_address();
        for index in 0..config.clients {
            scheduler.spawn(Box::new(ClientActor::new(
                index,
                transport.clone(),
                server,
                config.client_settings(),
                config.channels,
            )));
        }

        let outcome = scheduler.run(&mut ctx)?;
        let turns = scheduler.turns();
        // releases every host still bound before the medium is inspected
        drop(scheduler);

        let stats = ctx.state.stats();
        info!(?outcome, turns, messages = stats.messages_exchanged, "run finished");
        Ok(RunReport {
            outcome,
            stats,
            turns,
            seed,
            link: transport.link_stats(),
        })
    }
}

/// Runs `config` without a violation observer.
pub fn run_swarm<T, R, I>(
    config: &FuzzConfig,
    transport: T,
    renderer: R,
    interrupt: I,
) -> Result<RunReport, FuzzError>
where
    T: Transport + Clone + 'static,
    R: PhaseRenderer + 'static,
    I: Interrupt + 'static,
{
    Swarm::new(config).run(transport, renderer, interrupt)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::console::PlainRenderer;
    use crate::interrupt::NoInterrupt;
    use crate::transport::LoopbackNetwork;

    #[test]
    fn single_client_run_completes() {
        let config = FuzzConfig::builder()
            .clients(1)
            .connection_iterations(3)
            .message_iterations(2)
            .seed(5)
            .build()
            .unwrap();
        let report = run_swarm(
            &config,
            LoopbackNetwork::default(),
            PlainRenderer::new(std::io::sink()),
            NoInterrupt,
        )
        .unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.stats.clients_disconnected, 1);
        assert_eq!(report.stats.messages_exchanged, 4);
        assert_eq!(report.seed, 5);
        assert!(report.link.is_some());
    }

    #[test]
    fn invalid_config_is_rejected_before_any_actor_runs() {
        let mut config = FuzzConfig::default();
        config.clients = 0;
        let network = LoopbackNetwork::default();
        let err = run_swarm(
            &config,
            network.clone(),
            PlainRenderer::new(std::io::sink()),
            NoInterrupt,
        )
        .unwrap_err();
        assert!(matches!(err, FuzzError::InvalidConfig { .. }));
        assert_eq!(network.stats().datagrams_sent, 0);
    }
}
