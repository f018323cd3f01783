//! Shared counters of a fuzzing run.
//!
//! Every actor mutates one [`FuzzState`]. The cooperative scheduler never runs two
//! actors at once, so the state needs no locking. Counters that the actors can overshoot
//! (connection churn, disconnection churn, messages exchanged) saturate at their targets;
//! the phase controller compares them with `==`.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::trace;

use crate::report_violation_to;
use crate::telemetry::{
    InvariantChecker, InvariantViolation, ViolationKind, ViolationObserver, ViolationSeverity,
};

/// Default number of connection and disconnection churn cycles.
pub const DEFAULT_CONNECTION_ITERATIONS: u64 = 1000;

/// Default number of echo round trips per client.
pub const DEFAULT_MESSAGE_ITERATIONS: u64 = 100;

/// Iteration targets of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunTargets {
    /// Connections the server rejects, and disconnections it must observe.
    pub connection_iterations: u64,
    /// Echo round trips per client.
    pub message_iterations: u64,
}

impl Default for RunTargets {
    fn default() -> Self {
        Self {
            connection_iterations: DEFAULT_CONNECTION_ITERATIONS,
            message_iterations: DEFAULT_MESSAGE_ITERATIONS,
        }
    }
}

impl RunTargets {
    /// Messages that must be exchanged by `clients` clients: each round trip counts twice.
    #[must_use]
    pub const fn exchange_target(&self, clients: u64) -> u64 {
        clients
            .saturating_mul(self.message_iterations)
            .saturating_mul(2)
    }
}

/// Point-in-time copy of the run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FuzzStats {
    /// Clients that took their first turn.
    pub clients_spawned: u64,
    /// Server peers connected at the last connect event.
    pub clients_connected: u64,
    /// Connections the server rejected.
    pub connection_iterations: u64,
    /// Disconnections the server observed, capped at the churn target.
    pub disconnection_iterations: u64,
    /// Packets received by either side, capped at the exchange target.
    pub messages_exchanged: u64,
    /// Clients that saw their final disconnect.
    pub clients_disconnected: u64,
    /// Clients that stopped after an interrupt.
    pub clients_parked: u64,
    /// Whether the server stopped after an interrupt.
    pub server_parked: bool,
}

/// The mutable state shared by all actors.
///
/// Counter anomalies are reported to the attached violation observer, which the actors
/// also use for their own reports.
#[derive(Clone)]
pub struct FuzzState {
    client_count: u64,
    targets: RunTargets,
    exchange_target: u64,
    stats: FuzzStats,
    finished_clients: Vec<bool>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl fmt::Debug for FuzzState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuzzState")
            .field("client_count", &self.client_count)
            .field("targets", &self.targets)
            .field("exchange_target", &self.exchange_target)
            .field("stats", &self.stats)
            .field("finished_clients", &self.finished_clients)
            .finish_non_exhaustive()
    }
}

impl FuzzState {
    /// Creates zeroed state for `client_count` clients.
    #[must_use]
    pub fn new(client_count: usize, targets: RunTargets) -> Self {
        let clients = client_count as u64;
        Self {
            client_count: clients,
            targets,
            exchange_target: targets.exchange_target(clients),
            stats: FuzzStats::default(),
            finished_clients: vec![false; client_count],
            violation_observer: None,
        }
    }

    /// Sends counter anomalies, and the actors' transport anomalies, to `observer` as
    /// well as to the log.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Returns the optional violation observer.
    #[must_use]
    pub fn violation_observer(&self) -> Option<&Arc<dyn ViolationObserver>> {
        self.violation_observer.as_ref()
    }

    /// Number of clients in the run.
    #[must_use]
    pub const fn client_count(&self) -> u64 {
        self.client_count
    }

    /// The run's iteration targets.
    #[must_use]
    pub const fn targets(&self) -> RunTargets {
        self.targets
    }

    /// Total messages the run must exchange.
    #[must_use]
    pub const fn exchange_target(&self) -> u64 {
        self.exchange_target
    }

    /// Snapshot of the counters.
    #[must_use]
    pub const fn stats(&self) -> FuzzStats {
        self.stats
    }

    /// A client took its first turn.
    pub fn record_spawn(&mut self) {
        if self.stats.clients_spawned >= self.client_count {
            report_violation_to!(
                self.violation_observer.as_ref(),
                ViolationSeverity::Error,
                ViolationKind::Counters,
                "spawn recorded beyond the {} configured clients",
                self.client_count
            );
            return;
        }
        self.stats.clients_spawned += 1;
    }

    /// Records the server's current connected peer count.
    pub fn set_connected(&mut self, connected: usize) {
        self.stats.clients_connected = connected as u64;
    }

    /// Claims one connection rejection. Returns `false` once the churn target is reached,
    /// in which case the connection should be kept.
    pub fn try_record_connection_churn(&mut self) -> bool {
        if self.stats.connection_iterations >= self.targets.connection_iterations {
            return false;
        }
        self.stats.connection_iterations += 1;
        true
    }

    /// The server observed a disconnection.
    pub fn record_disconnection(&mut self) {
        if self.stats.disconnection_iterations < self.targets.connection_iterations {
            self.stats.disconnection_iterations += 1;
        } else {
            trace!("disconnection beyond churn target not counted");
        }
    }

    /// A packet was received. Returns `true` while the exchange target is not yet reached.
    pub fn record_message(&mut self) -> bool {
        if self.stats.messages_exchanged < self.exchange_target {
            self.stats.messages_exchanged += 1;
        }
        self.stats.messages_exchanged < self.exchange_target
    }

    /// Returns `true` once every required message was exchanged.
    #[must_use]
    pub const fn exchange_complete(&self) -> bool {
        self.stats.messages_exchanged >= self.exchange_target
    }

    /// Client `index` saw its final disconnect. Later calls for the same client are ignored.
    pub fn record_full_disconnect(&mut self, index: usize) {
        match self.finished_clients.get_mut(index) {
            Some(finished) if !*finished => {
                *finished = true;
                self.stats.clients_disconnected += 1;
            },
            Some(_) => report_violation_to!(
                self.violation_observer.as_ref(),
                ViolationSeverity::Warning,
                ViolationKind::Counters,
                "client {} reported its final disconnect twice",
                index
            ),
            None => report_violation_to!(
                self.violation_observer.as_ref(),
                ViolationSeverity::Error,
                ViolationKind::Counters,
                "final disconnect from unknown client {}",
                index
            ),
        }
    }

    /// A client parked after an interrupt.
    pub fn record_client_parked(&mut self) {
        if self.stats.clients_parked < self.client_count {
            self.stats.clients_parked += 1;
        }
    }

    /// The server parked after an interrupt.
    pub fn mark_server_parked(&mut self) {
        self.stats.server_parked = true;
    }

    /// Returns `true` once the server and every client parked.
    #[must_use]
    pub const fn all_parked(&self) -> bool {
        self.stats.server_parked && self.stats.clients_parked == self.client_count
    }
}

impl InvariantChecker for FuzzState {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let s = &self.stats;
        let bounded = [
            ("clients_spawned", s.clients_spawned, self.client_count),
            ("clients_connected", s.clients_connected, self.client_count),
            ("clients_disconnected", s.clients_disconnected, self.client_count),
            ("clients_parked", s.clients_parked, self.client_count),
            (
                "connection_iterations",
                s.connection_iterations,
                self.targets.connection_iterations,
            ),
            (
                "disconnection_iterations",
                s.disconnection_iterations,
                self.targets.connection_iterations,
            ),
            ("messages_exchanged", s.messages_exchanged, self.exchange_target),
        ];
        for (name, value, limit) in bounded {
            if value > limit {
                return Err(InvariantViolation::new("FuzzState", "counter exceeds its bound")
                    .with_details(format!("{}={}, bound={}", name, value, limit)));
            }
        }
        let finished = self.finished_clients.iter().filter(|f| **f).count() as u64;
        if finished != s.clients_disconnected {
            return Err(
                InvariantViolation::new("FuzzState", "disconnected count out of sync")
                    .with_details(format!(
                        "counter={}, finished clients={}",
                        s.clients_disconnected, finished
                    )),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::telemetry::CollectingObserver;

    fn targets(connections: u64, messages: u64) -> RunTargets {
        RunTargets {
            connection_iterations: connections,
            message_iterations: messages,
        }
    }

    #[test]
    fn defaults() {
        let targets = RunTargets::default();
        assert_eq!(targets.connection_iterations, 1000);
        assert_eq!(targets.message_iterations, 100);
        assert_eq!(targets.exchange_target(256), 51_200);
    }

    #[test]
    fn churn_stops_at_target() {
        let mut state = FuzzState::new(2, targets(3, 1));
        assert!(state.try_record_connection_churn());
        assert!(state.try_record_connection_churn());
        assert!(state.try_record_connection_churn());
        assert!(!state.try_record_connection_churn());
        assert_eq!(state.stats().connection_iterations, 3);
    }

    #[test]
    fn disconnections_saturate() {
        let mut state = FuzzState::new(2, targets(2, 1));
        for _ in 0..5 {
            state.record_disconnection();
        }
        assert_eq!(state.stats().disconnection_iterations, 2);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn messages_saturate_at_exchange_target() {
        let mut state = FuzzState::new(1, targets(1, 2));
        assert_eq!(state.exchange_target(), 4);
        assert!(state.record_message());
        assert!(state.record_message());
        assert!(state.record_message());
        assert!(!state.record_message());
        assert!(state.exchange_complete());
        assert!(!state.record_message());
        assert_eq!(state.stats().messages_exchanged, 4);
    }

    #[test]
    fn full_disconnect_counts_each_client_once() {
        let mut state = FuzzState::new(2, targets(1, 1));
        state.record_full_disconnect(0);
        state.record_full_disconnect(0);
        state.record_full_disconnect(7);
        assert_eq!(state.stats().clients_disconnected, 1);
        state.record_full_disconnect(1);
        assert_eq!(state.stats().clients_disconnected, 2);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn spawn_is_bounded() {
        let mut state = FuzzState::new(1, targets(1, 1));
        state.record_spawn();
        state.record_spawn();
        assert_eq!(state.stats().clients_spawned, 1);
    }

    #[test]
    fn counter_anomalies_reach_the_observer() {
        let observer = Arc::new(CollectingObserver::new());
        let mut state =
            FuzzState::new(2, targets(1, 1)).with_violation_observer(observer.clone());
        state.record_full_disconnect(0);
        assert!(observer.is_empty());

        state.record_full_disconnect(0);
        state.record_full_disconnect(9);
        state.record_spawn();
        state.record_spawn();
        state.record_spawn();

        let severities: Vec<ViolationSeverity> = observer
            .violations()
            .iter()
            .map(|violation| violation.severity)
            .collect();
        assert_eq!(
            severities,
            [
                ViolationSeverity::Warning,
                ViolationSeverity::Error,
                ViolationSeverity::Error
            ]
        );
        assert!(observer
            .violations()
            .iter()
            .all(|violation| violation.kind == ViolationKind::Counters));
        assert_eq!(state.stats().clients_disconnected, 1);
    }

    #[test]
    fn all_parked_needs_server_and_every_client() {
        let mut state = FuzzState::new(2, targets(1, 1));
        state.record_client_parked();
        state.record_client_parked();
        assert!(!state.all_parked());
        state.mark_server_parked();
        assert!(state.all_parked());
    }

    #[test]
    fn invariant_check_flags_overfull_gauge() {
        let mut state = FuzzState::new(1, targets(1, 1));
        state.set_connected(3);
        let err = state.check_invariants().unwrap_err();
        assert!(err.to_string().contains("clients_connected"));
    }
}
