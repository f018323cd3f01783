//! End-to-end runs of the swarm over the loopback backend.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use common::{small_builder, small_config, RecordingRenderer, ScriptedInterrupt};
use netfuzz::config::Library;
use netfuzz::console::PlainRenderer;
use netfuzz::interrupt::NoInterrupt;
use netfuzz::phase::{Phase, RunOutcome};
use netfuzz::runner::{run_swarm, Swarm};
use netfuzz::telemetry::CollectingObserver;
use netfuzz::transport::{
    select_transport, HostSettings, LinkConditions, LoopbackNetwork, Transport, TransportError,
};
use netfuzz::FuzzError;

#[test]
fn single_client_walks_all_four_phases() -> Result<(), FuzzError> {
    let config = small_config(1);
    let renderer = RecordingRenderer::new();
    let log = renderer.log();

    let report = run_swarm(&config, select_transport(&config)?, renderer, NoInterrupt)?;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.stats.clients_spawned, 1);
    assert_eq!(report.stats.clients_disconnected, 1);
    assert_eq!(report.stats.messages_exchanged, 12);

    let log = log.borrow();
    assert_eq!(log.completed_phases(), Phase::ALL.to_vec());
    assert_eq!(log.outcome, Some(RunOutcome::Completed));
    Ok(())
}

#[test]
fn churn_and_disconnections_meet_their_targets() -> Result<(), FuzzError> {
    let config = small_config(4);
    let renderer = RecordingRenderer::new();
    let log = renderer.log();

    let report = run_swarm(&config, select_transport(&config)?, renderer, NoInterrupt)?;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.stats.connection_iterations, 12);
    assert_eq!(report.stats.disconnection_iterations, 12);
    assert_eq!(report.stats.messages_exchanged, 4 * 6 * 2);
    assert_eq!(report.stats.clients_disconnected, 4);
    assert!(!report.stats.server_parked);
    assert_eq!(report.stats.clients_parked, 0);

    let log = log.borrow();
    let at_connections = log.stats_at(Phase::Connections).unwrap();
    assert_eq!(at_connections.clients_connected, 4);
    assert_eq!(at_connections.connection_iterations, 12);
    let at_spawning = log.stats_at(Phase::Spawning).unwrap();
    assert_eq!(at_spawning.clients_spawned, 4);
    Ok(())
}

#[test]
fn connection_progress_never_goes_backwards() -> Result<(), FuzzError> {
    let config = small_config(3);
    let renderer = RecordingRenderer::new();
    let log = renderer.log();
    run_swarm(&config, select_transport(&config)?, renderer, NoInterrupt)?;

    let log = log.borrow();
    let counters: Vec<u64> = log
        .progress
        .iter()
        .filter(|progress| progress.phase == Phase::Connections)
        .map(|progress| progress.current)
        .collect();
    assert!(!counters.is_empty());
    assert!(counters.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(counters.iter().all(|current| *current <= 12));
    Ok(())
}

#[test]
fn seeded_runs_replay_identically() -> Result<(), FuzzError> {
    let config = small_builder(3)
        .link_conditions(LinkConditions::sluggish())
        .message_iterations(10)
        .build()?;
    let run = || {
        run_swarm(
            &config,
            select_transport(&config)?,
            PlainRenderer::new(std::io::sink()),
            NoInterrupt,
        )
    };
    let first = run()?;
    let second = run()?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn delayed_link_still_completes() -> Result<(), FuzzError> {
    let config = small_builder(4)
        .message_iterations(10)
        .link_conditions(LinkConditions::builder().delay_range(0, 3).seed(17).build())
        .build()?;
    let report = run_swarm(
        &config,
        select_transport(&config)?,
        PlainRenderer::new(std::io::sink()),
        NoInterrupt,
    )?;
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.stats.clients_disconnected, 4);
    let link = report.link.unwrap();
    assert!(link.datagrams_delayed > 0);
    assert_eq!(link.datagrams_unreachable, 0);
    Ok(())
}

#[test]
fn unimplemented_library_fails_before_the_run() {
    let config = small_builder(2).library(Library::HyperNet).build().unwrap();
    let err = select_transport(&config).unwrap_err();
    assert_eq!(err, FuzzError::UnsupportedBackend { library: "HyperNet" });
    assert!(!err.is_fatal());
}

#[test]
fn interrupt_parks_everyone_and_aborts() -> Result<(), FuzzError> {
    let config = small_config(3);
    let renderer = RecordingRenderer::new();
    let log = renderer.log();
    let interrupt = ScriptedInterrupt::after(10);
    let polls = interrupt.polls();

    let report = run_swarm(&config, select_transport(&config)?, renderer, interrupt)?;

    assert!(matches!(report.outcome, RunOutcome::Aborted { .. }));
    assert!(report.stats.server_parked);
    assert_eq!(report.stats.clients_parked, 3);
    assert_eq!(report.stats.clients_disconnected, 0);
    assert_eq!(log.borrow().outcome, Some(report.outcome));
    // the fired interrupt is not polled again
    assert_eq!(*polls.borrow(), 11);
    Ok(())
}

#[test]
fn occupied_server_port_is_fatal() {
    let config = small_config(2);
    let network = LoopbackNetwork::default();
    let _squatter = network
        .create_host(HostSettings::server(config.server_address(), 1, 2, 1024))
        .unwrap();

    let err = run_swarm(
        &config,
        network,
        PlainRenderer::new(std::io::sink()),
        NoInterrupt,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        FuzzError::HostCreation {
            role: "Server",
            source: TransportError::AddressInUse { .. },
        }
    ));
    assert!(err.is_fatal());
}

#[test]
fn turn_limit_stops_a_long_run() {
    let config = small_builder(4).max_turns(5).build().unwrap();
    let err = run_swarm(
        &config,
        select_transport(&config).unwrap(),
        PlainRenderer::new(std::io::sink()),
        NoInterrupt,
    )
    .unwrap_err();
    assert_eq!(err, FuzzError::TurnLimitExceeded { limit: 5 });
}

#[test]
fn clean_run_reports_no_violations() -> Result<(), FuzzError> {
    let config = small_config(5);
    let observer = Arc::new(CollectingObserver::new());
    let report = Swarm::new(&config)
        .with_violation_observer(observer.clone())
        .run(
            select_transport(&config)?,
            PlainRenderer::new(std::io::sink()),
            NoInterrupt,
        )?;
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(observer.is_empty(), "{:?}", observer.violations());
    Ok(())
}

#[test]
fn report_serializes_to_json() -> Result<(), FuzzError> {
    let config = small_config(2);
    let report = run_swarm(
        &config,
        select_transport(&config)?,
        PlainRenderer::new(std::io::sink()),
        NoInterrupt,
    )?;
    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcome"]["status"], "completed");
    assert_eq!(json["stats"]["clients_disconnected"], 2);
    assert_eq!(json["seed"], common::TEST_SEED);
    Ok(())
}
