//! Benchmarks for whole swarm runs and the datagram codec
//!
//! Run with: cargo bench --bench swarm

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use netfuzz::config::FuzzConfig;
use netfuzz::console::PlainRenderer;
use netfuzz::interrupt::NoInterrupt;
use netfuzz::payload::PayloadGenerator;
use netfuzz::rng::{Pcg32, SeedableRng};
use netfuzz::runner::run_swarm;
use netfuzz::transport::{select_transport, LinkConditions};
use std::hint::black_box;

fn run(config: &FuzzConfig) -> u64 {
    let transport = select_transport(config).unwrap();
    let report = run_swarm(config, transport, PlainRenderer::new(std::io::sink()), NoInterrupt).unwrap();
    report.turns
}

fn bench_swarm_clients(c: &mut Criterion) {
    let mut group = c.benchmark_group("swarm_clients");
    for clients in [1usize, 8, 32] {
        let config = FuzzConfig::builder()
            .clients(clients)
            .connection_iterations(50)
            .message_iterations(10)
            .seed(7)
            .build()
            .unwrap();
        group.throughput(Throughput::Elements(config.targets.exchange_target(clients as u64)));
        group.bench_with_input(BenchmarkId::from_parameter(clients), &config, |b, config| {
            b.iter(|| black_box(run(config)));
        });
    }
    group.finish();
}

fn bench_swarm_delayed_link(c: &mut Criterion) {
    let config = FuzzConfig::builder()
        .clients(8)
        .connection_iterations(50)
        .message_iterations(10)
        .seed(7)
        .link_conditions(LinkConditions::congested())
        .build()
        .unwrap();
    c.bench_function("swarm_congested_8_clients", |b| {
        b.iter(|| black_box(run(&config)));
    });
}

fn bench_payload_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload_generation");
    for capacity in [64usize, 1024, 16 * 1024] {
        let mut payloads = PayloadGenerator::new(capacity, Pcg32::seed_from_u64(3));
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, _| {
            b.iter(|| black_box(payloads.packet()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_swarm_clients,
    bench_swarm_delayed_link,
    bench_payload_generation
);
criterion_main!(benches);
