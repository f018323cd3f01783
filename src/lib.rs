//! # netfuzz
//!
//! A single-process swarm fuzzer for reliable datagram transports.
//!
//! One server and many clients share a thread. A round-robin [`Scheduler`] hands each of
//! them a turn in which it services its host and reacts to the events it finds, while a
//! [`PhaseController`] watches shared counters and walks the run through four phases:
//!
//! 1. **Spawning**: every client creates its host and connects.
//! 2. **Connections**: the server accepts and immediately drops connections until the
//!    churn target is met, and the clients keep reconnecting.
//! 3. **Transmission**: server and clients bounce random reliable payloads back and forth.
//! 4. **Disconnections**: the server closes each connection and the clients stay down.
//!
//! The bundled [`LoopbackNetwork`] backend speaks a small connection protocol over an
//! in-process datagram medium with optional seeded delivery delays. Other transports plug in
//! through the [`Transport`] and [`Host`] traits.
//!
//! ```
//! use netfuzz::prelude::*;
//!
//! let config = FuzzConfig::builder()
//!     .clients(4)
//!     .connection_iterations(20)
//!     .message_iterations(5)
//!     .seed(99)
//!     .build()?;
//! let report = Swarm::new(&config).run(
//!     select_transport(&config)?,
//!     PlainRenderer::new(std::io::sink()),
//!     NoInterrupt,
//! )?;
//! assert_eq!(report.outcome, RunOutcome::Completed);
//! assert_eq!(report.stats.connection_iterations, 20);
//! # Ok::<(), FuzzError>(())
//! ```
//!
//! [`Scheduler`]: scheduler::Scheduler
//! [`PhaseController`]: phase::PhaseController
//! [`LoopbackNetwork`]: transport::LoopbackNetwork
//! [`Transport`]: transport::Transport
//! [`Host`]: transport::Host

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use error::FuzzError;

pub mod actors;
pub mod cli;
pub mod config;
pub mod console;
#[doc(hidden)]
pub mod error;
pub mod interrupt;
pub mod payload;
pub mod phase;
pub mod prelude;
pub mod rng;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod telemetry;
pub mod transport;
