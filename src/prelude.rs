//! Convenient re-exports for common usage.
//!
//! ```rust
//! use netfuzz::prelude::*;
//!
//! let config = FuzzConfig::builder().clients(3).seed(11).build().unwrap();
//! let transport = select_transport(&config).unwrap();
//! let report = run_swarm(&config, transport, PlainRenderer::new(std::io::sink()), NoInterrupt)
//!     .unwrap();
//! assert_eq!(report.outcome, RunOutcome::Completed);
//! assert_eq!(report.stats.clients_disconnected, 3);
//! ```

// Running
pub use crate::config::{FuzzConfig, FuzzConfigBuilder, Library};
pub use crate::runner::{run_swarm, RunReport, Swarm};

// Collaborators
pub use crate::console::PlainRenderer;
pub use crate::interrupt::{Interrupt, InterruptFlag, NoInterrupt};
pub use crate::phase::{Phase, PhaseProgress, PhaseRenderer, RunOutcome};
pub use crate::state::FuzzStats;

// Transport
pub use crate::transport::{
    select_transport, Host, HostEvent, HostSettings, LinkConditions, LoopbackNetwork, Packet,
    PeerId, Transport, TransportError,
};

// Errors and reporting
pub use crate::error::FuzzError;
pub use crate::telemetry::{CollectingObserver, ViolationObserver};
