//! Command line surface of the `netfuzz` binary.

use clap::Parser;
use tracing::Level;

use crate::config::{FuzzConfig, Library, DEFAULT_CLIENTS, DEFAULT_PORT};
use crate::state::{DEFAULT_CONNECTION_ITERATIONS, DEFAULT_MESSAGE_ITERATIONS};
use crate::transport::LinkConditions;
use crate::FuzzError;

/// Drive a reliable datagram transport through connection churn, echo traffic and
/// disconnection with one server and many clients in a single process.
///
/// Press any key during a run to park every actor and stop early.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "netfuzz", version)]
pub struct Cli {
    /// Networking library to fuzz (`0` = hypernet, `1` = loopback)
    #[arg(short, long, value_enum)]
    pub library: Library,

    /// Number of simultaneous clients
    #[arg(short, long, default_value_t = DEFAULT_CLIENTS)]
    pub clients: usize,

    /// Server port on ::1
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Connections the server accepts and drops before serving traffic
    #[arg(long, default_value_t = DEFAULT_CONNECTION_ITERATIONS)]
    pub connection_iterations: u64,

    /// Round trips each client takes part in
    #[arg(long, default_value_t = DEFAULT_MESSAGE_ITERATIONS)]
    pub message_iterations: u64,

    /// Seed for payloads and link delays (random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Smallest delivery delay of the loopback medium, in service calls
    #[arg(long, default_value_t = 0)]
    pub latency_min: u32,

    /// Largest delivery delay of the loopback medium, in service calls
    #[arg(long)]
    pub latency_max: Option<u32>,

    /// Fail once the scheduler has run this many turns
    #[arg(long)]
    pub max_turns: Option<u64>,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Most detailed level the log subscriber lets through.
    #[must_use]
    pub const fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    /// Builds and validates the run configuration.
    pub fn to_config(&self) -> Result<FuzzConfig, FuzzError> {
        let max_delay = self.latency_max.unwrap_or(self.latency_min);
        if max_delay < self.latency_min {
            return Err(FuzzError::InvalidConfig {
                info: format!(
                    "--latency-max ({}) is below --latency-min ({})",
                    max_delay, self.latency_min
                ),
            });
        }
        let link = if max_delay == 0 {
            LinkConditions::passthrough()
        } else {
            LinkConditions::builder()
                .delay_range(self.latency_min, max_delay)
                .build()
        };

        let mut builder = FuzzConfig::builder()
            .library(self.library)
            .clients(self.clients)
            .port(self.port)
            .connection_iterations(self.connection_iterations)
            .message_iterations(self.message_iterations)
            .link_conditions(link);
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        if let Some(turns) = self.max_turns {
            builder = builder.max_turns(turns);
        }
        builder.build()
    }
}
