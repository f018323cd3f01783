use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::net::SocketAddr;

use crate::transport::TransportError;

/// This enum contains all errors a fuzzing run can produce. Most API functions return a [`Result<T, FuzzError>`].
///
/// Errors fall into two classes. Configuration errors ([`InvalidConfig`], [`UnsupportedBackend`])
/// are raised before any actor is scheduled. Everything else is raised while the swarm is running
/// and invalidates the whole run; see [`FuzzError::is_fatal`].
///
/// [`Result<T, FuzzError>`]: std::result::Result
/// [`InvalidConfig`]: FuzzError::InvalidConfig
/// [`UnsupportedBackend`]: FuzzError::UnsupportedBackend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuzzError {
    /// A configuration value was rejected before the run started.
    InvalidConfig {
        /// Further specifies why the configuration was invalid.
        info: String,
    },
    /// The selected networking library is recognized but has no implementation.
    UnsupportedBackend {
        /// Display name of the library.
        library: &'static str,
    },
    /// The backend failed to create a host.
    HostCreation {
        /// Which actor was creating the host.
        role: &'static str,
        /// The underlying transport failure.
        source: TransportError,
    },
    /// The backend refused to start a connection.
    Connection {
        /// The address that was being connected to.
        address: SocketAddr,
        /// The underlying transport failure.
        source: TransportError,
    },
    /// Servicing a host failed mid-run.
    Service {
        /// Which actor was servicing its host.
        role: &'static str,
        /// The underlying transport failure.
        source: TransportError,
    },
    /// Every actor parked before control returned to the root.
    RotationExhausted {
        /// Number of turns executed before the rotation ran dry.
        turns: u64,
    },
    /// The run exceeded its configured turn budget without finishing.
    TurnLimitExceeded {
        /// The configured turn limit.
        limit: u64,
    },
    /// The console collaborator failed.
    Console {
        /// A description of the console failure.
        context: String,
    },
}

impl FuzzError {
    /// Returns `true` for failures that occur after the swarm started.
    ///
    /// The binary aborts the process for these; configuration errors exit with a status code instead.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::InvalidConfig { .. } | Self::UnsupportedBackend { .. } | Self::Console { .. }
        )
    }
}

impl Display for FuzzError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuzzError::InvalidConfig { info } => {
                write!(f, "Invalid configuration: {}", info)
            }
            FuzzError::UnsupportedBackend { library } => {
                write!(f, "{} is not implemented!", library)
            }
            FuzzError::HostCreation { role, source } => {
                write!(f, "{} creation failed: {}", role, source)
            }
            FuzzError::Connection { address, source } => {
                write!(f, "Client connection to {} failed: {}", address, source)
            }
            FuzzError::Service { role, source } => {
                write!(f, "{} host service failed: {}", role, source)
            }
            FuzzError::RotationExhausted { turns } => {
                write!(
                    f,
                    "Every actor parked after {} turns without returning control to the root",
                    turns
                )
            }
            FuzzError::TurnLimitExceeded { limit } => {
                write!(f, "Run did not finish within {} turns", limit)
            }
            FuzzError::Console { context } => {
                write!(f, "Console error: {}", context)
            }
        }
    }
}

impl Error for FuzzError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FuzzError::HostCreation { source, .. }
            | FuzzError::Connection { source, .. }
            | FuzzError::Service { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FuzzError {
    fn from(err: std::io::Error) -> Self {
        FuzzError::Console {
            context: err.to_string(),
        }
    }
}
