//! # DID Telemetry
//!
//! Logging bootstrap for binaries and tools built on `did-registry`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use did_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     init_telemetry(&TelemetryConfig::from_env()).expect("telemetry");
//!     // `[did]` events from the registry client are now emitted
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` / `DID_SERVICE_NAME` | `did-registry` | Service name |
//! | `DID_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `DID_CONSOLE_OUTPUT` | `true` | Emit to stdout |
//! | `DID_JSON_LOGS` | `false` (`true` in containers) | JSON lines |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A global subscriber is already installed.
    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),

    /// Unparseable configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging for the process.
///
/// Calling this twice returns [`TelemetryError::SubscriberInit`].
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    init_logging(config)
}
