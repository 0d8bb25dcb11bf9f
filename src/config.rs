//! Configuration for the ipmb-mux daemon
//!
//! Loads configuration from a TOML file with the parameters needed to run
//! the multiplexer: listener port, connection limits, socket timeouts, and
//! bus transceiver settings.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MuxConfig {
    pub network: NetworkConfig,
    pub bus: BusConfig,
    pub daemon: DaemonConfig,
    pub logging: LoggingConfig,
}

/// TCP listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Listener port on the loopback interface
    pub port: u16,

    /// Maximum concurrently held connections (clients + responder)
    pub max_connections: usize,

    /// Registration and socket write timeout in seconds
    ///
    /// Bounds every handshake read/write and every responder transfer.
    /// Client data reads are not bounded by this; a client connection is
    /// only torn down when the peer closes or the daemon shuts down.
    pub socket_timeout_secs: u64,
}

/// Bus transceiver configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BusConfig {
    /// Transceiver driver to use (`mock` is built in; the vendor driver
    /// plugs in through the `BusTransceiver` trait)
    pub driver: String,

    /// Our own 8-bit slave address on the bus (bit 0 must be clear)
    pub local_address: u8,

    /// How long the receiver thread waits on the bus per poll, in
    /// milliseconds
    pub read_timeout_ms: u64,

    /// Delay inserted between consecutive bus transfers, in milliseconds
    pub inter_transfer_delay_ms: u64,
}

/// Process control configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonConfig {
    /// Stay in the foreground (backgrounding is left to the service
    /// manager; this only controls startup logging)
    pub foreground: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl MuxConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: MuxConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Registration/transfer timeout as a `Duration`
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.network.socket_timeout_secs)
    }

    /// Bus receiver poll interval as a `Duration`
    pub fn bus_read_timeout(&self) -> Duration {
        Duration::from_millis(self.bus.read_timeout_ms)
    }

    /// Inter-transfer delay as a `Duration`
    pub fn inter_transfer_delay(&self) -> Duration {
        Duration::from_millis(self.bus.inter_transfer_delay_ms)
    }
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                port: 5623,
                max_connections: 5,
                socket_timeout_secs: 5,
            },
            bus: BusConfig {
                driver: "mock".to_string(),
                local_address: 0x10,
                read_timeout_ms: 100,
                inter_transfer_delay_ms: 0,
            },
            daemon: DaemonConfig { foreground: true },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}
