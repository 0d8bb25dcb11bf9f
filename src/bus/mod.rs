//! Bus transceiver abstraction
//!
//! The daemon talks to exactly one management bus through the
//! [`BusTransceiver`] trait. The trait object is shared behind a mutex by
//! the sender and receiver threads in [`io`](crate::bus::io); a driver only
//! has to provide blocking read/write with a deadline and a reset hook.
//!
//! The `mock` driver is always compiled in; it backs the integration tests
//! and lets the daemon run on machines without bus hardware.

pub mod io;
pub mod mock;

use crate::config::MuxConfig;
use crate::error::Result;
use crate::protocol::{CC_DEST_UNAVAILABLE, CC_INVALID_CMD, CC_NODE_BUSY, CC_TIMEOUT};
use std::time::Duration;

use self::mock::MockBus;

/// Errors surfaced by a bus driver
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Bus transfer timed out")]
    Timeout,

    #[error("Target did not acknowledge")]
    Nak,

    #[error("Target device busy")]
    DeviceBusy,

    #[error("Bus arbitration lost or bus busy")]
    BusBusy,

    #[error("Driver buffer allocation failed")]
    AllocationFailed,

    #[error("Invalid transfer parameter: {0}")]
    InvalidParameter(String),

    #[error("Bus I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BusError {
    /// Completion code reported to the requester when a transfer fails
    pub fn completion_code(&self) -> u8 {
        match self {
            BusError::Timeout => CC_TIMEOUT,
            BusError::Nak => CC_DEST_UNAVAILABLE,
            BusError::DeviceBusy | BusError::BusBusy => CC_NODE_BUSY,
            _ => CC_INVALID_CMD,
        }
    }
}

pub type BusResult<T> = std::result::Result<T, BusError>;

/// Blocking interface to one management bus
pub trait BusTransceiver: Send {
    /// Read one inbound frame into `buf`, waiting at most `timeout`
    ///
    /// Returns the number of bytes read; [`BusError::Timeout`] when no
    /// frame arrived in time.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> BusResult<usize>;

    /// Transmit one complete frame, waiting at most `timeout` for the bus
    fn write(&mut self, frame: &[u8], timeout: Duration) -> BusResult<()>;

    /// Recover the bus after a fatal transfer error
    fn reset(&mut self) -> BusResult<()>;
}

/// Instantiate the bus driver named in the configuration
pub fn create_bus(config: &MuxConfig) -> Result<Box<dyn BusTransceiver>> {
    match config.bus.driver.as_str() {
        "mock" => Ok(Box::new(MockBus::new())),
        other => Err(crate::error::Error::InvalidParameter(format!(
            "unknown bus driver '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_code_mapping() {
        assert_eq!(BusError::Timeout.completion_code(), CC_TIMEOUT);
        assert_eq!(BusError::Nak.completion_code(), CC_DEST_UNAVAILABLE);
        assert_eq!(BusError::DeviceBusy.completion_code(), CC_NODE_BUSY);
        assert_eq!(BusError::BusBusy.completion_code(), CC_NODE_BUSY);
        assert_eq!(BusError::AllocationFailed.completion_code(), CC_INVALID_CMD);
    }

    #[test]
    fn test_create_bus_dispatch() {
        let mut config = MuxConfig::default();
        assert!(create_bus(&config).is_ok());
        config.bus.driver = "pci-vendor".to_string();
        assert!(create_bus(&config).is_err());
    }
}
