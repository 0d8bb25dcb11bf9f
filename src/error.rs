//! Error types for ipmb-mux

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// ipmb-mux error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration file could not be serialized
    #[error("Configuration write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// Communication timeout
    #[error("Communication timeout")]
    Timeout,

    /// Invalid packet or frame
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Checksum mismatch
    #[error("Checksum error: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumError {
        /// Expected checksum value
        expected: u8,
        /// Actual checksum value
        actual: u8,
    },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A message queue endpoint was dropped while the queue was in use
    #[error("Message queue closed")]
    QueueClosed,

    /// A non-blocking post found the queue at capacity
    #[error("Message queue full")]
    QueueFull,

    /// All connection slots are in use
    #[error("No connection slot available")]
    NoSlotAvailable,

    /// A responder is already registered
    #[error("Responder already registered")]
    ResponderBusy,

    /// Bus transceiver error
    #[error("Bus error: {0}")]
    Bus(#[from] crate::bus::BusError),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
