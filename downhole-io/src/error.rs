//! Error types for downhole-io

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// downhole-io error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Type id not present in the packet table
    #[error("Unknown packet type: {0:#04x}")]
    UnknownPacketType(u8),

    /// Fewer bytes than the declared layout requires
    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required by the layout
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Frame does not start with the start marker
    #[error("Missing start marker, found {0:#04x}")]
    MissingMarker(u8),

    /// Checksum mismatch
    #[error("Checksum error: expected {expected:#06x}, got {actual:#06x}")]
    Checksum {
        /// Checksum computed over type id + payload
        expected: u16,
        /// Checksum carried by the frame
        actual: u16,
    },

    /// A wire field holds a value with no meaning for its packet type
    #[error("Invalid value {value} for field {field}")]
    InvalidField {
        /// Field name from the layout table
        field: &'static str,
        /// Raw wire value
        value: i64,
    },

    /// Shared store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Transport reached end of stream (port closed)
    #[error("Transport disconnected")]
    Disconnected,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
