//! Error types for PulseDB

use thiserror::Error;

/// Result type alias for PulseDB operations
pub type Result<T> = std::result::Result<T, PulseError>;

/// PulseDB error types
#[derive(Error, Debug)]
pub enum PulseError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Data corruption detected
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Invalid data format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    Compression(String),
}

impl PulseError {
    /// Check if error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(self, PulseError::Corruption(_))
    }
}
