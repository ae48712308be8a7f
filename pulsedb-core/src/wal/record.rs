//! WAL record serialization
//!
//! On disk every record is `[u32 length, little-endian][bincode record]`.
//! Record boundaries are determined solely by the length prefix; there is no
//! per-record checksum (see the replay notes in `mod.rs`).

use crate::{PulseError, Result};
use serde::{Deserialize, Serialize};

/// Record type for engine write batches
pub const RECORD_TYPE_WRITE: &str = "write";

/// A single write-ahead log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalRecord {
    /// Record type tag
    pub record_type: String,
    /// Wall-clock time of the append, unix milliseconds
    pub timestamp: i64,
    /// Opaque serialized payload
    pub data: Vec<u8>,
}

impl WalRecord {
    /// Create a record stamped with the current wall-clock time
    pub fn new(record_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            record_type: record_type.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            data,
        }
    }

    /// Serialize with the 4-byte length prefix
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)
            .map_err(|e| PulseError::InvalidFormat(format!("WAL record encode: {}", e)))?;

        let mut framed = Vec::with_capacity(4 + body.len());
        framed.extend_from_slice(&(body.len() as u32).to_le_bytes());
        framed.extend_from_slice(&body);
        Ok(framed)
    }

    /// Deserialize a record body (without the length prefix)
    pub fn decode(body: &[u8]) -> Result<Self> {
        bincode::deserialize(body)
            .map_err(|e| PulseError::InvalidFormat(format!("WAL record decode: {}", e)))
    }
}
