//! PulseDB Core - Embedded Time-Series Storage Engine
//!
//! Durable ingestion of timestamped numeric samples grouped into named,
//! tagged series, and range-filtered retrieval.
//!
//! # Architecture
//!
//! - **Compression**: delta + zigzag varint timestamps, XOR-delta values
//! - **Storage**: bounded compressed blocks in per-series append-only files
//! - **WAL (Write-Ahead Log)**: segmented durability log, replayed at startup
//! - **Index**: in-memory series catalog with inverted tag lookup and a
//!   best-effort JSON snapshot
//! - **Engine**: WAL-first write path, per-series writers, checkpointed
//!   crash recovery

pub mod compression;
pub mod engine;
pub mod index;
pub mod storage;
pub mod wal;

mod error;
mod types;

pub use engine::{Engine, EngineConfig, FlushPolicy};
pub use error::{PulseError, Result};
pub use types::*;

/// PulseDB version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Default points per block
    pub const DEFAULT_BLOCK_SIZE: usize = 1000;

    /// WAL segment size (64MB)
    pub const WAL_SEGMENT_SIZE: u64 = 64 * 1024 * 1024;

    /// Index snapshot file name
    pub const INDEX_FILE_NAME: &str = "global.index";
}
