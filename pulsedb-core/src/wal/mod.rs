//! Segmented write-ahead log
//!
//! Append-only durability log split into size-bounded, monotonically
//! numbered segment files (`segment_0001.wal`, ...). Every append is forced
//! to stable storage before returning; replay at startup reconstructs all
//! state implied by logged writes. Segments are never deleted or merged.

mod record;
mod replay;

pub use record::{WalRecord, RECORD_TYPE_WRITE};

use crate::{PulseError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// WAL configuration
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Directory for segment files
    pub dir: PathBuf,
    /// Maximum segment size in bytes
    pub max_segment_size: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/wal"),
            max_segment_size: crate::config::WAL_SEGMENT_SIZE,
        }
    }
}

/// Position immediately after a record within the log.
/// Ordered by segment, then byte offset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct WalPosition {
    /// Segment index
    pub segment: u64,
    /// Byte offset just past the record in that segment
    pub offset: u64,
}

struct WalInner {
    file: Option<File>,
    segment: u64,
    size: u64,
}

/// The write-ahead log
pub struct Wal {
    config: WalConfig,
    inner: Mutex<WalInner>,
}

impl Wal {
    /// Open the log, starting a fresh segment numbered one past the highest
    /// existing segment (or 1 when the directory is empty).
    pub fn open(config: WalConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;

        let wal = Self {
            config,
            inner: Mutex::new(WalInner {
                file: None,
                segment: 0,
                size: 0,
            }),
        };

        wal.open_next_segment(&mut wal.inner.lock())?;
        Ok(wal)
    }

    /// Append one record and force it to stable storage.
    /// Returns the position just past the record.
    pub fn append(&self, record_type: &str, data: Vec<u8>) -> Result<WalPosition> {
        let framed = WalRecord::new(record_type, data).encode()?;

        let mut inner = self.inner.lock();

        if inner.size + framed.len() as u64 >= self.config.max_segment_size {
            self.rotate(&mut inner)?;
        }

        let file = Self::active_file(&mut inner)?;
        file.write_all(&framed)?;
        file.sync_all()?;
        inner.size += framed.len() as u64;

        Ok(WalPosition {
            segment: inner.segment,
            offset: inner.size,
        })
    }

    /// Force the active segment to stable storage
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(file) = inner.file.as_mut() {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Sync and close the active segment handle
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(file) = inner.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Index of the currently active segment
    pub fn current_segment(&self) -> u64 {
        self.inner.lock().segment
    }

    fn active_file(inner: &mut WalInner) -> Result<&mut File> {
        inner.file.as_mut().ok_or_else(|| {
            PulseError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "write-ahead log is closed",
            ))
        })
    }

    fn rotate(&self, inner: &mut WalInner) -> Result<()> {
        if let Some(file) = inner.file.take() {
            file.sync_all()?;
        }
        self.open_next_segment(inner)
    }

    fn open_next_segment(&self, inner: &mut WalInner) -> Result<()> {
        let next = self
            .list_segments()?
            .last()
            .map(|&(index, _)| index + 1)
            .unwrap_or(1);

        let path = self.segment_path(next);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();

        inner.file = Some(file);
        inner.segment = next;
        inner.size = size;
        Ok(())
    }

    fn segment_path(&self, index: u64) -> PathBuf {
        self.config.dir.join(format!("segment_{:04}.wal", index))
    }

    /// All segment files, ascending by index
    fn list_segments(&self) -> Result<Vec<(u64, PathBuf)>> {
        let mut segments = Vec::new();

        for entry in fs::read_dir(&self.config.dir)? {
            let path = entry?.path();
            if let Some(index) = parse_segment_index(&path) {
                segments.push((index, path));
            }
        }

        segments.sort_by_key(|&(index, _)| index);
        Ok(segments)
    }
}

fn parse_segment_index(path: &std::path::Path) -> Option<u64> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|s| s.strip_prefix("segment_"))
        .and_then(|s| s.strip_suffix(".wal"))
        .and_then(|s| s.parse().ok())
}
