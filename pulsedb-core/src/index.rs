//! Global in-memory series index
//!
//! Catalog of every known series: metadata by hash, a metric bucket, and an
//! inverted tag index consulted by lookup. The whole catalog is persisted
//! opportunistically as a JSON snapshot (temp file + atomic rename); the
//! snapshot is a best-effort cache, never the source of truth. WAL replay
//! reconstructs write-path state after a crash.

use crate::wal::WalPosition;
use crate::{PulseError, Result, SeriesId, SeriesMetadata};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use xxhash_rust::xxh64::Xxh64;

/// Filter value matching any tag value for its key
pub const TAG_WILDCARD: &str = "*";

/// The serialized catalog
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GlobalIndex {
    /// Series metadata by series hash
    pub series: HashMap<u64, SeriesMetadata>,
    /// Metric name to the hashes of its series
    pub metric_to_series: HashMap<String, HashSet<u64>>,
    /// Tag key to tag value to the hashes of series carrying that pair
    pub tag_index: HashMap<String, HashMap<String, HashSet<u64>>>,
    /// Position of the last WAL record whose effects are fully in on-disk
    /// blocks; replay resumes just past it
    pub wal_checkpoint: Option<WalPosition>,
}

/// Manages the global index and its snapshot file
pub struct IndexManager {
    index: RwLock<GlobalIndex>,
    index_file: PathBuf,
}

impl IndexManager {
    /// Create an empty index persisting under `data_dir`
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            index: RwLock::new(GlobalIndex::default()),
            index_file: data_dir.as_ref().join(crate::config::INDEX_FILE_NAME),
        }
    }

    /// Stable keyed 64-bit hash identifying a series: metric bytes, then
    /// each tag key and value in sorted key order. Invariant under tag
    /// insertion order.
    pub fn hash_series(series_id: &SeriesId) -> u64 {
        let mut hasher = Xxh64::new(0);
        hasher.update(series_id.metric.as_bytes());
        for (key, value) in &series_id.tags {
            hasher.update(key.as_bytes());
            hasher.update(value.as_bytes());
        }
        hasher.digest()
    }

    /// Register or refresh a series under its hash, metric bucket, and
    /// every tag bucket
    pub fn upsert_series(&self, metadata: SeriesMetadata) {
        let hash = Self::hash_series(&metadata.series_id);
        let mut index = self.index.write();

        index
            .metric_to_series
            .entry(metadata.series_id.metric.clone())
            .or_default()
            .insert(hash);

        for (key, value) in &metadata.series_id.tags {
            index
                .tag_index
                .entry(key.clone())
                .or_default()
                .entry(value.clone())
                .or_default()
                .insert(hash);
        }

        index.series.insert(hash, metadata);
    }

    /// Metadata for one series, if known
    pub fn get_series(&self, series_id: &SeriesId) -> Option<SeriesMetadata> {
        let hash = Self::hash_series(series_id);
        self.index.read().series.get(&hash).cloned()
    }

    /// All known series metadata, by hash
    pub fn all_series(&self) -> Vec<(u64, SeriesMetadata)> {
        let index = self.index.read();
        let mut series: Vec<_> = index
            .series
            .iter()
            .map(|(&hash, meta)| (hash, meta.clone()))
            .collect();
        series.sort_by_key(|&(hash, _)| hash);
        series
    }

    /// Number of known series
    pub fn series_count(&self) -> usize {
        self.index.read().series.len()
    }

    /// Find series under `metric` matching every tag filter. Lookup
    /// intersects the metric bucket with per-filter candidate sets from the
    /// inverted tag index: an exact value bucket, or for the `*` wildcard
    /// the union across all values of the key (the key must be present on
    /// the series). Results are in ascending hash order.
    pub fn find_series(&self, metric: &str, filters: &BTreeMap<String, String>) -> Vec<SeriesId> {
        let index = self.index.read();

        let Some(metric_bucket) = index.metric_to_series.get(metric) else {
            return Vec::new();
        };

        let mut candidates: HashSet<u64> = metric_bucket.clone();

        for (key, value) in filters {
            let Some(value_buckets) = index.tag_index.get(key) else {
                return Vec::new();
            };

            if value == TAG_WILDCARD {
                candidates.retain(|hash| {
                    value_buckets.values().any(|bucket| bucket.contains(hash))
                });
            } else {
                match value_buckets.get(value) {
                    Some(bucket) => candidates.retain(|hash| bucket.contains(hash)),
                    None => return Vec::new(),
                }
            }

            if candidates.is_empty() {
                return Vec::new();
            }
        }

        let mut hashes: Vec<u64> = candidates.into_iter().collect();
        hashes.sort_unstable();

        hashes
            .into_iter()
            .filter_map(|hash| index.series.get(&hash).map(|m| m.series_id.clone()))
            .collect()
    }

    /// The persisted WAL checkpoint, if any
    pub fn wal_checkpoint(&self) -> Option<WalPosition> {
        self.index.read().wal_checkpoint
    }

    /// Record the WAL position whose effects are fully on disk
    pub fn set_wal_checkpoint(&self, position: WalPosition) {
        let mut index = self.index.write();
        if index.wal_checkpoint.map_or(true, |cp| position > cp) {
            index.wal_checkpoint = Some(position);
        }
    }

    /// Persist the snapshot: serialize, write to a temp path, atomically
    /// rename into place
    pub fn save(&self) -> Result<()> {
        let data = {
            let index = self.index.read();
            serde_json::to_vec_pretty(&*index)
                .map_err(|e| PulseError::InvalidFormat(format!("index snapshot encode: {}", e)))?
        };

        let tmp_file = self.index_file.with_extension("tmp");
        fs::write(&tmp_file, data)?;
        fs::rename(&tmp_file, &self.index_file)?;
        Ok(())
    }

    /// Load the snapshot. A missing or unreadable snapshot is an error the
    /// caller tolerates, not a fatal condition for this component.
    pub fn load(&self) -> Result<()> {
        let data = fs::read(&self.index_file)?;
        let loaded: GlobalIndex = serde_json::from_slice(&data)
            .map_err(|e| PulseError::InvalidFormat(format!("index snapshot decode: {}", e)))?;

        debug!(series = loaded.series.len(), "loaded index snapshot");
        *self.index.write() = loaded;
        Ok(())
    }
}
