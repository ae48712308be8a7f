//! Engine orchestration
//!
//! Ties the WAL, index, file manager, and per-series writers into one
//! write/read contract. Every write is appended to the WAL and forced to
//! stable storage before any other mutation; replay of the WAL at startup
//! reconstructs all state implied by logged writes.

mod writer;

pub use writer::SeriesWriter;

use crate::index::IndexManager;
use crate::storage::FileManager;
use crate::wal::{Wal, WalConfig, WalPosition, RECORD_TYPE_WRITE};
use crate::{
    Point, PulseError, Query, QueryResult, Result, SeriesData, SeriesId, TimeRange, WriteRequest,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// When buffered points are compressed into blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushPolicy {
    /// Flush on every append; a block per write call
    #[default]
    EveryWrite,
    /// Buffer until the block size bound is reached. Points are still
    /// durable (WAL) and visible (buffer merge on read) as soon as `write`
    /// returns.
    WhenFull,
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root data directory
    pub data_dir: PathBuf,
    /// Points per block; also the buffering threshold under `WhenFull`
    pub block_size: usize,
    /// Flush policy
    pub flush_policy: FlushPolicy,
    /// WAL configuration; the directory is always `<data_dir>/wal`
    pub wal: WalConfig,
}

impl EngineConfig {
    /// Configuration with defaults rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            block_size: crate::config::DEFAULT_BLOCK_SIZE,
            flush_policy: FlushPolicy::default(),
            wal: WalConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("data")
    }
}

/// Tracks which appended WAL records have their effects fully in on-disk
/// blocks. The durable checkpoint is the highest position with no earlier
/// record still outstanding; replay resumes just past it.
#[derive(Debug, Default)]
struct CheckpointTracker {
    /// Appended records whose effects are not yet fully in blocks
    inflight: BTreeSet<WalPosition>,
    /// Applied records still buffered in a writer (`WhenFull`)
    deferred: BTreeSet<WalPosition>,
    /// Records fully in blocks but blocked by an earlier outstanding record
    completed: BTreeSet<WalPosition>,
    durable: Option<WalPosition>,
}

impl CheckpointTracker {
    fn begin(&mut self, position: WalPosition) {
        self.inflight.insert(position);
    }

    /// Mark a record applied but still buffered; it stays outstanding until
    /// the next full flush
    fn defer(&mut self, position: WalPosition) {
        self.deferred.insert(position);
    }

    /// Mark a record's effects fully in blocks; returns the durable
    /// checkpoint if it advanced
    fn complete(&mut self, position: WalPosition) -> Option<WalPosition> {
        self.inflight.remove(&position);
        self.deferred.remove(&position);
        self.completed.insert(position);
        self.advance()
    }

    /// Drain deferred records after a full flush of every writer
    fn complete_deferred(&mut self) -> Option<WalPosition> {
        for position in std::mem::take(&mut self.deferred) {
            self.inflight.remove(&position);
            self.completed.insert(position);
        }
        self.advance()
    }

    fn advance(&mut self) -> Option<WalPosition> {
        let candidate = match self.inflight.first() {
            Some(&earliest) => self.completed.range(..earliest).next_back().copied(),
            None => self.completed.last().copied(),
        }?;

        if self.durable.map_or(true, |d| candidate > d) {
            self.durable = Some(candidate);
            self.completed.retain(|&p| p > candidate);
            Some(candidate)
        } else {
            None
        }
    }
}

type WriterMap = HashMap<u64, Arc<Mutex<SeriesWriter>>>;

/// The embedded time-series storage engine
pub struct Engine {
    config: EngineConfig,
    wal: Wal,
    index: IndexManager,
    files: FileManager,
    writers: RwLock<WriterMap>,
    checkpoints: Mutex<CheckpointTracker>,
}

impl Engine {
    /// Open (or create) an engine rooted at the configured data directory,
    /// recovering any previous state. Returns only after WAL replay is
    /// complete.
    pub fn open(config: EngineConfig) -> Result<Self> {
        fs::create_dir_all(config.data_dir.join("metrics"))?;

        let wal = Wal::open(WalConfig {
            dir: config.data_dir.join("wal"),
            ..config.wal.clone()
        })?;

        let engine = Self {
            index: IndexManager::new(&config.data_dir),
            files: FileManager::new(&config.data_dir),
            writers: RwLock::new(HashMap::new()),
            checkpoints: Mutex::new(CheckpointTracker::default()),
            config,
            wal,
        };

        // The snapshot is a cache; absence or damage falls back to replay
        if let Err(e) = engine.index.load() {
            warn!(error = %e, "index snapshot not loaded, relying on WAL replay");
        }

        engine.restore_writers()?;
        engine.recover_from_wal()?;

        if let Err(e) = engine.index.save() {
            warn!(error = %e, "failed to save index snapshot after recovery");
        }

        info!(series = engine.index.series_count(), "engine initialized");
        Ok(engine)
    }

    /// Durably log and apply a write request. When this returns, every
    /// supplied point is in the WAL and visible to `read`.
    pub fn write(&self, request: &WriteRequest) -> Result<()> {
        if request.series.is_empty() {
            return Ok(());
        }

        let payload = bincode::serialize(request)
            .map_err(|e| PulseError::InvalidFormat(format!("write request encode: {}", e)))?;
        let position = self.wal.append(RECORD_TYPE_WRITE, payload)?;
        self.checkpoints.lock().begin(position);

        // A failed apply leaves its position in flight so the checkpoint
        // cannot advance past it; restart replay redoes the record.
        let fully_flushed = self.apply_write(request)?;

        let durable = {
            let mut tracker = self.checkpoints.lock();
            if fully_flushed {
                tracker.complete(position)
            } else {
                tracker.defer(position);
                None
            }
        };
        if let Some(position) = durable {
            self.index.set_wal_checkpoint(position);
        }

        if let Err(e) = self.index.save() {
            warn!(error = %e, "failed to save index snapshot");
        }

        Ok(())
    }

    /// Resolve matching series and return their points within the query's
    /// inclusive time range. Series contributing no points are dropped.
    pub fn read(&self, query: &Query) -> Result<QueryResult> {
        let series_ids = self.index.find_series(&query.metric, &query.tags);
        debug!(
            metric = %query.metric,
            matched = series_ids.len(),
            "resolved query series"
        );

        let mut result = QueryResult {
            series: Vec::with_capacity(series_ids.len()),
        };

        for series_id in series_ids {
            let points = self.read_series_points(&series_id, query.time_range)?;
            if !points.is_empty() {
                result.series.push(SeriesData { series_id, points });
            }
        }

        Ok(result)
    }

    /// Series under `metric` matching the tag filters
    pub fn find_series(&self, metric: &str, filters: &BTreeMap<String, String>) -> Vec<SeriesId> {
        self.index.find_series(metric, filters)
    }

    /// Every series known to the catalog
    pub fn all_series(&self) -> Vec<SeriesId> {
        self.index
            .all_series()
            .into_iter()
            .map(|(_, metadata)| metadata.series_id)
            .collect()
    }

    /// Number of series in the catalog
    pub fn series_count(&self) -> usize {
        self.index.series_count()
    }

    /// Flush every active writer and persist the index snapshot
    pub fn flush(&self) -> Result<()> {
        let writers: Vec<_> = self.writers.read().values().cloned().collect();
        for writer in writers {
            let mut guard = writer.lock();
            guard.flush()?;
            self.index.upsert_series(guard.metadata().clone());
        }

        if let Some(position) = self.checkpoints.lock().complete_deferred() {
            self.index.set_wal_checkpoint(position);
        }

        self.index.save()
    }

    /// Flush everything and close the WAL
    pub fn close(&self) -> Result<()> {
        self.flush()?;
        self.wal.close()
    }

    fn apply_write(&self, request: &WriteRequest) -> Result<bool> {
        let flush_now = self.config.flush_policy == FlushPolicy::EveryWrite;
        let mut fully_flushed = true;

        for series_data in &request.series {
            if series_data.points.is_empty() {
                continue;
            }

            let writer = self.writer_for(&series_data.series_id)?;
            let mut guard = writer.lock();
            guard.append(&series_data.points, flush_now)?;
            if guard.has_buffered() {
                fully_flushed = false;
            }
            self.index.upsert_series(guard.metadata().clone());
        }

        Ok(fully_flushed)
    }

    /// Find or create the single writer for a series. Creation opens the
    /// series file and registers the series in the index.
    fn writer_for(&self, series_id: &SeriesId) -> Result<Arc<Mutex<SeriesWriter>>> {
        let hash = IndexManager::hash_series(series_id);

        if let Some(writer) = self.writers.read().get(&hash) {
            return Ok(writer.clone());
        }

        let mut writers = self.writers.write();
        if let Some(writer) = writers.get(&hash) {
            return Ok(writer.clone());
        }

        let (path, file) = self
            .files
            .open_series_file(&series_id.metric, &series_id.tags)?;
        let metadata = crate::SeriesMetadata::new(
            series_id.clone(),
            path,
            chrono::Utc::now().timestamp_millis(),
        );
        self.index.upsert_series(metadata.clone());
        info!(series = %series_id, "created new series");

        let writer = Arc::new(Mutex::new(SeriesWriter::new(
            metadata,
            file,
            self.config.block_size,
            self.files.clone(),
        )));
        writers.insert(hash, writer.clone());
        Ok(writer)
    }

    fn read_series_points(&self, series_id: &SeriesId, range: TimeRange) -> Result<Vec<Point>> {
        let hash = IndexManager::hash_series(series_id);
        let writer = self.writers.read().get(&hash).cloned();

        match writer {
            Some(writer) => {
                // Holding the writer's lock serializes this read against an
                // in-progress flush of the same series
                let guard = writer.lock();
                let mut points =
                    self.files
                        .read_points(&guard.metadata().file_path, range.start, range.end)?;
                points.extend(guard.buffered_points_in(range));
                Ok(points)
            }
            None => match self.index.get_series(series_id) {
                Some(metadata) if metadata.file_path.exists() => {
                    self.files
                        .read_points(&metadata.file_path, range.start, range.end)
                }
                _ => Ok(Vec::new()),
            },
        }
    }

    /// Reopen the file of every series in the loaded snapshot and restore
    /// its writer so subsequent appends continue correctly
    fn restore_writers(&self) -> Result<()> {
        for (hash, metadata) in self.index.all_series() {
            let (path, file) = self
                .files
                .open_series_file(&metadata.series_id.metric, &metadata.series_id.tags)?;

            let mut metadata = metadata;
            metadata.file_path = path;
            self.index.upsert_series(metadata.clone());

            let writer = SeriesWriter::new(
                metadata,
                file,
                self.config.block_size,
                self.files.clone(),
            );
            self.writers
                .write()
                .insert(hash, Arc::new(Mutex::new(writer)));
        }

        Ok(())
    }

    /// Replay logged writes past the durable checkpoint through the normal
    /// apply path. Replay is at-least-once: without a checkpoint, records
    /// whose blocks were already flushed before a crash are reapplied and
    /// their points duplicated.
    fn recover_from_wal(&self) -> Result<()> {
        let checkpoint = self.index.wal_checkpoint();
        let mut last_applied: Option<WalPosition> = None;

        self.wal.replay(checkpoint, |position, record_type, data| {
            match record_type {
                RECORD_TYPE_WRITE => {
                    let request: WriteRequest = match bincode::deserialize(data) {
                        Ok(request) => request,
                        Err(e) => {
                            warn!(?position, error = %e, "skipping undecodable write record");
                            return Ok(());
                        }
                    };

                    for series_data in &request.series {
                        if series_data.points.is_empty() {
                            continue;
                        }
                        let writer = self.writer_for(&series_data.series_id)?;
                        let mut guard = writer.lock();
                        guard.append(&series_data.points, true)?;
                        self.index.upsert_series(guard.metadata().clone());
                    }

                    last_applied = Some(position);
                }
                other => {
                    debug!(record_type = other, "ignoring WAL record type");
                }
            }
            Ok(())
        })?;

        if let Some(position) = last_applied {
            self.index.set_wal_checkpoint(position);
        }

        Ok(())
    }
}
