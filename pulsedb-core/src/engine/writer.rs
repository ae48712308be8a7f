//! Per-series writer
//!
//! Owns a series' append handle, its in-memory point buffer, and its
//! metadata. Exactly one writer exists per series hash; the engine wraps
//! each in a mutex that serializes appends, flushes, and reads of the same
//! series.

use crate::storage::{split_points, DataBlock, FileManager, MAX_BLOCK_POINTS};
use crate::{Point, Result, SeriesMetadata, TimeRange};
use std::fs::File;

pub struct SeriesWriter {
    metadata: SeriesMetadata,
    file: File,
    buffer: Vec<Point>,
    block_size: usize,
    files: FileManager,
}

impl SeriesWriter {
    pub fn new(
        metadata: SeriesMetadata,
        file: File,
        block_size: usize,
        files: FileManager,
    ) -> Self {
        let block_size = block_size.clamp(1, MAX_BLOCK_POINTS);
        Self {
            metadata,
            file,
            buffer: Vec::with_capacity(block_size),
            block_size,
            files,
        }
    }

    /// Buffer points, flushing when `flush_now` is set or the buffer has
    /// reached the block size bound
    pub fn append(&mut self, points: &[Point], flush_now: bool) -> Result<()> {
        self.buffer.extend_from_slice(points);

        if flush_now || self.buffer.len() >= self.block_size {
            self.flush()?;
        }

        Ok(())
    }

    /// Compress the buffer into blocks of at most `block_size` points and
    /// append them to the series file
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let buffer = std::mem::take(&mut self.buffer);
        for chunk in split_points(&buffer, self.block_size) {
            let block = DataBlock::from_points(chunk)?;
            self.files.write_block(&mut self.file, &block)?;
            self.update_metadata(&block);
        }

        Ok(())
    }

    /// Whether any points are buffered but not yet in a block
    pub fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Buffered points falling inside the inclusive range, in insertion order
    pub fn buffered_points_in(&self, range: TimeRange) -> Vec<Point> {
        self.buffer
            .iter()
            .filter(|p| range.contains(p.timestamp))
            .copied()
            .collect()
    }

    pub fn metadata(&self) -> &SeriesMetadata {
        &self.metadata
    }

    fn update_metadata(&mut self, block: &DataBlock) {
        let m = &mut self.metadata;

        if m.total_points == 0 {
            m.start_time = block.min_time;
            m.end_time = block.max_time;
            m.min_value = block.min_value;
            m.max_value = block.max_value;
        } else {
            m.start_time = m.start_time.min(block.min_time);
            m.end_time = m.end_time.max(block.max_time);
            m.min_value = m.min_value.min(block.min_value);
            m.max_value = m.max_value.max(block.max_value);
        }

        m.total_points += u64::from(block.point_count);
        m.block_count += 1;
    }
}
