//! Block assembly
//!
//! A block is a fixed-capacity, compressed, immutable chunk of points
//! appended once to a series file. The header records true min/max
//! timestamps (not first/last in insertion order), so the read path's range
//! skip is exact even when points inside a block are out of temporal order.

use crate::compression::{compress_points, decompress_points};
use crate::{Point, PulseError, Result, Timestamp};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Hard capacity bound per block; the header's point count is an i16
pub const MAX_BLOCK_POINTS: usize = i16::MAX as usize;

/// Fixed-width on-disk block header, little-endian
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockHeader {
    /// Minimum timestamp across the block's points
    pub min_time: Timestamp,
    /// Maximum timestamp across the block's points
    pub max_time: Timestamp,
    /// Number of points in the block
    pub point_count: u16,
    /// Minimum value across the block's points
    pub min_value: f64,
    /// Maximum value across the block's points
    pub max_value: f64,
    /// Byte length of the compressed timestamp payload
    pub ts_len: u32,
    /// Byte length of the compressed value payload
    pub val_len: u32,
}

impl BlockHeader {
    /// Header size in bytes: i64 + i64 + i16 + f64 + f64 + i32 + i32
    pub const SIZE: usize = 42;

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_i64_le(self.min_time);
        buf.put_i64_le(self.max_time);
        buf.put_i16_le(self.point_count as i16);
        buf.put_f64_le(self.min_value);
        buf.put_f64_le(self.max_value);
        buf.put_i32_le(self.ts_len as i32);
        buf.put_i32_le(self.val_len as i32);
        buf.freeze()
    }

    /// Deserialize from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(PulseError::InvalidFormat("block header too short".into()));
        }

        let mut cursor = std::io::Cursor::new(data);
        let min_time = cursor.get_i64_le();
        let max_time = cursor.get_i64_le();
        let point_count = cursor.get_i16_le();
        let min_value = cursor.get_f64_le();
        let max_value = cursor.get_f64_le();
        let ts_len = cursor.get_i32_le();
        let val_len = cursor.get_i32_le();

        if point_count < 0 || ts_len < 0 || val_len < 0 {
            return Err(PulseError::Corruption(format!(
                "negative block header field: count={} ts_len={} val_len={}",
                point_count, ts_len, val_len
            )));
        }

        Ok(Self {
            min_time,
            max_time,
            point_count: point_count as u16,
            min_value,
            max_value,
            ts_len: ts_len as u32,
            val_len: val_len as u32,
        })
    }
}

/// A compressed, immutable block of points
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    /// Minimum timestamp across the block
    pub min_time: Timestamp,
    /// Maximum timestamp across the block
    pub max_time: Timestamp,
    /// Number of points
    pub point_count: u16,
    /// Minimum value across the block
    pub min_value: f64,
    /// Maximum value across the block
    pub max_value: f64,
    /// Compressed timestamp payload
    pub timestamps: Vec<u8>,
    /// Compressed value payload
    pub values: Vec<u8>,
}

impl DataBlock {
    /// Build a block from a non-empty point sequence
    pub fn from_points(points: &[Point]) -> Result<Self> {
        if points.is_empty() {
            return Err(PulseError::InvalidFormat(
                "cannot build a block from zero points".into(),
            ));
        }
        if points.len() > MAX_BLOCK_POINTS {
            return Err(PulseError::InvalidFormat(format!(
                "block of {} points exceeds capacity {}",
                points.len(),
                MAX_BLOCK_POINTS
            )));
        }

        let mut min_time = points[0].timestamp;
        let mut max_time = points[0].timestamp;
        let mut min_value = points[0].value;
        let mut max_value = points[0].value;

        for p in points {
            if p.timestamp < min_time {
                min_time = p.timestamp;
            }
            if p.timestamp > max_time {
                max_time = p.timestamp;
            }
            if p.value < min_value {
                min_value = p.value;
            }
            if p.value > max_value {
                max_value = p.value;
            }
        }

        let (timestamps, values) = compress_points(points);

        Ok(Self {
            min_time,
            max_time,
            point_count: points.len() as u16,
            min_value,
            max_value,
            timestamps,
            values,
        })
    }

    /// Decompress all points, in their original insertion order
    pub fn decompress(&self) -> Result<Vec<Point>> {
        decompress_points(&self.timestamps, &self.values, self.point_count as usize)
    }

    /// The header describing this block
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            min_time: self.min_time,
            max_time: self.max_time,
            point_count: self.point_count,
            min_value: self.min_value,
            max_value: self.max_value,
            ts_len: self.timestamps.len() as u32,
            val_len: self.values.len() as u32,
        }
    }

    /// Whether the block's time bounds overlap `[start, end]`
    pub fn overlaps(&self, start: Timestamp, end: Timestamp) -> bool {
        self.min_time <= end && self.max_time >= start
    }
}

/// Partition a point sequence into order-preserving chunks of at most
/// `block_size` points. A utility for bulk loads and the writer's
/// capacity-bounded flush.
pub fn split_points(points: &[Point], block_size: usize) -> Vec<&[Point]> {
    if block_size == 0 {
        return vec![points];
    }
    points.chunks(block_size).collect()
}
