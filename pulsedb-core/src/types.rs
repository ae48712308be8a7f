//! Core types for PulseDB

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Timestamp as a signed 64-bit epoch unit
pub type Timestamp = i64;

/// A single data point with timestamp and value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Timestamp
    pub timestamp: Timestamp,
    /// Sample value
    pub value: f64,
}

impl Point {
    /// Create a new point
    pub fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Series identifier combining metric name and tags
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesId {
    /// Metric name (e.g., "temperature", "cpu_usage")
    pub metric: String,
    /// Sorted tags for consistent ordering
    pub tags: BTreeMap<String, String>,
}

impl SeriesId {
    /// Create a new series identifier
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            tags: BTreeMap::new(),
        }
    }

    /// Add a tag to the series identifier
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Create a canonical string representation
    pub fn canonical(&self) -> String {
        let mut s = self.metric.clone();
        for (k, v) in &self.tags {
            s.push(',');
            s.push_str(k);
            s.push('=');
            s.push_str(v);
        }
        s
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Inclusive time range for queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive)
    pub start: Timestamp,
    /// End timestamp (inclusive)
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a new time range
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// The full representable range
    pub fn all() -> Self {
        Self {
            start: i64::MIN,
            end: i64::MAX,
        }
    }

    /// Check if a timestamp is within the range
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Check if two ranges overlap
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }
}

/// Points belonging to one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesData {
    /// Series identifier
    pub series_id: SeriesId,
    /// Data points in insertion order
    pub points: Vec<Point>,
}

/// A write request spanning one or more series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Per-series point batches
    pub series: Vec<SeriesData>,
}

/// A read query: exact metric, tag filters, inclusive time range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Metric name, matched exactly
    pub metric: String,
    /// Tag filters; the value `"*"` matches any value for that key
    pub tags: BTreeMap<String, String>,
    /// Inclusive time range
    pub time_range: TimeRange,
}

/// Result of a read query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Matching series with their filtered points
    pub series: Vec<SeriesData>,
}

/// Persistent metadata for one series, updated on every block flush
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    /// Series identifier
    pub series_id: SeriesId,
    /// Path of the series data file
    pub file_path: PathBuf,
    /// Number of blocks appended to the file
    pub block_count: u32,
    /// Total points across all blocks
    pub total_points: u64,
    /// Earliest timestamp seen
    pub start_time: Timestamp,
    /// Latest timestamp seen
    pub end_time: Timestamp,
    /// Running minimum value
    pub min_value: f64,
    /// Running maximum value
    pub max_value: f64,
    /// Creation time, unix milliseconds
    pub created_at: i64,
}

impl SeriesMetadata {
    /// Create metadata for a brand-new series
    pub fn new(series_id: SeriesId, file_path: PathBuf, created_at: i64) -> Self {
        Self {
            series_id,
            file_path,
            block_count: 0,
            total_points: 0,
            start_time: 0,
            end_time: 0,
            min_value: 0.0,
            max_value: 0.0,
            created_at,
        }
    }
}
