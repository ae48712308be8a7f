//! Per-series append-only block files
//!
//! Layout: `<data_dir>/metrics/<metric>/series_<sorted "key_value" pairs
//! joined by "_">.tsdb`. Each file is a sequence of header + payload blocks;
//! reads scan sequentially and filter against the query range.

use super::block::{BlockHeader, DataBlock};
use crate::{Point, PulseError, Result, Timestamp};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Characters replaced with `_` in metric and tag path components
const UNSAFE_PATH_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Manages series data files under one data directory
#[derive(Debug, Clone)]
pub struct FileManager {
    data_dir: PathBuf,
}

impl FileManager {
    /// Create a file manager rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Path of the series file for a metric + tag set
    pub fn series_file_path(&self, metric: &str, tags: &BTreeMap<String, String>) -> PathBuf {
        let metric_dir = self
            .data_dir
            .join("metrics")
            .join(sanitize_component(metric));
        metric_dir.join(series_file_name(tags))
    }

    /// Open (creating if needed) the series file in append mode.
    /// Idempotent: opening an existing file positions at its end.
    pub fn open_series_file(
        &self,
        metric: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(PathBuf, File)> {
        let path = self.series_file_path(metric, tags);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok((path, file))
    }

    /// Append one block: fixed header, timestamp payload, value payload,
    /// then a forced flush to stable storage.
    pub fn write_block(&self, file: &mut File, block: &DataBlock) -> Result<()> {
        file.write_all(&block.header().to_bytes())?;
        file.write_all(&block.timestamps)?;
        file.write_all(&block.values)?;
        file.sync_all()?;
        Ok(())
    }

    /// Read the next block from a sequential reader.
    /// Returns `Ok(None)` on a clean end of stream; a partial header or
    /// payload is a corruption error.
    pub fn read_block(&self, reader: &mut impl Read) -> Result<Option<DataBlock>> {
        let mut header_buf = [0u8; BlockHeader::SIZE];
        if !read_exact_or_eof(reader, &mut header_buf)? {
            return Ok(None);
        }

        let header = BlockHeader::from_bytes(&header_buf)?;

        let mut timestamps = vec![0u8; header.ts_len as usize];
        reader.read_exact(&mut timestamps).map_err(|e| {
            PulseError::Corruption(format!("truncated timestamp payload: {}", e))
        })?;

        let mut values = vec![0u8; header.val_len as usize];
        reader
            .read_exact(&mut values)
            .map_err(|e| PulseError::Corruption(format!("truncated value payload: {}", e)))?;

        Ok(Some(DataBlock {
            min_time: header.min_time,
            max_time: header.max_time,
            point_count: header.point_count,
            min_value: header.min_value,
            max_value: header.max_value,
            timestamps,
            values,
        }))
    }

    /// Scan a series file and return all points within `[start, end]`.
    /// Blocks whose time bounds lie entirely outside the range are skipped
    /// without decompression; the bounds are true extrema, so the skip is
    /// exact.
    pub fn read_points(
        &self,
        path: &Path,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Point>> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut result = Vec::new();
        let mut blocks_read = 0usize;
        let mut blocks_skipped = 0usize;

        while let Some(block) = self.read_block(&mut reader)? {
            blocks_read += 1;

            if !block.overlaps(start, end) {
                blocks_skipped += 1;
                continue;
            }

            for point in block.decompress()? {
                if point.timestamp >= start && point.timestamp <= end {
                    result.push(point);
                }
            }
        }

        debug!(
            path = %path.display(),
            blocks_read,
            blocks_skipped,
            points = result.len(),
            "scanned series file"
        );

        Ok(result)
    }
}

/// Fill `buf` completely, or report a clean EOF if the stream ends before
/// the first byte. Ending mid-buffer is corruption.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(PulseError::Corruption(format!(
                    "truncated block header: {} of {} bytes",
                    filled,
                    buf.len()
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

fn sanitize_component(s: &str) -> String {
    s.replace(UNSAFE_PATH_CHARS, "_")
}

fn series_file_name(tags: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = tags
        .iter()
        .map(|(k, v)| format!("{}_{}", k, v))
        .collect();

    sanitize_component(&format!("series_{}.tsdb", pairs.join("_")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_series_file_path() {
        let fm = FileManager::new("/data");
        let path = fm.series_file_path("cpu", &tags(&[("region", "eu"), ("host", "a")]));
        assert_eq!(
            path,
            PathBuf::from("/data/metrics/cpu/series_host_a_region_eu.tsdb")
        );
    }

    #[test]
    fn test_unsafe_characters_are_replaced() {
        let fm = FileManager::new("/data");
        let path = fm.series_file_path("disk/io", &tags(&[("mount", "C:\\")]));
        assert_eq!(
            path,
            PathBuf::from("/data/metrics/disk_io/series_mount_C__.tsdb")
        );
    }

    #[test]
    fn test_write_read_block_roundtrip() {
        let dir = TempDir::new().unwrap();
        let fm = FileManager::new(dir.path());

        let points: Vec<Point> = (0..50).map(|i| Point::new(i * 100, i as f64)).collect();
        let block = DataBlock::from_points(&points).unwrap();

        let (path, mut file) = fm.open_series_file("temp", &tags(&[("id", "1")])).unwrap();
        fm.write_block(&mut file, &block).unwrap();

        let mut reader = BufReader::new(File::open(&path).unwrap());
        let restored = fm.read_block(&mut reader).unwrap().unwrap();
        assert_eq!(restored, block);
        assert!(fm.read_block(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_open_is_idempotent_and_appends() {
        let dir = TempDir::new().unwrap();
        let fm = FileManager::new(dir.path());
        let t = tags(&[("id", "1")]);

        let block_a = DataBlock::from_points(&[Point::new(1, 1.0)]).unwrap();
        let block_b = DataBlock::from_points(&[Point::new(2, 2.0)]).unwrap();

        {
            let (_, mut file) = fm.open_series_file("m", &t).unwrap();
            fm.write_block(&mut file, &block_a).unwrap();
        }
        let (path, mut file) = fm.open_series_file("m", &t).unwrap();
        fm.write_block(&mut file, &block_b).unwrap();

        let points = fm.read_points(&path, i64::MIN, i64::MAX).unwrap();
        assert_eq!(points, vec![Point::new(1, 1.0), Point::new(2, 2.0)]);
    }

    #[test]
    fn test_read_points_filters_inclusive_range() {
        let dir = TempDir::new().unwrap();
        let fm = FileManager::new(dir.path());
        let t = tags(&[("host", "a")]);

        let points: Vec<Point> = (0..10).map(|i| Point::new(i * 10, i as f64)).collect();
        let block = DataBlock::from_points(&points).unwrap();

        let (path, mut file) = fm.open_series_file("cpu", &t).unwrap();
        fm.write_block(&mut file, &block).unwrap();

        let result = fm.read_points(&path, 30, 50).unwrap();
        assert_eq!(
            result,
            vec![Point::new(30, 3.0), Point::new(40, 4.0), Point::new(50, 5.0)]
        );
    }

    #[test]
    fn test_out_of_range_blocks_are_skipped_exactly() {
        let dir = TempDir::new().unwrap();
        let fm = FileManager::new(dir.path());
        let t = tags(&[]);

        // Out-of-order block whose insertion-order endpoints (500, 300)
        // would mask the contained timestamp 100 under a first/last bound
        let shuffled = vec![Point::new(500, 1.0), Point::new(100, 2.0), Point::new(300, 3.0)];
        let far = vec![Point::new(10_000, 4.0)];

        let (path, mut file) = fm.open_series_file("m", &t).unwrap();
        fm.write_block(&mut file, &DataBlock::from_points(&shuffled).unwrap())
            .unwrap();
        fm.write_block(&mut file, &DataBlock::from_points(&far).unwrap())
            .unwrap();

        let result = fm.read_points(&path, 90, 110).unwrap();
        assert_eq!(result, vec![Point::new(100, 2.0)]);
    }

    #[test]
    fn test_truncated_file_is_corruption() {
        let dir = TempDir::new().unwrap();
        let fm = FileManager::new(dir.path());
        let t = tags(&[]);

        let block = DataBlock::from_points(&[Point::new(1, 1.0), Point::new(2, 2.0)]).unwrap();
        let (path, mut file) = fm.open_series_file("m", &t).unwrap();
        fm.write_block(&mut file, &block).unwrap();

        let len = fs::metadata(&path).unwrap().len();
        let f = OpenOptions::new().write(true).open(&path).unwrap();
        f.set_len(len - 3).unwrap();

        let err = fm.read_points(&path, i64::MIN, i64::MAX).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_missing_series_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let fm = FileManager::new(dir.path());
        let path = fm.series_file_path("ghost", &tags(&[]));
        assert!(matches!(
            fm.read_points(&path, 0, 100),
            Err(PulseError::Io(_))
        ));
    }
}
