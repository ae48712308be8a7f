//! Compression codecs for time-series data
//!
//! Two independent byte streams per block: timestamps as delta + zigzag
//! varints, values as XOR deltas of their IEEE-754 bit patterns. Both are
//! pure, stateless transforms over point sequences.

mod timestamp;
mod value;
mod varint;

pub use timestamp::{compress_timestamps, decompress_timestamps};
pub use value::{compress_values, decompress_values, XorDecoder, XorEncoder};

use crate::{Point, Result};

/// Compress a point sequence into (timestamp bytes, value bytes)
pub fn compress_points(points: &[Point]) -> (Vec<u8>, Vec<u8>) {
    let timestamps: Vec<i64> = points.iter().map(|p| p.timestamp).collect();
    let values: Vec<f64> = points.iter().map(|p| p.value).collect();

    (compress_timestamps(&timestamps), compress_values(&values))
}

/// Decompress `count` points from the two payload streams
pub fn decompress_points(
    timestamp_data: &[u8],
    value_data: &[u8],
    count: usize,
) -> Result<Vec<Point>> {
    let timestamps = decompress_timestamps(timestamp_data, count)?;
    let values = decompress_values(value_data, count)?;

    Ok(timestamps
        .into_iter()
        .zip(values)
        .map(|(timestamp, value)| Point { timestamp, value })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_roundtrip() {
        let points: Vec<Point> = (0..100)
            .map(|i| Point::new(1_600_000_000 + i * 15, 20.0 + i as f64 * 0.5))
            .collect();

        let (ts_data, val_data) = compress_points(&points);
        let decoded = decompress_points(&ts_data, &val_data, points.len()).unwrap();
        assert_eq!(decoded, points);
    }

    #[test]
    fn test_empty_points() {
        let (ts_data, val_data) = compress_points(&[]);
        assert!(ts_data.is_empty());
        assert!(val_data.is_empty());
        assert!(decompress_points(&ts_data, &val_data, 0).unwrap().is_empty());
    }
}
