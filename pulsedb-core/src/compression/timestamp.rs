//! Delta + zigzag varint timestamp codec
//!
//! The first timestamp is stored as a fixed-width little-endian i64; every
//! subsequent timestamp is stored as a zigzag varint delta against its
//! predecessor. Non-monotonic input (negative deltas) is fully supported.

use super::varint::{read_zigzag_varint, write_zigzag_varint};
use crate::{PulseError, Result, Timestamp};

/// Compress a sequence of timestamps. Empty input yields empty output.
pub fn compress_timestamps(timestamps: &[Timestamp]) -> Vec<u8> {
    let Some((&first, rest)) = timestamps.split_first() else {
        return Vec::new();
    };

    let mut buf = Vec::with_capacity(8 + rest.len() * 2);
    buf.extend_from_slice(&first.to_le_bytes());

    let mut prev = first;
    for &ts in rest {
        // Wrapping arithmetic keeps extreme spreads (e.g. i64::MIN to
        // i64::MAX) well-defined; decode wraps symmetrically.
        write_zigzag_varint(&mut buf, ts.wrapping_sub(prev));
        prev = ts;
    }

    buf
}

/// Decompress exactly `count` timestamps
pub fn decompress_timestamps(data: &[u8], count: usize) -> Result<Vec<Timestamp>> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut input = data;
    let first_bytes: [u8; 8] = input
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| PulseError::Compression("timestamp stream shorter than first value".into()))?;
    input = &input[8..];

    let mut timestamps = Vec::with_capacity(count);
    let mut prev = i64::from_le_bytes(first_bytes);
    timestamps.push(prev);

    for _ in 1..count {
        let delta = read_zigzag_varint(&mut input)?;
        prev = prev.wrapping_add(delta);
        timestamps.push(prev);
    }

    Ok(timestamps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_empty_roundtrip() {
        let compressed = compress_timestamps(&[]);
        assert!(compressed.is_empty());
        assert!(decompress_timestamps(&compressed, 0).unwrap().is_empty());
    }

    #[test]
    fn test_single_timestamp() {
        let compressed = compress_timestamps(&[1_700_000_000]);
        assert_eq!(compressed.len(), 8);
        assert_eq!(
            decompress_timestamps(&compressed, 1).unwrap(),
            vec![1_700_000_000]
        );
    }

    #[test]
    fn test_regular_intervals_compress_well() {
        let timestamps: Vec<i64> = (0..1000).map(|i| 1_600_000_000 + i * 10).collect();
        let compressed = compress_timestamps(&timestamps);

        // One byte per delta after the fixed first value
        assert_eq!(compressed.len(), 8 + 999);
        assert_eq!(
            decompress_timestamps(&compressed, timestamps.len()).unwrap(),
            timestamps
        );
    }

    #[test]
    fn test_negative_deltas() {
        let timestamps = vec![100, 50, 200, -10, i64::MIN, i64::MAX, 0];
        let compressed = compress_timestamps(&timestamps);
        assert_eq!(
            decompress_timestamps(&compressed, timestamps.len()).unwrap(),
            timestamps
        );
    }

    #[test]
    fn test_random_roundtrip() {
        let mut rng = rand::thread_rng();
        let timestamps: Vec<i64> = (0..500).map(|_| rng.gen()).collect();
        let compressed = compress_timestamps(&timestamps);
        assert_eq!(
            decompress_timestamps(&compressed, timestamps.len()).unwrap(),
            timestamps
        );
    }

    #[test]
    fn test_truncated_stream_errors() {
        let compressed = compress_timestamps(&[1, 2, 3]);
        assert!(decompress_timestamps(&compressed[..compressed.len() - 1], 3).is_err());
        assert!(decompress_timestamps(&[0u8; 4], 1).is_err());
    }
}
