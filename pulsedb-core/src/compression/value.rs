//! XOR-delta float codec
//!
//! Simplified Gorilla-style compression: the first value is stored as its raw
//! IEEE-754 bit pattern, little-endian; every subsequent value is the varint
//! encoding of the full XOR between its bit pattern and the previous one.
//! There is no leading/trailing-zero windowing; similar consecutive values
//! still shrink because their high-order XOR bytes are zero and the varint
//! drops them. Bit patterns round-trip exactly, including NaN and infinities.

use super::varint::{read_varuint, write_varuint};
use crate::{PulseError, Result};

/// Streaming XOR-delta encoder
#[derive(Debug)]
pub struct XorEncoder {
    prev_bits: u64,
    first: bool,
    buf: Vec<u8>,
}

impl XorEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            prev_bits: 0,
            first: true,
            buf: Vec::new(),
        }
    }

    /// Encode one value
    pub fn encode(&mut self, value: f64) {
        let bits = value.to_bits();

        if self.first {
            self.buf.extend_from_slice(&bits.to_le_bytes());
            self.first = false;
        } else {
            write_varuint(&mut self.buf, bits ^ self.prev_bits);
        }

        self.prev_bits = bits;
    }

    /// Finish encoding and return the compressed bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for XorEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Streaming XOR-delta decoder
#[derive(Debug)]
pub struct XorDecoder<'a> {
    input: &'a [u8],
    prev_bits: u64,
    first: bool,
}

impl<'a> XorDecoder<'a> {
    /// Create a decoder over compressed bytes
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            input: data,
            prev_bits: 0,
            first: true,
        }
    }

    /// Decode the next value
    pub fn decode(&mut self) -> Result<f64> {
        if self.first {
            let first_bytes: [u8; 8] = self
                .input
                .get(..8)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| {
                    PulseError::Compression("value stream shorter than first value".into())
                })?;
            self.input = &self.input[8..];
            self.prev_bits = u64::from_le_bytes(first_bytes);
            self.first = false;
        } else {
            let delta = read_varuint(&mut self.input)?;
            self.prev_bits ^= delta;
        }

        Ok(f64::from_bits(self.prev_bits))
    }
}

/// Compress a sequence of values. Empty input yields empty output.
pub fn compress_values(values: &[f64]) -> Vec<u8> {
    let mut encoder = XorEncoder::new();
    for &value in values {
        encoder.encode(value);
    }
    encoder.into_bytes()
}

/// Decompress exactly `count` values
pub fn decompress_values(data: &[u8], count: usize) -> Result<Vec<f64>> {
    let mut values = Vec::with_capacity(count);
    let mut decoder = XorDecoder::new(data);

    for _ in 0..count {
        values.push(decoder.decode()?);
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn assert_bits_equal(decoded: &[f64], original: &[f64]) {
        assert_eq!(decoded.len(), original.len());
        for (d, o) in decoded.iter().zip(original) {
            assert_eq!(d.to_bits(), o.to_bits());
        }
    }

    #[test]
    fn test_empty_roundtrip() {
        assert!(compress_values(&[]).is_empty());
        assert!(decompress_values(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn test_constant_values_compress_to_one_byte_each() {
        let values = vec![42.0; 100];
        let compressed = compress_values(&values);

        // First value raw, then one zero-byte varint per repeat
        assert_eq!(compressed.len(), 8 + 99);
        assert_bits_equal(&decompress_values(&compressed, 100).unwrap(), &values);
    }

    #[test]
    fn test_similar_values_shrink() {
        let values: Vec<f64> = (0..1000).map(|i| 20.0 + (i as f64) * 0.001).collect();
        let compressed = compress_values(&values);
        assert!(compressed.len() < values.len() * 8);
        assert_bits_equal(
            &decompress_values(&compressed, values.len()).unwrap(),
            &values,
        );
    }

    #[test]
    fn test_special_values_roundtrip_bitwise() {
        let values = vec![
            f64::NAN,
            f64::INFINITY,
            f64::NEG_INFINITY,
            0.0,
            -0.0,
            f64::MIN_POSITIVE,
            f64::MAX,
        ];
        let compressed = compress_values(&values);
        assert_bits_equal(
            &decompress_values(&compressed, values.len()).unwrap(),
            &values,
        );
    }

    #[test]
    fn test_random_roundtrip() {
        let mut rng = rand::thread_rng();
        let values: Vec<f64> = (0..500).map(|_| f64::from_bits(rng.gen())).collect();
        let compressed = compress_values(&values);
        assert_bits_equal(
            &decompress_values(&compressed, values.len()).unwrap(),
            &values,
        );
    }

    #[test]
    fn test_truncated_stream_errors() {
        let compressed = compress_values(&[1.0, 2.0]);
        assert!(decompress_values(&compressed[..8], 2).is_err());
        assert!(decompress_values(&[0u8; 3], 1).is_err());
    }
}
