//! WAL replay
//!
//! One-shot recovery scan over every segment in ascending order. Record
//! boundaries come solely from each record's length prefix, so a corrupted
//! length desynchronizes the remainder of its segment; a length that overruns
//! the segment ends that segment's replay. Records that frame correctly but
//! fail to deserialize are skipped. Both cases are logged, not surfaced.

use super::record::WalRecord;
use super::{Wal, WalPosition};
use crate::Result;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read};
use tracing::{info, warn};

impl Wal {
    /// Replay every record, in segment order, from byte 0 of each segment.
    /// Records at positions at or before `from` are scanned for framing but
    /// not handed to `handler`. After replay the previously active segment is
    /// reopened in append mode at its prior size.
    pub fn replay<F>(&self, from: Option<WalPosition>, mut handler: F) -> Result<()>
    where
        F: FnMut(WalPosition, &str, &[u8]) -> Result<()>,
    {
        let mut inner = self.inner.lock();

        let active_segment = inner.segment;
        let active_size = inner.size;
        inner.file = None;

        let mut replayed = 0usize;
        let mut skipped = 0usize;

        for (segment, path) in self.list_segments()? {
            if let Some(checkpoint) = from {
                if segment < checkpoint.segment {
                    continue;
                }
            }

            let segment_size = std::fs::metadata(&path)?.len();
            let mut reader = BufReader::new(File::open(&path)?);
            let mut offset = 0u64;

            loop {
                let mut length_buf = [0u8; 4];
                match read_fully(&mut reader, &mut length_buf) {
                    Ok(0) => break,
                    Ok(n) if n < 4 => {
                        warn!(segment, offset, "truncated record length, ending segment");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => return Err(e.into()),
                }

                let length = u32::from_le_bytes(length_buf) as u64;
                if offset + 4 + length > segment_size {
                    warn!(
                        segment,
                        offset, length, "record length overruns segment, ending segment"
                    );
                    break;
                }

                let mut body = vec![0u8; length as usize];
                if let Err(e) = reader.read_exact(&mut body) {
                    warn!(segment, offset, error = %e, "truncated record body, ending segment");
                    break;
                }

                offset += 4 + length;
                let position = WalPosition { segment, offset };

                let record = match WalRecord::decode(&body) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(segment, offset, error = %e, "skipping malformed record");
                        skipped += 1;
                        continue;
                    }
                };

                if from.map_or(true, |checkpoint| position > checkpoint) {
                    handler(position, &record.record_type, &record.data)?;
                    replayed += 1;
                }
            }
        }

        info!(replayed, skipped, "WAL replay complete");

        // Resume appends into the segment that was active before the scan
        let path = self.segment_path(active_segment);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        inner.file = Some(file);
        inner.segment = active_segment;
        inner.size = active_size;

        Ok(())
    }
}

/// Read until `buf` is full or the stream ends; returns bytes read
fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::super::{Wal, WalConfig, RECORD_TYPE_WRITE};
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir, max_segment_size: u64) -> WalConfig {
        WalConfig {
            dir: dir.path().to_path_buf(),
            max_segment_size,
        }
    }

    fn collect(wal: &Wal, from: Option<WalPosition>) -> Vec<(WalPosition, String, Vec<u8>)> {
        let mut records = Vec::new();
        wal.replay(from, |pos, record_type, data| {
            records.push((pos, record_type.to_string(), data.to_vec()));
            Ok(())
        })
        .unwrap();
        records
    }

    #[test]
    fn test_replay_returns_records_in_order() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(config(&dir, 1 << 20)).unwrap();

        for i in 0..5u8 {
            wal.append(RECORD_TYPE_WRITE, vec![i]).unwrap();
        }

        let records = collect(&wal, None);
        assert_eq!(records.len(), 5);
        for (i, (_, record_type, data)) in records.iter().enumerate() {
            assert_eq!(record_type, RECORD_TYPE_WRITE);
            assert_eq!(data, &vec![i as u8]);
        }
    }

    #[test]
    fn test_replay_spans_segments() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(config(&dir, 200)).unwrap();

        for i in 0..8u8 {
            wal.append(RECORD_TYPE_WRITE, vec![i; 40]).unwrap();
        }
        assert!(wal.current_segment() > 1);

        let records = collect(&wal, None);
        assert_eq!(records.len(), 8);
    }

    #[test]
    fn test_appends_resume_after_replay() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(config(&dir, 1 << 20)).unwrap();

        wal.append(RECORD_TYPE_WRITE, vec![1]).unwrap();
        assert_eq!(collect(&wal, None).len(), 1);

        wal.append(RECORD_TYPE_WRITE, vec![2]).unwrap();
        assert_eq!(collect(&wal, None).len(), 2);
    }

    #[test]
    fn test_replay_from_checkpoint_skips_earlier_records() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(config(&dir, 1 << 20)).unwrap();

        wal.append(RECORD_TYPE_WRITE, vec![1]).unwrap();
        let checkpoint = wal.append(RECORD_TYPE_WRITE, vec![2]).unwrap();
        wal.append(RECORD_TYPE_WRITE, vec![3]).unwrap();

        let records = collect(&wal, Some(checkpoint));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].2, vec![3]);
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(config(&dir, 1 << 20)).unwrap();

        let first = wal.append(RECORD_TYPE_WRITE, vec![1; 8]).unwrap();
        let second = wal.append(RECORD_TYPE_WRITE, vec![2; 8]).unwrap();
        wal.append(RECORD_TYPE_WRITE, vec![3; 8]).unwrap();
        wal.close().unwrap();

        // Corrupt the second record's body, leaving its length prefix intact
        let path = dir.path().join("segment_0001.wal");
        let mut bytes = std::fs::read(&path).unwrap();
        for b in &mut bytes[first.offset as usize + 4..second.offset as usize] {
            *b = 0xFF;
        }
        std::fs::write(&path, bytes).unwrap();

        let wal = Wal::open(config(&dir, 1 << 20)).unwrap();
        let records = collect(&wal, None);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].2, vec![1; 8]);
        assert_eq!(records[1].2, vec![3; 8]);
    }

    #[test]
    fn test_truncated_tail_ends_segment_quietly() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(config(&dir, 1 << 20)).unwrap();

        wal.append(RECORD_TYPE_WRITE, vec![1; 8]).unwrap();
        let end = wal.append(RECORD_TYPE_WRITE, vec![2; 8]).unwrap();
        wal.close().unwrap();

        // Chop the last record in half, as a crash mid-append would
        let path = dir.path().join("segment_0001.wal");
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..end.offset as usize - 5]).unwrap();

        let wal = Wal::open(config(&dir, 1 << 20)).unwrap();
        let records = collect(&wal, None);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].2, vec![1; 8]);
    }
}
