//! Spill file access.
//!
//! Operators that exceed their buffer budget write runs and materialized
//! streams to spill files: flat sequences of page frames (see
//! [`crate::codec`]) read back sequentially until end-of-file. Execution
//! is single-threaded, so plain buffered synchronous I/O is all that is
//! needed here.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use grist_common::{GristError, GristResult};

use crate::batch::Batch;
use crate::codec::{decode_batch, encode_batch, FrameHeader, FRAME_HEADER_SIZE};

/// A spill file owned by an operator, deleted at `close`.
#[derive(Debug)]
pub struct SpillFile {
    path: PathBuf,
}

impl SpillFile {
    /// Returns the path of this spill file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the file, swallowing errors.
    ///
    /// Cleanup is best-effort; a file the OS refuses to delete must not
    /// fail the query that already produced its result.
    pub fn delete(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to delete spill file");
        }
    }
}

/// Appends batches to a spill file as encoded frames.
#[derive(Debug)]
pub struct SpillWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    batches: usize,
}

impl SpillWriter {
    /// Creates the file, truncating any previous content at the path.
    pub fn create(path: impl Into<PathBuf>) -> GristResult<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            batches: 0,
        })
    }

    /// Appends one batch as a frame.
    pub fn write_batch(&mut self, batch: &Batch) -> GristResult<()> {
        let frame = encode_batch(batch);
        self.writer.write_all(&frame)?;
        self.batches += 1;
        Ok(())
    }

    /// Flushes and returns a handle to the finished file.
    pub fn finish(mut self) -> GristResult<SpillFile> {
        self.writer.flush()?;
        tracing::debug!(
            path = %self.path.display(),
            batches = self.batches,
            "spill file written"
        );
        Ok(SpillFile { path: self.path })
    }
}

/// Reads batches back from a spill file in write order.
#[derive(Debug)]
pub struct SpillReader {
    reader: BufReader<File>,
    path: PathBuf,
    arity: usize,
}

impl SpillReader {
    /// Opens the file for sequential reading.
    ///
    /// `arity` is the tuple width of the spilled schema, needed to decode
    /// frames.
    pub fn open(path: impl Into<PathBuf>, arity: usize) -> GristResult<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        Ok(Self {
            reader: BufReader::new(file),
            path,
            arity,
        })
    }

    /// Reads the next batch, or `None` at a clean end-of-file.
    ///
    /// End-of-file in the middle of a frame is corruption, not
    /// end-of-stream.
    pub fn next_batch(&mut self) -> GristResult<Option<Batch>> {
        let mut header_bytes = [0u8; FRAME_HEADER_SIZE];
        let mut filled = 0;
        while filled < FRAME_HEADER_SIZE {
            let n = self.reader.read(&mut header_bytes[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < FRAME_HEADER_SIZE {
            return Err(GristError::corruption(
                &self.path,
                format!("torn frame header: {filled} of {FRAME_HEADER_SIZE} bytes"),
            ));
        }

        let header = FrameHeader::from_bytes(&header_bytes);
        let mut payload = vec![0u8; header.payload_len as usize];
        self.reader.read_exact(&mut payload).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                GristError::corruption(&self.path, "frame payload truncated")
            } else {
                GristError::from(e)
            }
        })?;

        decode_batch(&header, &payload, self.arity, &self.path).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::Tuple;
    use crate::value::Value;

    fn batch_of(values: &[i32]) -> Batch {
        let mut batch = Batch::with_capacity(values.len());
        for &v in values {
            batch.push(Tuple::new(vec![Value::int(v)]));
        }
        batch
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run");

        let mut writer = SpillWriter::create(&path).unwrap();
        writer.write_batch(&batch_of(&[1, 2, 3])).unwrap();
        writer.write_batch(&batch_of(&[4])).unwrap();
        let file = writer.finish().unwrap();

        let mut reader = SpillReader::open(file.path(), 1).unwrap();
        let first = reader.next_batch().unwrap().unwrap();
        assert_eq!(first.len(), 3);
        let second = reader.next_batch().unwrap().unwrap();
        assert_eq!(second.len(), 1);
        assert!(reader.next_batch().unwrap().is_none());
        // A drained reader keeps reporting end-of-stream.
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_empty_file_is_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        let file = SpillWriter::create(&path).unwrap().finish().unwrap();

        let mut reader = SpillReader::open(file.path(), 1).unwrap();
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_torn_header_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("torn");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let mut reader = SpillReader::open(&path, 1).unwrap();
        let err = reader.next_batch().unwrap_err();
        assert!(matches!(err, GristError::Corrupted { .. }));
    }

    #[test]
    fn test_truncated_payload_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trunc");

        let mut writer = SpillWriter::create(&path).unwrap();
        writer.write_batch(&batch_of(&[1, 2])).unwrap();
        writer.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let mut reader = SpillReader::open(&path, 1).unwrap();
        let err = reader.next_batch().unwrap_err();
        assert!(matches!(err, GristError::Corrupted { .. }));
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone");
        let file = SpillWriter::create(&path).unwrap().finish().unwrap();
        assert!(path.exists());
        file.delete();
        assert!(!path.exists());
    }
}
