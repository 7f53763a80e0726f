//! Streaming replay of one file.

use crate::error::{CoreError, CoreResult};
use crate::log::record::{RecordHeader, CRC_SIZE, HEADER_SIZE};
use snaplog_codec::{decode_op, Op};
use snaplog_storage::{FileBackend, StorageBackend};
use std::path::{Path, PathBuf};

/// Bytes fetched from the backend per refill.
const READ_CHUNK: usize = 64 * 1024;

/// Sequential reader over the records of one log or snapshot file.
///
/// Memory use is bounded by the chunk size and the largest record; the
/// file is never loaded whole.
///
/// A crash can leave the last record half written. When fewer bytes remain
/// than a header or the declared record, or when everything left is zero
/// bytes, the reader stops cleanly and [`LogReader::truncated_tail`]
/// reports it. A complete record with a bad header, a checksum mismatch or
/// an undecodable payload is an error.
///
/// ```ignore
/// let mut reader = LogReader::open(path)?;
/// while let Some(op) = reader.read_next()? {
///     apply(op);
/// }
/// ```
pub struct LogReader {
    path: PathBuf,
    backend: Box<dyn StorageBackend>,
    size: u64,
    /// File offset of the next unread record.
    offset: u64,
    buffer: Vec<u8>,
    /// File offset of `buffer[0]`.
    buffer_start: u64,
    truncated_tail: bool,
    finished: bool,
}

impl LogReader {
    /// Opens `path` read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let backend = FileBackend::open_read_only(path)?;
        Self::from_backend(path.to_path_buf(), Box::new(backend))
    }

    /// Reads from an already open backend. `path` is only used in errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be determined.
    pub fn from_backend(path: PathBuf, backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        let size = backend.size()?;
        Ok(Self {
            path,
            backend,
            size,
            offset: 0,
            buffer: Vec::new(),
            buffer_start: 0,
            truncated_tail: false,
            finished: false,
        })
    }

    /// Returns the next operation, or `None` at the end of the file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptRecord`] or [`CoreError::ChecksumMismatch`]
    /// for a damaged complete record, and I/O errors from the backend. The
    /// reader yields nothing after an error.
    pub fn read_next(&mut self) -> CoreResult<Option<Op>> {
        if self.finished {
            return Ok(None);
        }
        match self.next_record() {
            Ok(Some(op)) => Ok(Some(op)),
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    fn next_record(&mut self) -> CoreResult<Option<Op>> {
        let start = self.offset;
        let remaining = self.size - start;
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            self.mark_torn(start);
            return Ok(None);
        }

        let parsed = RecordHeader::parse(self.fill(start, HEADER_SIZE)?);
        let header = match parsed {
            Ok(header) => header,
            Err(message) => {
                if self.rest_is_zero(start)? {
                    self.mark_torn(start);
                    return Ok(None);
                }
                return Err(CoreError::corrupt_record(&self.path, start, message));
            }
        };

        let record_len = header.record_len();
        if remaining < record_len as u64 {
            self.mark_torn(start);
            return Ok(None);
        }

        let record = self.fill(start, record_len)?;
        let body_len = record_len - CRC_SIZE;
        let computed = crc32fast::hash(&record[..body_len]);
        let stored = u32::from_le_bytes([
            record[body_len],
            record[body_len + 1],
            record[body_len + 2],
            record[body_len + 3],
        ]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                file: self.path.clone(),
                offset: start,
                expected: stored,
                actual: computed,
            });
        }

        let op = decode_op(&record[HEADER_SIZE..body_len])
            .map_err(|e| CoreError::corrupt_record(&self.path, start, e.to_string()))?;

        self.offset = start + record_len as u64;
        Ok(Some(op))
    }

    /// Returns `len` bytes starting at file offset `start`, refilling the
    /// buffer when needed. The caller guarantees the bytes exist.
    fn fill(&mut self, start: u64, len: usize) -> CoreResult<&[u8]> {
        let buffered_end = self.buffer_start + self.buffer.len() as u64;
        if start < self.buffer_start || start + len as u64 > buffered_end {
            let want = len.max(READ_CHUNK) as u64;
            let available = self.size - start;
            let read_len = want.min(available) as usize;
            self.buffer = self.backend.read_at(start, read_len)?;
            self.buffer_start = start;
        }
        let from = (start - self.buffer_start) as usize;
        Ok(&self.buffer[from..from + len])
    }

    fn rest_is_zero(&self, start: u64) -> CoreResult<bool> {
        let mut offset = start;
        while offset < self.size {
            let len = (self.size - offset).min(READ_CHUNK as u64) as usize;
            let chunk = self.backend.read_at(offset, len)?;
            if chunk.iter().any(|&b| b != 0) {
                return Ok(false);
            }
            offset += len as u64;
        }
        Ok(true)
    }

    fn mark_torn(&mut self, start: u64) {
        tracing::warn!(
            file = %self.path.display(),
            offset = start,
            bytes = self.size - start,
            "ignoring incomplete record at end of file"
        );
        self.truncated_tail = true;
    }

    /// True once the reader stopped at an incomplete tail.
    #[must_use]
    pub fn truncated_tail(&self) -> bool {
        self.truncated_tail
    }

    /// File offset of the next unread record; after a clean end this is
    /// the length of the valid prefix.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Path being read.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the file handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to close.
    pub fn close(mut self) -> CoreResult<()> {
        self.backend.close()?;
        Ok(())
    }
}

impl Iterator for LogReader {
    type Item = CoreResult<Op>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

impl std::fmt::Debug for LogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::record::encode_record;
    use snaplog_storage::InMemoryBackend;

    fn reader_over(data: Vec<u8>) -> LogReader {
        LogReader::from_backend(
            PathBuf::from("1.log"),
            Box::new(InMemoryBackend::with_data(data)),
        )
        .unwrap()
    }

    fn encode_all(ops: &[Op]) -> Vec<u8> {
        ops.iter()
            .flat_map(|op| encode_record(op).unwrap())
            .collect()
    }

    fn sample_ops() -> Vec<Op> {
        vec![
            Op::put("a", "1").with_timestamp(1),
            Op::put_sub("t", "x", "2").with_timestamp(2),
            Op::delete("a").with_timestamp(3),
        ]
    }

    #[test]
    fn empty_file_has_no_records() {
        let mut reader = reader_over(Vec::new());
        assert!(reader.read_next().unwrap().is_none());
        assert!(!reader.truncated_tail());
    }

    #[test]
    fn reads_records_in_order() {
        let ops = sample_ops();
        let reader = reader_over(encode_all(&ops));
        let read: Vec<Op> = reader.map(Result::unwrap).collect();
        assert_eq!(read, ops);
    }

    #[test]
    fn torn_record_is_end_of_file() {
        let ops = sample_ops();
        let mut data = encode_all(&ops);
        let full = data.len();
        data.truncate(full - 3);

        let mut reader = reader_over(data);
        let read: Vec<Op> = reader.by_ref().map(Result::unwrap).collect();
        assert_eq!(read, ops[..2]);
        assert!(reader.truncated_tail());
    }

    #[test]
    fn short_header_is_end_of_file() {
        let mut data = encode_all(&sample_ops()[..1]);
        data.extend_from_slice(b"SLO");
        let mut reader = reader_over(data);
        assert!(reader.read_next().unwrap().is_some());
        assert!(reader.read_next().unwrap().is_none());
        assert!(reader.truncated_tail());
    }

    #[test]
    fn zero_filled_tail_is_end_of_file() {
        let mut data = encode_all(&sample_ops());
        let valid = data.len() as u64;
        data.extend(std::iter::repeat(0u8).take(4096));

        let mut reader = reader_over(data);
        assert_eq!(reader.by_ref().count(), 3);
        assert!(reader.truncated_tail());
        assert_eq!(reader.offset(), valid);
    }

    #[test]
    fn flipped_payload_bit_is_checksum_error() {
        let mut data = encode_all(&sample_ops());
        data[HEADER_SIZE + 2] ^= 0x40;
        let mut reader = reader_over(data);
        let err = reader.read_next().unwrap_err();
        assert!(matches!(err, CoreError::ChecksumMismatch { offset: 0, .. }));
        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn garbage_between_records_is_corruption() {
        let mut data = encode_all(&sample_ops()[..1]);
        let second = data.len() as u64;
        data.extend_from_slice(b"definitely not a record header");
        data.extend(encode_all(&sample_ops()[1..]));

        let mut reader = reader_over(data);
        assert!(reader.read_next().unwrap().is_some());
        match reader.read_next() {
            Err(CoreError::CorruptRecord { offset, .. }) => assert_eq!(offset, second),
            other => panic!("expected corrupt record, got {other:?}"),
        }
    }

    #[test]
    fn valid_frame_with_bad_payload_is_corruption() {
        let payload = b"\xff\xff";
        let mut data = Vec::new();
        data.extend_from_slice(&crate::log::RECORD_MAGIC);
        data.extend_from_slice(&crate::log::RECORD_VERSION.to_le_bytes());
        data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        data.extend_from_slice(payload);
        let crc = crc32fast::hash(&data);
        data.extend_from_slice(&crc.to_le_bytes());

        let mut reader = reader_over(data);
        assert!(reader.read_next().unwrap_err().is_corruption());
    }

    #[test]
    fn records_larger_than_chunk() {
        let big = vec![7u8; READ_CHUNK * 2];
        let ops = vec![Op::put("small", "1"), Op::put("big", big), Op::delete("small")];
        let reader = reader_over(encode_all(&ops));
        let read: Vec<Op> = reader.map(Result::unwrap).collect();
        assert_eq!(read, ops);
    }
}
