//! Spill-to-disk byte buffer shared between the transfer worker and the
//! client stream
//!
//! The spool is the hand-off medium of a download: the worker appends chunks
//! at the tail while the client stream reads at its own cursor. Content is
//! held in memory up to a threshold and rolls over to an anonymous temp file
//! beyond it, so a multi-gigabyte download never pins its payload in RAM.
//!
//! The buffer itself is not synchronized. Both roles access it through the
//! per-download lock owned by [`TransferShared`](crate::app::TransferShared),
//! which is what makes the published byte count trustworthy: a reader that
//! observed a count of `N` can always read `N` bytes back.

use std::io::{Read, Seek, SeekFrom, Write};

use tempfile::SpooledTempFile;

use crate::constants::transfer;

/// Dual-role byte buffer: appended to by one writer, read by one reader.
///
/// Writes always go to the tail; reads address an absolute offset. The
/// bytes-written count is published only after the corresponding chunk has
/// been flushed, and it never decreases.
pub struct SpoolBuffer {
    file: SpooledTempFile,
    bytes_written: u64,
}

impl std::fmt::Debug for SpoolBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpoolBuffer")
            .field("bytes_written", &self.bytes_written)
            .field("rolled", &self.file.is_rolled())
            .finish()
    }
}

impl SpoolBuffer {
    /// Create a spool that keeps up to `memory_limit` bytes in memory before
    /// rolling over to a temp file on disk.
    pub fn new(memory_limit: usize) -> Self {
        Self {
            file: SpooledTempFile::new(memory_limit),
            bytes_written: 0,
        }
    }

    /// Create a spool with the default memory threshold.
    pub fn with_default_limit() -> Self {
        Self::new(transfer::SPOOL_MEMORY_LIMIT)
    }

    /// Append a chunk at the tail, flush it, and return the new total.
    ///
    /// The returned count covers only fully flushed bytes, so it is safe to
    /// publish to readers the moment this returns.
    pub fn append(&mut self, chunk: &[u8]) -> std::io::Result<u64> {
        self.file.seek(SeekFrom::Start(self.bytes_written))?;
        self.file.write_all(chunk)?;
        self.file.flush()?;
        self.bytes_written += chunk.len() as u64;
        Ok(self.bytes_written)
    }

    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns `Ok(0)` when `offset` is at or past the flushed tail. Never
    /// reads past the flushed tail even if the OS would let it.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        if offset >= self.bytes_written || buf.is_empty() {
            return Ok(0);
        }

        let available = self.bytes_written - offset;
        let want = available.min(buf.len() as u64) as usize;

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read(&mut buf[..want])
    }

    /// Total bytes appended and flushed so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Whether the spool has rolled over from memory to a disk file.
    pub fn is_rolled(&self) -> bool {
        self.file.is_rolled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test basic append/read round trip through the spool
    ///
    /// Verifies that appended chunks are immediately readable and that the
    /// published count advances by exactly the chunk length.
    #[test]
    fn test_append_then_read() {
        let mut spool = SpoolBuffer::new(1024);

        assert_eq!(spool.bytes_written(), 0);
        assert_eq!(spool.append(b"hello ").unwrap(), 6);
        assert_eq!(spool.append(b"world").unwrap(), 11);

        let mut buf = [0u8; 32];
        let n = spool.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello world");
    }

    /// Test that reads never observe bytes past the flushed tail
    ///
    /// A reader addressing the tail or beyond must see a clean zero-length
    /// read rather than stale or partial data.
    #[test]
    fn test_read_at_tail_returns_zero() {
        let mut spool = SpoolBuffer::new(1024);
        spool.append(b"abc").unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(spool.read_at(3, &mut buf).unwrap(), 0);
        assert_eq!(spool.read_at(100, &mut buf).unwrap(), 0);
    }

    /// Test reads from an interior offset with a short destination buffer
    #[test]
    fn test_partial_read_at_offset() {
        let mut spool = SpoolBuffer::new(1024);
        spool.append(b"0123456789").unwrap();

        let mut buf = [0u8; 4];
        let n = spool.read_at(2, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"2345");
    }

    /// Test the bytes-written counter is monotonic across interleaved
    /// reads and writes
    #[test]
    fn test_counter_monotonic_under_interleaving() {
        let mut spool = SpoolBuffer::new(64);
        let mut last = 0;

        for i in 0..20 {
            let chunk = vec![i as u8; 33];
            let count = spool.append(&chunk).unwrap();
            assert!(count > last);
            last = count;

            // Interleave a read to disturb the file cursor
            let mut buf = [0u8; 16];
            spool.read_at(count / 2, &mut buf).unwrap();
        }
        assert_eq!(spool.bytes_written(), 20 * 33);
    }

    /// Test spillover to disk once the memory threshold is exceeded
    ///
    /// Content must remain intact across the rollover boundary.
    #[test]
    fn test_spill_to_disk_preserves_content() {
        let mut spool = SpoolBuffer::new(16);
        assert!(!spool.is_rolled());

        spool.append(b"0123456789").unwrap();
        spool.append(b"abcdefghij").unwrap();
        assert!(spool.is_rolled());

        let mut buf = [0u8; 20];
        let n = spool.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"0123456789abcdefghij");
    }
}
