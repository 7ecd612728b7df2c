//! Positional access to archive bytes.
//!
//! Archives are read by absolute offset instead of through a shared, mutable file cursor.
//! This keeps every read independent of the previous one, so one opened archive can serve entries
//!     through a shared reference.

use std::io;

pub use self::{cursor::SourceCursor, file::FileSource};

mod cursor;
mod file;

pub trait ByteSource {
    /// Total length of the source in bytes.
    fn len(&self) -> u64;

    /// Fills `buf` with the bytes starting at `offset`, or fails without a partial result.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> ByteSource for &T
where
    T: ByteSource + ?Sized,
{
    fn len(&self) -> u64 {
        T::len(*self)
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        T::read_exact_at(*self, offset, buf)
    }
}

/// Serves bytes that are already in memory.
#[derive(Debug, Clone)]
pub struct MemorySource<B> {
    bytes: B,
}

impl<B: AsRef<[u8]>> MemorySource<B> {
    pub fn new(bytes: B) -> Self {
        Self { bytes }
    }

    pub fn into_inner(self) -> B {
        self.bytes
    }
}

impl<B: AsRef<[u8]>> ByteSource for MemorySource<B> {
    fn len(&self) -> u64 {
        self.bytes.as_ref().len() as u64
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let bytes = self.bytes.as_ref();
        let range = usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(buf.len())?))
            .filter(|range| range.end <= bytes.len())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "read of {} bytes at 0x{:x} is past the end of a {} byte source",
                        buf.len(),
                        offset,
                        bytes.len()
                    ),
                )
            })?;
        buf.copy_from_slice(&bytes[range]);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::ErrorKind;

    use super::{ByteSource, MemorySource};

    #[test]
    fn memory_source_reads_in_bounds() {
        let source = MemorySource::new(vec![1u8, 2, 3, 4, 5]);
        assert_eq!(source.len(), 5);

        let mut buf = [0; 3];
        source.read_exact_at(2, &mut buf).unwrap();
        assert_eq!(buf, [3, 4, 5]);

        // through a reference, as the archive reader does
        let by_ref = &source;
        by_ref.read_exact_at(0, &mut buf[..1]).unwrap();
        assert_eq!(buf, [1, 4, 5]);
    }

    #[test]
    fn memory_source_rejects_reads_past_end() {
        let source = MemorySource::new(b"abc");
        let mut buf = [0; 2];
        let err = source.read_exact_at(2, &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
        assert!(source.read_exact_at(u64::MAX, &mut buf).is_err());
        assert!(source.read_exact_at(3, &mut []).is_ok());
    }
}
