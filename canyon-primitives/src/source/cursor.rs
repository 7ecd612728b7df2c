use std::io::{self, Read, Seek, SeekFrom};

use super::ByteSource;

/// Adapts a [`ByteSource`] to `io::Read + io::Seek`, for parsers that want a stream.
///
/// Like `io::Cursor`, seeking past the end is allowed and subsequent reads return no data.
#[derive(Debug)]
pub struct SourceCursor<S> {
    source: S,
    position: u64,
}

impl<S: ByteSource> SourceCursor<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            position: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S: ByteSource> Read for SourceCursor<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.source.len().saturating_sub(self.position);
        let len = available.min(buf.len() as u64) as usize;
        if len == 0 {
            return Ok(0);
        }
        self.source
            .read_exact_at(self.position, &mut buf[..len])?;
        self.position += len as u64;
        Ok(len)
    }
}

impl<S: ByteSource> Seek for SourceCursor<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, delta) = match pos {
            SeekFrom::Start(offset) => {
                self.position = offset;
                return Ok(offset);
            }
            SeekFrom::End(delta) => (self.source.len(), delta),
            SeekFrom::Current(delta) => (self.position, delta),
        };
        self.position = base.checked_add_signed(delta).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;
        Ok(self.position)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}

#[cfg(test)]
mod test {
    use std::io::{Read as _, Seek as _, SeekFrom};

    use super::SourceCursor;
    use crate::source::MemorySource;

    #[test]
    fn reads_and_seeks() {
        let source = MemorySource::new(b"0123456789");
        let mut cursor = SourceCursor::new(&source);

        let mut buf = [0; 4];
        cursor.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"0123");

        assert_eq!(cursor.seek(SeekFrom::Current(2)).unwrap(), 6);
        cursor.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"6789");

        assert_eq!(cursor.seek(SeekFrom::End(-3)).unwrap(), 7);
        assert!(cursor.seek(SeekFrom::Current(-8)).is_err());
        assert_eq!(cursor.position(), 7);
    }

    #[test]
    fn reads_past_end_are_short() {
        let source = MemorySource::new(b"abc");
        let mut cursor = SourceCursor::new(&source);
        cursor.seek(SeekFrom::Start(10)).unwrap();

        let mut buf = [0; 4];
        assert_eq!(cursor.read(&mut buf).unwrap(), 0);
        assert_eq!(cursor.read(&mut buf).unwrap(), 0);
        assert_eq!(cursor.position(), 10);

        cursor.seek(SeekFrom::End(0)).unwrap();
        assert_eq!(cursor.read(&mut buf).unwrap(), 0);

        cursor.seek(SeekFrom::Start(1)).unwrap();
        assert_eq!(cursor.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"bc");
        assert!(cursor.read_exact(&mut buf).is_err());
    }
}
