use std::{fs::File, io, path::Path};

use super::ByteSource;

/// An opened file read by offset.
///
/// The length is taken once, when the file is opened. The file is assumed not to change afterwards.
#[derive(Debug)]
pub struct FileSource {
    file: PositionalFile,
    len: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::new(File::open(path)?)
    }

    /// Fails for anything that is not a regular file, directories included.
    pub fn new(file: File) -> io::Result<Self> {
        let metadata = file.metadata()?;
        if metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                "is a directory, not a file",
            ));
        }
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            ));
        }
        Ok(Self {
            file: PositionalFile::new(file),
            len: metadata.len(),
        })
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact_at(offset, buf)
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        #[derive(Debug)]
        struct PositionalFile(File);

        impl PositionalFile {
            fn new(file: File) -> Self {
                Self(file)
            }

            fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
                std::os::unix::fs::FileExt::read_exact_at(&self.0, buf, offset)
            }
        }
    } else if #[cfg(windows)] {
        #[derive(Debug)]
        struct PositionalFile(File);

        impl PositionalFile {
            fn new(file: File) -> Self {
                Self(file)
            }

            // seek_read moves the OS cursor, but nothing else here relies on it
            fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
                use std::os::windows::fs::FileExt as _;

                while !buf.is_empty() {
                    match self.0.seek_read(buf, offset) {
                        Ok(0) => {
                            return Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "file ended before the requested range",
                            ));
                        }
                        Ok(read) => {
                            offset += read as u64;
                            buf = &mut buf[read..];
                        }
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                        Err(err) => return Err(err),
                    }
                }
                Ok(())
            }
        }
    } else {
        #[derive(Debug)]
        struct PositionalFile(parking_lot::Mutex<File>);

        impl PositionalFile {
            fn new(file: File) -> Self {
                Self(parking_lot::Mutex::new(file))
            }

            fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
                use std::io::{Read as _, Seek as _};

                let mut file = self.0.lock();
                file.seek(io::SeekFrom::Start(offset))?;
                file.read_exact(buf)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::ErrorKind;

    use super::FileSource;
    use crate::source::ByteSource as _;

    #[test]
    fn reads_regular_file() {
        let path = std::env::temp_dir().join(format!("canyon-source-{}.bin", std::process::id()));
        std::fs::write(&path, b"0123456789").unwrap();

        let source = FileSource::open(&path).unwrap();
        let mut buf = [0; 3];
        source.read_exact_at(4, &mut buf).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(source.len(), 10);
        assert_eq!(&buf, b"456");
    }

    #[test]
    fn directory_is_rejected() {
        let err = FileSource::open(std::env::temp_dir()).unwrap_err();
        // elsewhere opening a directory already fails with a platform-specific error
        if cfg!(unix) {
            assert_eq!(err.kind(), ErrorKind::IsADirectory);
        }
    }
}
