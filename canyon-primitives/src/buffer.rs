//! Seekable byte buffers with explicit ownership.
//!
//! A [`ByteBuffer`] is a contiguous byte region with a cursor (`head`) that reads and writes advance.
//! The region is either owned (a `Vec<u8>` freed on drop) or borrowed from somebody else.
//! Borrowed buffers are views: the borrow checker ties them to the lifetime of the memory they alias,
//!     so a view can never outlive its source, and a view is never a second owner.
//!
//! Owned buffers can be made "stretchy": a write past the end grows the buffer to exactly fit the new end
//!     instead of failing. This is what the PRS decoder uses for its output, since the decoded size is
//!     only known after the terminator is reached.
//!
//! Every access is bounds-checked and reports a [`BufferError`] instead of touching memory it should not.
//!
//! Multi-byte values are never implicitly byte-swapped. [`ByteBuffer::read_pod`] and [`ByteBuffer::write_pod`]
//!     copy exactly `size_of::<T>()` bytes in host order, the `*_le` helpers decode little-endian explicitly.

use std::fmt;

use bytemuck::{NoUninit, Pod};
use snafu::{OptionExt as _, Snafu, ensure};
use tracing::info;

const DUMP_ROW_LEN: usize = 16;
// 16 bytes as four space-separated groups of 8 hex digits
const DUMP_HEX_WIDTH: usize = DUMP_ROW_LEN * 2 + DUMP_ROW_LEN / 4 - 1;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum BufferError {
    #[snafu(display(
        "{op} of {len} bytes at 0x{position:x} is out of bounds of a {size} byte buffer"
    ))]
    OutOfBounds {
        op: &'static str,
        position: usize,
        len: usize,
        size: usize,
    },
    #[snafu(display("cannot write to a read-only buffer view"))]
    ReadOnly,
    #[snafu(display("cannot resize a buffer that is not stretchy"))]
    NotStretchy,
    #[snafu(display("string of {len} bytes does not fit a u16 length prefix"))]
    StringTooLong { len: usize },
}

pub type Result<T, E = BufferError> = std::result::Result<T, E>;

enum Storage<'a> {
    Owned(Vec<u8>),
    Shared(&'a [u8]),
    Exclusive(&'a mut [u8]),
}

impl Storage<'_> {
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Owned(vec) => vec.as_slice(),
            Storage::Shared(slice) => *slice,
            Storage::Exclusive(slice) => &**slice,
        }
    }

    fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            Storage::Owned(vec) => Some(vec.as_mut_slice()),
            Storage::Shared(_) => None,
            Storage::Exclusive(slice) => Some(&mut **slice),
        }
    }
}

/// A byte region with a read/write cursor.
///
/// Intentionally not `Clone`: duplicating the bytes is spelled [`ByteBuffer::copy`],
///     aliasing them is spelled [`ByteBuffer::view`].
pub struct ByteBuffer<'a> {
    storage: Storage<'a>,
    head: usize,
    stretchy: bool,
}

/// A buffer that does not borrow from anything.
pub type OwnedBuffer = ByteBuffer<'static>;

impl ByteBuffer<'static> {
    /// Allocates a zero-filled owned buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self::from_vec(vec![0; len])
    }

    /// Takes ownership of an existing allocation.
    pub fn from_vec(vec: Vec<u8>) -> Self {
        Self {
            storage: Storage::Owned(vec),
            head: 0,
            stretchy: false,
        }
    }

    /// Creates an empty, stretchy buffer, reserving `capacity` bytes up front.
    pub fn stretchy(capacity: usize) -> Self {
        Self {
            storage: Storage::Owned(Vec::with_capacity(capacity)),
            head: 0,
            stretchy: true,
        }
    }
}

impl<'a> ByteBuffer<'a> {
    /// Wraps foreign memory as a read-only view.
    pub fn borrowed(bytes: &'a [u8]) -> Self {
        Self {
            storage: Storage::Shared(bytes),
            head: 0,
            stretchy: false,
        }
    }

    /// Wraps foreign memory as a writable view. Writes land in the borrowed memory, the view never grows.
    pub fn borrowed_mut(bytes: &'a mut [u8]) -> Self {
        Self {
            storage: Storage::Exclusive(bytes),
            head: 0,
            stretchy: false,
        }
    }

    pub fn size(&self) -> usize {
        self.storage.bytes().len()
    }

    pub fn tell(&self) -> usize {
        self.head
    }

    pub fn remaining(&self) -> usize {
        self.size().saturating_sub(self.head)
    }

    pub fn at_end(&self) -> bool {
        self.head >= self.size()
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    pub fn is_stretchy(&self) -> bool {
        self.stretchy
    }

    /// Enables or disables growth on out-of-bounds writes.
    ///
    /// Only owned buffers can actually grow; a stretchy view still fails with [`BufferError::NotStretchy`].
    pub fn set_stretchy(&mut self, enable: bool) {
        self.stretchy = enable;
    }

    /// Moves the cursor to an absolute position. Seeking to `size()` is allowed, seeking past it is not.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        ensure!(
            pos <= self.size(),
            OutOfBoundsSnafu {
                op: "seek",
                position: pos,
                len: 0usize,
                size: self.size(),
            }
        );
        self.head = pos;
        Ok(())
    }

    pub fn rewind(&mut self) {
        self.head = 0;
    }

    pub fn as_slice(&self) -> &[u8] {
        self.storage.bytes()
    }

    pub fn as_mut_slice(&mut self) -> Result<&mut [u8]> {
        self.storage.bytes_mut().context(ReadOnlySnafu)
    }

    pub fn into_vec(self) -> Vec<u8> {
        match self.storage {
            Storage::Owned(vec) => vec,
            Storage::Shared(slice) => slice.to_vec(),
            Storage::Exclusive(slice) => slice.to_vec(),
        }
    }

    fn check_range(&self, op: &'static str, start: usize, len: usize) -> Result<()> {
        let size = self.size();
        ensure!(
            start.checked_add(len).is_some_and(|end| end <= size),
            OutOfBoundsSnafu {
                op,
                position: start,
                len,
                size,
            }
        );
        Ok(())
    }

    /// Copies `dst.len()` bytes from the cursor forward.
    pub fn read(&mut self, dst: &mut [u8]) -> Result<()> {
        self.check_range("read", self.head, dst.len())?;
        let end = self.head + dst.len();
        dst.copy_from_slice(&self.storage.bytes()[self.head..end]);
        self.head = end;
        Ok(())
    }

    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut vec = vec![0; len];
        self.read(&mut vec)?;
        Ok(vec)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0; N];
        self.read(&mut array)?;
        Ok(array)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let [byte] = self.read_array()?;
        Ok(byte)
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Reads `size_of::<T>()` bytes as a `T`, in host byte order.
    pub fn read_pod<T: Pod>(&mut self) -> Result<T> {
        let mut value = T::zeroed();
        self.read(bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    /// Copies `src` to the cursor, growing the buffer first if it is stretchy.
    pub fn write(&mut self, src: &[u8]) -> Result<()> {
        ensure!(!matches!(self.storage, Storage::Shared(_)), ReadOnlySnafu);

        let end = self.head.checked_add(src.len()).context(OutOfBoundsSnafu {
            op: "write",
            position: self.head,
            len: src.len(),
            size: self.size(),
        })?;
        if end > self.size() {
            ensure!(
                self.stretchy,
                OutOfBoundsSnafu {
                    op: "write",
                    position: self.head,
                    len: src.len(),
                    size: self.size(),
                }
            );
            self.resize(end)?;
        }

        let head = self.head;
        self.as_mut_slice()?[head..end].copy_from_slice(src);
        self.head = end;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write(&[value])
    }

    pub fn write_u16_le(&mut self, value: u16) -> Result<()> {
        self.write(&value.to_le_bytes())
    }

    pub fn write_u32_le(&mut self, value: u32) -> Result<()> {
        self.write(&value.to_le_bytes())
    }

    /// Writes the `size_of::<T>()` bytes of `value`, in host byte order.
    pub fn write_pod<T: NoUninit>(&mut self, value: &T) -> Result<()> {
        self.write(bytemuck::bytes_of(value))
    }

    /// Writes the whole content of another buffer at the cursor.
    pub fn write_buffer(&mut self, other: &ByteBuffer) -> Result<()> {
        self.write(other.as_slice())
    }

    /// Grows or shrinks an owned stretchy buffer to exactly `len` bytes.
    ///
    /// New bytes are zeroed, existing bytes are kept, the cursor is kept unless it would end up past the end.
    pub fn resize(&mut self, len: usize) -> Result<()> {
        ensure!(self.stretchy, NotStretchySnafu);
        match &mut self.storage {
            Storage::Owned(vec) => vec.resize(len, 0),
            Storage::Shared(_) | Storage::Exclusive(_) => return NotStretchySnafu.fail(),
        }
        self.head = self.head.min(len);
        Ok(())
    }

    pub fn fill(&mut self, value: u8) -> Result<()> {
        self.as_mut_slice()?.fill(value);
        Ok(())
    }

    /// Non-owning alias of the whole buffer, with its own cursor at 0.
    pub fn view(&self) -> ByteBuffer<'_> {
        ByteBuffer::borrowed(self.as_slice())
    }

    pub fn view_range(&self, start: usize, len: usize) -> Result<ByteBuffer<'_>> {
        self.check_range("view", start, len)?;
        Ok(ByteBuffer::borrowed(&self.as_slice()[start..start + len]))
    }

    /// Writable alias of the whole buffer. Fails for read-only views.
    pub fn view_mut(&mut self) -> Result<ByteBuffer<'_>> {
        Ok(ByteBuffer::borrowed_mut(self.as_mut_slice()?))
    }

    /// Duplicates the bytes into a new owned buffer.
    pub fn copy(&self) -> OwnedBuffer {
        ByteBuffer::from_vec(self.as_slice().to_vec())
    }

    pub fn copy_range(&self, start: usize, len: usize) -> Result<OwnedBuffer> {
        self.check_range("copy", start, len)?;
        Ok(ByteBuffer::from_vec(
            self.as_slice()[start..start + len].to_vec(),
        ))
    }

    fn align_to(&mut self, alignment: usize) -> Result<()> {
        let aligned = self.head.next_multiple_of(alignment);
        if aligned > self.size() {
            ensure!(
                self.stretchy,
                OutOfBoundsSnafu {
                    op: "align",
                    position: self.head,
                    len: aligned - self.head,
                    size: self.size(),
                }
            );
            self.resize(aligned)?;
        }
        self.head = aligned;
        Ok(())
    }

    /// Aligns the cursor to a 2 byte boundary.
    pub fn align16(&mut self) -> Result<()> {
        self.align_to(2)
    }

    /// Aligns the cursor to a 4 byte boundary.
    pub fn align32(&mut self) -> Result<()> {
        self.align_to(4)
    }

    /// Aligns the cursor to an 8 byte boundary.
    pub fn align64(&mut self) -> Result<()> {
        self.align_to(8)
    }

    /// Aligns the cursor to a 16 byte boundary.
    pub fn align128(&mut self) -> Result<()> {
        self.align_to(16)
    }

    /// Reads a string prefixed with its u16 little-endian byte length.
    ///
    /// The string ends at the first NUL, if any. With `align` set, the cursor is realigned to 2 bytes afterwards.
    pub fn read_u16_string(&mut self, align: bool) -> Result<String> {
        let len = self.read_u16_le()? as usize;
        let bytes = self.read_vec(len)?;
        let text_len = bytes.iter().position(|&b| b == 0).unwrap_or(len);
        let value = String::from_utf8_lossy(&bytes[..text_len]).into_owned();
        if align {
            self.align16()?;
        }
        Ok(value)
    }

    pub fn write_u16_string(&mut self, value: &str, align: bool) -> Result<()> {
        let len =
            u16::try_from(value.len()).map_err(|_| StringTooLongSnafu { len: value.len() }.build())?;
        self.write_u16_le(len)?;
        self.write(value.as_bytes())?;
        if align {
            self.align16()?;
        }
        Ok(())
    }

    /// Renders the buffer as a hex dump, 16 bytes per row.
    pub fn dump_lines(&self) -> Vec<String> {
        self.as_slice()
            .chunks(DUMP_ROW_LEN)
            .enumerate()
            .map(|(row, bytes)| {
                let hex = bytes
                    .chunks(4)
                    .map(|group| group.iter().map(|b| format!("{:02x}", b)).collect::<String>())
                    .collect::<Vec<_>>()
                    .join(" ");
                let ascii = bytes
                    .iter()
                    .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
                    .collect::<String>();
                format!(
                    "[0x{:08x}] {:<width$}  {}",
                    row * DUMP_ROW_LEN,
                    hex,
                    ascii,
                    width = DUMP_HEX_WIDTH
                )
            })
            .collect()
    }

    /// Prints [`Self::dump_lines`] to the log.
    pub fn dump(&self) {
        info!("buffer ({} bytes):", self.size());
        for line in self.dump_lines() {
            info!("{}", line);
        }
    }
}

impl AsRef<[u8]> for ByteBuffer<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for ByteBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.storage {
            Storage::Owned(_) => "owned",
            Storage::Shared(_) => "shared",
            Storage::Exclusive(_) => "exclusive",
        };
        f.debug_struct("ByteBuffer")
            .field("kind", &kind)
            .field("size", &self.size())
            .field("head", &self.head)
            .field("stretchy", &self.stretchy)
            .finish()
    }
}
