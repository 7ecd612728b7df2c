//! Support for ONE archives, the containers Sonic Heroes bundles level assets in
//!
//! ```text
//! offset  type  meaning
//! 0x00    u32   unused
//! 0x04    u32   end of the file table, minus the 12 bytes of this prefix
//! 0x08    u32   magic, selects the variant
//! 0x0c    u32   reserved
//! 0x10    u32   length of the name table in bytes
//! 0x14    u32   reserved
//! 0x18          name table: 64-byte records, NUL-terminated ASCII
//!               file table: { u32 name index, u32 size, u32 unused }, each followed by `size` bytes of PRS data
//! ```
//!
//! All fields are little-endian. The file table has no padding between records and no count:
//!     it simply runs until the end given in the header.
//!
//! Only the Heroes variants are read. Shadow the Hedgehog archives are recognized by their magic, but rejected.
//!
//! The index is parsed once when the archive is opened. Entry data is decoded lazily, on every read:
//!     nothing is cached, each read returns a fresh buffer owned by the caller.

use std::{
    fmt,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use binrw::{BinRead, BinResult};
use canyon_primitives::{
    buffer::{ByteBuffer, OwnedBuffer},
    source::{ByteSource, FileSource, SourceCursor},
};
use smartstring::alias::CompactString;
use snafu::{OptionExt as _, ResultExt as _, Snafu, ensure};
use tracing::{debug, instrument};

use crate::{
    diagnostics::Diagnostics,
    format::prs::{self, PrsError},
};

// the size field in the header does not count the first 12 bytes
const HEADER_PREFIX_LEN: u64 = 0xc;
const NAME_RECORD_LEN: usize = 64;
const FILE_RECORD_LEN: u64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveVariant {
    Heroes,
    HeroesE3,
    HeroesPreE3,
    Shadow050,
    Shadow060,
    Unknown,
}

impl ArchiveVariant {
    pub const HEROES_MAGIC: u32 = 0x1400ffff;
    pub const HEROES_E3_MAGIC: u32 = 0x1005ffff;
    pub const HEROES_PRE_E3_MAGIC: u32 = 0x1003ffff;
    pub const SHADOW_050_MAGIC: u32 = 0x1c020020;
    pub const SHADOW_060_MAGIC: u32 = 0x1c020037;

    pub fn from_magic(magic: u32) -> Self {
        match magic {
            Self::HEROES_MAGIC => Self::Heroes,
            Self::HEROES_E3_MAGIC => Self::HeroesE3,
            Self::HEROES_PRE_E3_MAGIC => Self::HeroesPreE3,
            Self::SHADOW_050_MAGIC => Self::Shadow050,
            Self::SHADOW_060_MAGIC => Self::Shadow060,
            _ => Self::Unknown,
        }
    }

    pub fn magic(self) -> Option<u32> {
        match self {
            Self::Heroes => Some(Self::HEROES_MAGIC),
            Self::HeroesE3 => Some(Self::HEROES_E3_MAGIC),
            Self::HeroesPreE3 => Some(Self::HEROES_PRE_E3_MAGIC),
            Self::Shadow050 => Some(Self::SHADOW_050_MAGIC),
            Self::Shadow060 => Some(Self::SHADOW_060_MAGIC),
            Self::Unknown => None,
        }
    }

    /// Whether the name and file tables of this variant can be read.
    pub fn is_supported(self) -> bool {
        matches!(self, Self::Heroes | Self::HeroesE3 | Self::HeroesPreE3)
    }
}

impl fmt::Display for ArchiveVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Heroes => "Sonic Heroes",
            Self::HeroesE3 => "Sonic Heroes (E3)",
            Self::HeroesPreE3 => "Sonic Heroes (pre-E3)",
            Self::Shadow050 => "Shadow the Hedgehog (0.50)",
            Self::Shadow060 => "Shadow the Hedgehog (0.60)",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(BinRead, Debug)]
#[br(little)]
struct RawHeader {
    _unused: u32,
    table_end: u32,
    magic: u32,
}

#[derive(BinRead, Debug)]
#[br(little)]
struct RawNameTableHeader {
    _reserved0: u32,
    names_len: u32,
    _reserved1: u32,
}

#[derive(BinRead, Debug)]
#[br(little)]
struct RawFileRecord {
    name_index: u32,
    size: u32,
    _unused: u32,
}

/// A named, PRS-compressed entry of the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: CompactString,
    /// Absolute offset of the compressed data
    pub offset: u64,
    /// Compressed length in bytes
    pub length: u32,
}

#[derive(Debug, Snafu)]
pub enum OneError {
    #[snafu(display("malformed archive: could not read the {what}"))]
    Malformed {
        what: &'static str,
        source: binrw::Error,
    },
    #[snafu(display(
        "file record at 0x{position:x} refers to name #{name_index}, but the name table has {names} names"
    ))]
    NameIndexOutOfRange {
        position: u64,
        name_index: u32,
        names: usize,
    },
    #[snafu(display(
        "entry {name:?} ({length} bytes at 0x{offset:x}) extends past the end of the {archive_len} byte archive"
    ))]
    EntryOutOfBounds {
        name: CompactString,
        offset: u64,
        length: u32,
        archive_len: u64,
    },
    #[snafu(display("entry index {index} is out of range, the archive has {count} entries"))]
    IndexOutOfRange { index: usize, count: usize },
    #[snafu(display("no entry named {name:?} in the archive"))]
    FileNotFound { name: String },
    #[snafu(display("reading {length} bytes of entry #{index} at 0x{offset:x}"))]
    Io {
        index: usize,
        offset: u64,
        length: u32,
        source: std::io::Error,
    },
    #[snafu(display("decoding entry #{index} ({name})"))]
    Decode {
        index: usize,
        name: CompactString,
        source: PrsError,
    },
}

fn parse_name(record: &[u8]) -> CompactString {
    // bytes after the terminator are garbage
    let len = record.iter().position(|&b| b == 0).unwrap_or(record.len());
    CompactString::from(String::from_utf8_lossy(&record[..len]).as_ref())
}

fn read_name_table<R: Read + Seek>(reader: &mut R) -> BinResult<Vec<CompactString>> {
    let header = RawNameTableHeader::read(reader)?;
    let start = reader.stream_position()?;
    let end = start + u64::from(header.names_len);

    let mut names = Vec::new();
    let mut record = [0; NAME_RECORD_LEN];
    let mut position = start;
    while position < end {
        // a table length that is not a multiple of 64 ends with a short record
        let record_len = (end - position).min(NAME_RECORD_LEN as u64) as usize;
        reader.read_exact(&mut record[..record_len])?;
        names.push(parse_name(&record[..record_len]));
        position += record_len as u64;
    }
    reader.seek(SeekFrom::Start(end))?;

    Ok(names)
}

fn read_file_table<R: Read + Seek>(
    reader: &mut R,
    names: &[CompactString],
    table_end: u64,
    archive_len: u64,
) -> Result<Vec<FileEntry>, OneError> {
    let mut entries = Vec::new();
    let mut position = reader
        .stream_position()
        .map_err(binrw::Error::from)
        .context(MalformedSnafu { what: "file table" })?;

    while position < table_end {
        let record = RawFileRecord::read(reader).context(MalformedSnafu {
            what: "file record",
        })?;
        let offset = position + FILE_RECORD_LEN;

        let name = names
            .get(record.name_index as usize)
            .context(NameIndexOutOfRangeSnafu {
                position,
                name_index: record.name_index,
                names: names.len(),
            })?
            .clone();
        ensure!(
            offset + u64::from(record.size) <= archive_len,
            EntryOutOfBoundsSnafu {
                name,
                offset,
                length: record.size,
                archive_len,
            }
        );

        position = offset + u64::from(record.size);
        reader
            .seek(SeekFrom::Start(position))
            .map_err(binrw::Error::from)
            .context(MalformedSnafu { what: "file table" })?;

        entries.push(FileEntry {
            name,
            offset,
            length: record.size,
        });
    }

    Ok(entries)
}

/// Allows reading entries from a ONE archive
///
/// Reads go through [`ByteSource::read_exact_at`], so a shared reference is enough to read entries.
pub struct OneArchive<S> {
    // absent only when the archive file could not be opened
    source: Option<S>,
    name: String,
    variant: ArchiveVariant,
    entries: Vec<FileEntry>,
    diagnostics: Diagnostics,
}

impl OneArchive<FileSource> {
    /// Opens and indexes the archive at `path`.
    ///
    /// An archive that can't be opened, or whose variant is not supported, is reported to `diagnostics`
    ///     and comes back empty. A structurally broken archive is an error.
    #[instrument(skip(diagnostics))]
    pub fn open(path: &Path, diagnostics: Diagnostics) -> Result<Self, OneError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        match FileSource::open(path) {
            Ok(source) => Self::from_source(source, name, diagnostics),
            Err(err) => {
                diagnostics.error(&format!(
                    "could not open .one archive {}: {}",
                    path.display(),
                    err
                ));
                Ok(Self {
                    source: None,
                    name,
                    variant: ArchiveVariant::Unknown,
                    entries: Vec::new(),
                    diagnostics,
                })
            }
        }
    }
}

impl<S: ByteSource> OneArchive<S> {
    /// Indexes an archive served by `source`. `name` is only used for messages.
    pub fn from_source(
        source: S,
        name: impl Into<String>,
        diagnostics: Diagnostics,
    ) -> Result<Self, OneError> {
        let name = name.into();
        let mut reader = SourceCursor::new(&source);

        let header = RawHeader::read(&mut reader).context(MalformedSnafu { what: "header" })?;
        let variant = ArchiveVariant::from_magic(header.magic);

        let entries = match variant {
            ArchiveVariant::Heroes | ArchiveVariant::HeroesE3 | ArchiveVariant::HeroesPreE3 => {
                let names =
                    read_name_table(&mut reader).context(MalformedSnafu { what: "name table" })?;
                let table_end = u64::from(header.table_end) + HEADER_PREFIX_LEN;
                read_file_table(&mut reader, &names, table_end, source.len())?
            }
            ArchiveVariant::Shadow050 | ArchiveVariant::Shadow060 => {
                diagnostics.error(&format!(
                    "{}: Shadow the Hedgehog .one archives are unsupported",
                    name
                ));
                Vec::new()
            }
            ArchiveVariant::Unknown => {
                diagnostics.error(&format!(
                    "{}: unknown archive type (magic 0x{:08x})",
                    name, header.magic
                ));
                Vec::new()
            }
        };

        debug!(
            archive = %name,
            %variant,
            entries = entries.len(),
            "indexed ONE archive"
        );

        Ok(Self {
            source: Some(source),
            name,
            variant,
            entries,
            diagnostics,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant(&self) -> ArchiveVariant {
        self.variant
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Entries in the order they appear in the archive.
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn file_count(&self) -> usize {
        self.entries.len()
    }

    pub fn file_name(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|entry| entry.name.as_str())
    }

    /// Finds the first entry with exactly this name.
    ///
    /// Names are not unique within an archive: later entries with the same name are never returned.
    pub fn find_file(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.name.as_str() == name)
    }

    fn entry(&self, index: usize) -> Result<&FileEntry, OneError> {
        self.entries.get(index).context(IndexOutOfRangeSnafu {
            index,
            count: self.entries.len(),
        })
    }

    /// Reads the compressed bytes of an entry.
    pub fn read_raw(&self, index: usize) -> Result<OwnedBuffer, OneError> {
        let entry = self.entry(index)?;
        // no source means no entries, so `entry` would have failed already
        let source = self.source.as_ref().context(IndexOutOfRangeSnafu {
            index,
            count: 0usize,
        })?;

        let mut data = vec![0; entry.length as usize];
        source
            .read_exact_at(entry.offset, &mut data)
            .context(IoSnafu {
                index,
                offset: entry.offset,
                length: entry.length,
            })?;
        Ok(ByteBuffer::from_vec(data))
    }

    /// Reads and decodes an entry.
    pub fn read_file(&self, index: usize) -> Result<OwnedBuffer, OneError> {
        let raw = self.read_raw(index)?;
        let entry = self.entry(index)?;

        let decoded = prs::decode_buffer(&raw).context(DecodeSnafu {
            index,
            name: entry.name.clone(),
        })?;
        debug!(
            name = %entry.name,
            compressed = entry.length,
            decoded = decoded.size(),
            "read ONE entry"
        );
        Ok(decoded)
    }

    /// Reads and decodes the first entry named `name`.
    pub fn read_file_by_name(&self, name: &str) -> Result<OwnedBuffer, OneError> {
        let index = self
            .find_file(name)
            .context(FileNotFoundSnafu { name })?;
        self.read_file(index)
    }
}

impl<S> fmt::Debug for OneArchive<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneArchive")
            .field("name", &self.name)
            .field("variant", &self.variant)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}
