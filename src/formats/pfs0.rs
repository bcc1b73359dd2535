//! PFS0 (PartitionFS) - flat archive container.
//!
//! Used as the outer container for NSP packages and embedded inside NCAs as
//! the ExeFS, Logo and Meta sections.
//!
//! ## Layout
//! ```text
//! [0x00] Magic "PFS0"              (4 bytes)
//! [0x04] FileCount                 (u32 LE)
//! [0x08] StringTableSize           (u32 LE)
//! [0x0C] Reserved (always 0)       (4 bytes)
//! [0x10] EntryTable                (FileCount × 0x18 bytes)
//! [0x10 + FileCount×0x18]
//!        StringTable               (StringTableSize bytes)
//! [0x10 + FileCount×0x18 + StringTableSize]
//!        FileData                  (remaining bytes)
//! ```
//!
//! ## File Entry (0x18 bytes)
//! ```text
//! [0x00] Offset  - relative to the data section start (u64 LE)
//! [0x08] Size    - in bytes (u64 LE)
//! [0x10] NameOffset - byte offset into the string table (u32 LE)
//! [0x14] Reserved   (u32)
//! ```

use std::io::{Read, Seek};

use crate::{Error, Result};
use crate::utils::{bytesv, le_u32, le_u64, magic, null_string};
use crate::vfs::{OffsetFile, VectorDirectory, VfsReader, VirtualDir, VirtualFile};

/// Parsed PFS0 container (metadata only).
#[derive(Debug)]
pub struct Pfs0 {
    /// All file entries in declaration order.
    pub files: Vec<Pfs0File>,
    /// Absolute byte offset (from the start of the stream) to the file
    /// data section.
    pub data_offset: u64,
}

/// Metadata for a single file inside a PFS0.
#[derive(Debug, Clone)]
pub struct Pfs0File {
    /// File name decoded from the string table.
    pub name: String,
    /// Offset relative to the PFS0 data section.
    pub offset: u64,
    /// File size in bytes.
    pub size: u64,
}

impl Pfs0 {
    /// Parse a PFS0 container from `r`.
    ///
    /// The reader must be positioned at the very start of the PFS0 magic.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;

        magic(r, b"PFS0")?;
        let file_count = le_u32(r)?;
        let string_table_size = le_u32(r)?;
        let _reserved = le_u32(r)?;

        let mut entries = Vec::with_capacity(file_count.min(0x1000) as usize);
        for _ in 0..file_count {
            let offset = le_u64(r)?;
            let size = le_u64(r)?;
            let name_offset = le_u32(r)?;
            let _reserved = le_u32(r)?;
            entries.push((offset, size, name_offset));
        }

        let string_table = bytesv(r, string_table_size as usize)?;

        let mut files = Vec::with_capacity(entries.len());
        for (offset, size, name_offset) in entries {
            let name = null_string(&string_table, name_offset as usize)?;
            files.push(Pfs0File { name, offset, size });
        }

        let data_offset = base + 0x10 + file_count as u64 * 0x18 + string_table_size as u64;

        Ok(Self { files, data_offset })
    }

    /// Parse `file` as a PFS0 and expose its entries as a read-only
    /// directory of zero-copy windows.
    pub fn open(file: VirtualFile) -> Result<VirtualDir> {
        let pfs0 = Self::parse(&mut VfsReader::new(file.clone()))?;
        let mut entries: Vec<VirtualFile> = Vec::with_capacity(pfs0.files.len());
        for f in &pfs0.files {
            entries.push(OffsetFile::new(
                file.clone(),
                f.name.clone(),
                pfs0.data_offset
                    .checked_add(f.offset)
                    .ok_or(Error::InvalidRange)?,
                f.size,
            )?);
        }
        Ok(VectorDirectory::read_only(file.name(), entries, []))
    }
}

/// Serialize `files` as a PFS0 image. Entry order is preserved.
pub fn build(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut strings = Vec::new();
    let mut name_offsets = Vec::with_capacity(files.len());
    for (name, _) in files {
        name_offsets.push(strings.len() as u32);
        strings.extend_from_slice(name.as_bytes());
        strings.push(0);
    }
    while strings.len() % 0x20 != 0 {
        strings.push(0);
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"PFS0");
    out.extend_from_slice(&(files.len() as u32).to_le_bytes());
    out.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    let mut data_offset = 0u64;
    for ((_, data), name_offset) in files.iter().zip(&name_offsets) {
        out.extend_from_slice(&data_offset.to_le_bytes());
        out.extend_from_slice(&(data.len() as u64).to_le_bytes());
        out.extend_from_slice(&name_offset.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        data_offset += data.len() as u64;
    }
    out.extend_from_slice(&strings);
    for (_, data) in files {
        out.extend_from_slice(data);
    }
    out
}
