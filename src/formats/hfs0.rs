//! HFS0 (SHA-256 FileSystem) - hashed archive used by gamecards.
//!
//! The root HFS0 of an XCI contains named sub-partitions (`update`,
//! `normal`, `secure`, `logo`), each itself an HFS0 holding NCAs.
//!
//! ## Layout
//! ```text
//! [0x00] Magic "HFS0"              (4 bytes)
//! [0x04] FileCount                 (u32 LE)
//! [0x08] StringTableSize           (u32 LE)
//! [0x0C] Reserved                  (4 bytes)
//! [0x10] EntryTable                (FileCount × 0x40 bytes)
//! [0x10 + FileCount×0x40]
//!        StringTable               (StringTableSize bytes)
//! [(after StringTable)]
//!        FileData                  (remaining bytes)
//! ```
//!
//! ## File Entry (0x40 bytes)
//! ```text
//! [0x00] DataOffset - relative to the data section start (u64 LE)
//! [0x08] DataSize   - in bytes (u64 LE)
//! [0x10] NameOffset - byte offset into the string table (u32 LE)
//! [0x14] HashedRegionSize (u32 LE)
//! [0x18] Reserved   (8 bytes)
//! [0x20] SHA-256 of the first HashedRegionSize bytes (32 bytes)
//! ```
//!
//! Hashes are recorded but not verified.

use std::io::{Read, Seek};

use crate::{Error, Result};
use crate::utils::{bytesa, bytesv, le_u32, le_u64, magic, null_string};
use crate::vfs::{OffsetFile, VectorDirectory, VfsReader, VirtualDir, VirtualFile};

/// Parsed HFS0 container (metadata only).
#[derive(Debug)]
pub struct Hfs0 {
    /// All file entries in declaration order.
    pub files: Vec<Hfs0File>,
    /// Absolute byte offset (from stream start) where file data begins.
    pub data_offset: u64,
}

/// Metadata for a single file inside an HFS0.
#[derive(Debug, Clone)]
pub struct Hfs0File {
    pub name: String,
    /// Offset relative to the HFS0 data section.
    pub offset: u64,
    pub size: u64,
    pub hashed_region_size: u32,
    pub sha256: [u8; 32],
}

impl Hfs0 {
    /// Parse an HFS0 container from `r`, positioned at the magic.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;

        magic(r, b"HFS0")?;
        let file_count = le_u32(r)?;
        let string_table_size = le_u32(r)?;
        let _reserved = le_u32(r)?;

        let mut entries = Vec::with_capacity(file_count.min(0x1000) as usize);
        for _ in 0..file_count {
            let offset = le_u64(r)?;
            let size = le_u64(r)?;
            let name_offset = le_u32(r)?;
            let hashed_region_size = le_u32(r)?;
            let _reserved = bytesa::<8>(r)?;
            let sha256 = bytesa::<32>(r)?;
            entries.push((offset, size, name_offset, hashed_region_size, sha256));
        }

        let string_table = bytesv(r, string_table_size as usize)?;

        let mut files = Vec::with_capacity(entries.len());
        for (offset, size, name_offset, hashed_region_size, sha256) in entries {
            files.push(Hfs0File {
                name: null_string(&string_table, name_offset as usize)?,
                offset,
                size,
                hashed_region_size,
                sha256,
            });
        }

        let data_offset = base + 0x10 + file_count as u64 * 0x40 + string_table_size as u64;

        Ok(Self { files, data_offset })
    }

    /// Parse `file` as an HFS0 and return its entries as raw windows, in
    /// declaration order.
    pub fn entries(file: &VirtualFile) -> Result<Vec<VirtualFile>> {
        let hfs0 = Self::parse(&mut VfsReader::new(file.clone()))?;
        let mut out: Vec<VirtualFile> = Vec::with_capacity(hfs0.files.len());
        for f in &hfs0.files {
            out.push(OffsetFile::new(
                file.clone(),
                f.name.clone(),
                hfs0.data_offset
                    .checked_add(f.offset)
                    .ok_or(Error::InvalidRange)?,
                f.size,
            )?);
        }
        Ok(out)
    }

    /// Parse `file` as an HFS0 and expose it as a read-only directory.
    pub fn open(file: VirtualFile) -> Result<VirtualDir> {
        let entries = Self::entries(&file)?;
        Ok(VectorDirectory::read_only(file.name(), entries, []))
    }
}

/// Serialize `files` as an HFS0 image with zeroed hashes.
pub fn build(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut strings = Vec::new();
    let mut name_offsets = Vec::with_capacity(files.len());
    for (name, _) in files {
        name_offsets.push(strings.len() as u32);
        strings.extend_from_slice(name.as_bytes());
        strings.push(0);
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"HFS0");
    out.extend_from_slice(&(files.len() as u32).to_le_bytes());
    out.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    let mut data_offset = 0u64;
    for ((_, data), name_offset) in files.iter().zip(&name_offsets) {
        out.extend_from_slice(&data_offset.to_le_bytes());
        out.extend_from_slice(&(data.len() as u64).to_le_bytes());
        out.extend_from_slice(&name_offset.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&[0u8; 32]);
        data_offset += data.len() as u64;
    }
    out.extend_from_slice(&strings);
    for (_, data) in files {
        out.extend_from_slice(data);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{VectorFile, VfsFile};

    #[test]
    fn nested_partitions_resolve() {
        let inner = build(&[("a.nca", b"AAAA")]);
        let outer = build(&[("secure", &inner), ("normal", b"")]);
        let root = Hfs0::open(VectorFile::new("root", outer)).unwrap();
        let secure = Hfs0::open(root.file("secure").unwrap()).unwrap();
        assert_eq!(secure.file("a.nca").unwrap().read_all().unwrap(), b"AAAA");
        assert_eq!(root.file("normal").unwrap().size(), 0);
    }

    #[test]
    fn entry_offset_past_u64_is_rejected() {
        let mut image = build(&[("secure", b"AAAA")]);
        image[0x10..0x18].copy_from_slice(&u64::MAX.to_le_bytes());
        let err = Hfs0::open(VectorFile::new("wrap", image)).unwrap_err();
        assert!(matches!(err, Error::InvalidRange));
    }
}
