//! NCA (Nintendo Content Archive) - typed content container.
//!
//! ## Encryption
//! The first 0xC00 bytes are AES-128-XTS encrypted and every section has
//! its own AES-CTR stream. This module never decrypts anything itself: it
//! asks a [`ContentDecoder`] for the plaintext header and for each section.
//!
//! ## Header Layout (plaintext, offsets from archive start)
//! ```text
//! [0x000] RSA-2048 sig[0]  (0x100) - fixed key, over [0x200..0x400]
//! [0x100] RSA-2048 sig[1]  (0x100) - NPDM key
//! [0x200] Magic            NCA3/NCA2/NCA1/NCA0
//! [0x204] DistributionType (1 byte)
//! [0x205] ContentType      (1 byte)
//! [0x206] KeyGenerationOld (1 byte)
//! [0x207] KeyAreaEncKeyIdx (1 byte)
//! [0x208] ContentSize      (u64 LE)
//! [0x210] ProgramId        (u64 LE)
//! [0x218] ContentIndex     (u32 LE)
//! [0x21C] SdkAddonVersion  (u32 LE)
//! [0x220] KeyGeneration    (1 byte)
//! [0x221] SignatureKeyGen  (1 byte, 9.0.0+)
//! [0x222] Reserved         (0xE bytes)
//! [0x230] RightsId         (0x10 bytes)
//! [0x240] FsEntries        (4 × 0x10 bytes)
//! [0x280] FsHeaderHashes   (4 × 0x20 bytes SHA-256)
//! [0x300] EncryptedKeyArea (4 × 0x10 bytes)
//! [0x340] Reserved         (0xC0 bytes)
//! [0x400] FsHeader[0..4]   (4 × 0x200 bytes)
//! ```
//!
//! ## FsHeader (first bytes used here)
//! ```text
//! [0x0] Version        (u16 LE)
//! [0x2] FsType         0 = RomFS, 1 = PartitionFS
//! [0x3] HashType       (1 byte)
//! [0x4] EncryptionType 4 = AesCtrEx (BKTR patch section)
//! ```
//!
//! ## Derived views
//! PartitionFS sections are opened as directories ([`Nca::partitions`]).
//! The one holding exactly the canonical executables (`main`,
//! `main.npdm`) is the ExeFS; the one holding `NintendoLogo.png` and
//! `StartupMovie.gif` is the logo partition. The first RomFS section is the
//! RomFS stream.

use std::io::{Cursor, Read, Seek, SeekFrom};

use super::cnmt::ContentRecordType;
use super::pfs0::Pfs0;
use crate::decoder::ContentDecoder;
use crate::error::LoadStatus;
use crate::utils::{bytesa, le_u16, le_u32, le_u64, u8};
use crate::vfs::{VfsDirectory, VfsFile, VirtualDir, VirtualFile};
use crate::{Error, Result};

/// Plaintext bytes needed to describe an archive: main header plus the
/// four fs headers.
pub const NCA_HEADER_SIZE: usize = 0xC00;
/// Media block size used by fs entry offsets.
pub const MEDIA_BLOCK_SIZE: u64 = 0x200;

const FS_HEADER_OFFSET: usize = 0x400;
const FS_HEADER_SIZE: usize = 0x200;

/// 16-byte rights id. All zero means the archive is not title-key protected.
pub type RightsId = [u8; 0x10];

/// Distribution type for an NCA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionType {
    Download,
    GameCard,
    Unknown(u8),
}

impl From<u8> for DistributionType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Download,
            1 => Self::GameCard,
            x => Self::Unknown(x),
        }
    }
}

/// Content type declared by an NCA header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Program,
    Meta,
    Control,
    Manual,
    Data,
    PublicData,
    Unknown(u8),
}

impl From<u8> for ContentType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Program,
            1 => Self::Meta,
            2 => Self::Control,
            3 => Self::Manual,
            4 => Self::Data,
            5 => Self::PublicData,
            x => Self::Unknown(x),
        }
    }
}

impl From<ContentType> for u8 {
    fn from(v: ContentType) -> Self {
        match v {
            ContentType::Program => 0,
            ContentType::Meta => 1,
            ContentType::Control => 2,
            ContentType::Manual => 3,
            ContentType::Data => 4,
            ContentType::PublicData => 5,
            ContentType::Unknown(x) => x,
        }
    }
}

impl ContentType {
    /// Narrow to the on-disk record type.
    ///
    /// Lossy by design of the record format: `Data` and `PublicData` both
    /// become `Data`, `Manual` becomes `HtmlDocument`. `None` only for
    /// [`ContentType::Unknown`].
    pub fn record_type(self) -> Option<ContentRecordType> {
        match self {
            ContentType::Program => Some(ContentRecordType::Program),
            ContentType::Meta => Some(ContentRecordType::Meta),
            ContentType::Control => Some(ContentRecordType::Control),
            ContentType::Manual => Some(ContentRecordType::HtmlDocument),
            ContentType::Data | ContentType::PublicData => Some(ContentRecordType::Data),
            ContentType::Unknown(_) => None,
        }
    }
}

/// Filesystem kind of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsType {
    RomFs,
    PartitionFs,
    Unknown(u8),
}

impl From<u8> for FsType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::RomFs,
            1 => Self::PartitionFs,
            x => Self::Unknown(x),
        }
    }
}

/// Encryption applied to a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionType {
    Auto,
    None,
    AesXts,
    AesCtr,
    /// Patch (BKTR) section; needs the base archive's RomFS.
    AesCtrEx,
    Unknown(u8),
}

impl From<u8> for EncryptionType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Auto,
            1 => Self::None,
            2 => Self::AesXts,
            3 => Self::AesCtr,
            4 => Self::AesCtrEx,
            x => Self::Unknown(x),
        }
    }
}

/// Offsets are in 0x200-byte media blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FsEntry {
    pub start_block: u32,
    pub end_block: u32,
}

impl FsEntry {
    pub fn is_empty(&self) -> bool {
        self.end_block <= self.start_block
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsHeader {
    pub version: u16,
    pub fs_type: FsType,
    pub hash_type: u8,
    pub encryption_type: EncryptionType,
}

/// Parsed NCA header (from plaintext bytes).
#[derive(Debug, Clone)]
pub struct NcaHeader {
    /// NCA format version: 0, 1, 2, or 3.
    pub version: u8,
    pub distribution_type: DistributionType,
    pub content_type: ContentType,
    /// Effective key generation (max of KeyGenerationOld and KeyGeneration).
    pub key_generation: u8,
    pub key_area_enc_key_index: u8,
    pub content_size: u64,
    /// Owning title id.
    pub title_id: u64,
    pub content_index: u32,
    pub sdk_version: u32,
    pub rights_id: RightsId,
    pub fs_entries: [FsEntry; 4],
    pub fs_header_hashes: [[u8; 0x20]; 4],
    pub encrypted_key_area: [[u8; 0x10]; 4],
    pub fs_headers: [FsHeader; 4],
}

impl NcaHeader {
    /// Parse a header from a reader over **plaintext** archive bytes,
    /// positioned at the first signature.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;
        r.seek(SeekFrom::Start(base + 0x200))?;

        let magic = bytesa::<4>(r)?;
        let version = match &magic {
            b"NCA3" => 3,
            b"NCA2" => 2,
            b"NCA1" => 1,
            b"NCA0" => 0,
            _ => return Err(Error::BadMagic),
        };

        let distribution_type = DistributionType::from(u8(r)?);
        let content_type = ContentType::from(u8(r)?);
        let key_gen_old = u8(r)?;
        let key_area_enc_key_index = u8(r)?;
        let content_size = le_u64(r)?;
        let title_id = le_u64(r)?;
        let content_index = le_u32(r)?;
        let sdk_version = le_u32(r)?;
        let key_gen_new = u8(r)?;
        let _sig_key_gen = u8(r)?;
        let _reserved = bytesa::<0xE>(r)?;
        let rights_id = bytesa::<0x10>(r)?;

        let mut fs_entries = [FsEntry::default(); 4];
        for entry in &mut fs_entries {
            let start_block = le_u32(r)?;
            let end_block = le_u32(r)?;
            let _reserved = le_u64(r)?;
            *entry = FsEntry {
                start_block,
                end_block,
            };
        }

        let mut fs_header_hashes = [[0u8; 0x20]; 4];
        for hash in &mut fs_header_hashes {
            *hash = bytesa::<0x20>(r)?;
        }

        let mut encrypted_key_area = [[0u8; 0x10]; 4];
        for key in &mut encrypted_key_area {
            *key = bytesa::<0x10>(r)?;
        }

        let mut fs_headers = [FsHeader {
            version: 0,
            fs_type: FsType::RomFs,
            hash_type: 0,
            encryption_type: EncryptionType::Auto,
        }; 4];
        for (i, fs) in fs_headers.iter_mut().enumerate() {
            r.seek(SeekFrom::Start(
                base + (FS_HEADER_OFFSET + i * FS_HEADER_SIZE) as u64,
            ))?;
            let version = le_u16(r)?;
            let fs_type = FsType::from(u8(r)?);
            let hash_type = u8(r)?;
            let encryption_type = EncryptionType::from(u8(r)?);
            *fs = FsHeader {
                version,
                fs_type,
                hash_type,
                encryption_type,
            };
        }

        Ok(Self {
            version,
            distribution_type,
            content_type,
            key_generation: key_gen_old.max(key_gen_new),
            key_area_enc_key_index,
            content_size,
            title_id,
            content_index,
            sdk_version,
            rights_id,
            fs_entries,
            fs_header_hashes,
            encrypted_key_area,
            fs_headers,
        })
    }

    /// Returns true if the archive uses title-key crypto.
    pub fn has_rights_id(&self) -> bool {
        self.rights_id.iter().any(|&b| b != 0)
    }

    /// `(byte offset, byte size)` of section `index`, if present.
    pub fn section_range(&self, index: usize) -> Option<(u64, u64)> {
        let e = self.fs_entries.get(index)?;
        if e.is_empty() {
            return None;
        }
        let start = e.start_block as u64 * MEDIA_BLOCK_SIZE;
        let end = e.end_block as u64 * MEDIA_BLOCK_SIZE;
        Some((start, end - start))
    }
}

/// A content archive opened through a [`ContentDecoder`].
///
/// Construction never fails; check [`Nca::status`] before trusting any
/// accessor. Accessors on a failed archive return empty values.
#[derive(Debug, Clone)]
pub struct Nca {
    file: VirtualFile,
    header: Option<NcaHeader>,
    status: LoadStatus,
    encrypted: bool,
    is_update: bool,
    sections: Vec<VirtualFile>,
    partitions: Vec<VirtualDir>,
    romfs: Option<VirtualFile>,
    exefs: Option<VirtualDir>,
    logo: Option<VirtualDir>,
}

impl Nca {
    /// Open `file`. `base` supplies the RomFS a patch (BKTR) section is
    /// applied to; without it a patch archive reports
    /// [`LoadStatus::ErrorMissingBktrBaseRomFs`] but keeps its header and
    /// partitions usable.
    pub fn new(file: VirtualFile, base: Option<&Nca>, decoder: &dyn ContentDecoder) -> Self {
        let mut nca = Self {
            encrypted: !has_plaintext_magic(&file),
            file,
            header: None,
            status: LoadStatus::Success,
            is_update: false,
            sections: Vec::new(),
            partitions: Vec::new(),
            romfs: None,
            exefs: None,
            logo: None,
        };
        nca.status = nca.load(base, decoder);
        nca
    }

    fn load(&mut self, base: Option<&Nca>, decoder: &dyn ContentDecoder) -> LoadStatus {
        if self.file.size() < NCA_HEADER_SIZE as u64 {
            return LoadStatus::ErrorBadHeader;
        }
        let plain = match decoder.decrypt_header(&self.file) {
            Ok(p) => p,
            Err(Error::Io(_)) => return LoadStatus::ErrorIo,
            Err(_) => return LoadStatus::ErrorDecryption,
        };
        let header = match NcaHeader::parse(&mut Cursor::new(plain)) {
            Ok(h) => h,
            Err(e) => return LoadStatus::from(&e),
        };
        if let ContentType::Unknown(_) = header.content_type {
            return LoadStatus::ErrorUnknownContentType;
        }

        let mut status = LoadStatus::Success;
        for index in 0..header.fs_entries.len() {
            let Some((offset, size)) = header.section_range(index) else {
                continue;
            };
            if offset + size > self.file.size() {
                self.header = Some(header);
                return LoadStatus::ErrorBadHeader;
            }
            let section = match decoder.open_section(&self.file, &header, index) {
                Ok(s) => s,
                Err(_) => {
                    self.header = Some(header);
                    return LoadStatus::ErrorDecryption;
                }
            };
            self.sections.push(section.clone());
            let fs = header.fs_headers[index];
            match fs.fs_type {
                FsType::PartitionFs => {
                    let dir = match Pfs0::open(section) {
                        Ok(d) => d,
                        Err(_) => {
                            self.header = Some(header);
                            return LoadStatus::ErrorBadPartition;
                        }
                    };
                    if self.exefs.is_none() && is_exefs(&dir) {
                        self.exefs = Some(dir.clone());
                    } else if self.logo.is_none() && is_logo_partition(&dir) {
                        self.logo = Some(dir.clone());
                    }
                    self.partitions.push(dir);
                }
                FsType::RomFs => {
                    if fs.encryption_type == EncryptionType::AesCtrEx {
                        self.is_update = true;
                        if base.and_then(Nca::romfs).is_none() {
                            status = LoadStatus::ErrorMissingBktrBaseRomFs;
                            continue;
                        }
                    }
                    if self.romfs.is_none() {
                        self.romfs = Some(section);
                    }
                }
                FsType::Unknown(_) => {
                    self.header = Some(header);
                    return LoadStatus::ErrorBadPartition;
                }
            }
        }
        self.header = Some(header);
        status
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    /// Parsed header, present whenever the header itself was accepted (even
    /// if a section later failed).
    pub fn header(&self) -> Option<&NcaHeader> {
        self.header.as_ref()
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.header.as_ref().map(|h| h.content_type)
    }

    pub fn record_type(&self) -> Option<ContentRecordType> {
        self.content_type().and_then(ContentType::record_type)
    }

    pub fn title_id(&self) -> u64 {
        self.header.as_ref().map_or(0, |h| h.title_id)
    }

    /// All zero when absent or not title-key protected.
    pub fn rights_id(&self) -> RightsId {
        self.header.as_ref().map_or([0; 0x10], |h| h.rights_id)
    }

    pub fn sdk_version(&self) -> u32 {
        self.header.as_ref().map_or(0, |h| h.sdk_version)
    }

    pub fn key_generation(&self) -> u8 {
        self.header.as_ref().map_or(0, |h| h.key_generation)
    }

    /// True if the archive carries a patch (BKTR) section.
    pub fn is_update(&self) -> bool {
        self.is_update
    }

    /// True if the raw bytes did not already carry a plaintext NCA magic.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn romfs(&self) -> Option<VirtualFile> {
        self.romfs.clone()
    }

    pub fn exefs(&self) -> Option<VirtualDir> {
        self.exefs.clone()
    }

    pub fn logo_partition(&self) -> Option<VirtualDir> {
        self.logo.clone()
    }

    /// Every opened plaintext section, in section order.
    pub fn sections(&self) -> &[VirtualFile] {
        &self.sections
    }

    /// Every PartitionFS section, in section order.
    pub fn partitions(&self) -> &[VirtualDir] {
        &self.partitions
    }

    /// The raw (still encoded) archive.
    pub fn base_file(&self) -> &VirtualFile {
        &self.file
    }

    pub fn name(&self) -> String {
        self.file.name()
    }
}

/// An ExeFS must contain the two canonical executable files.
pub fn is_exefs(dir: &VirtualDir) -> bool {
    dir.file("main").is_some() && dir.file("main.npdm").is_some()
}

/// The logo partition holds the static logo and the startup animation.
pub fn is_logo_partition(dir: &VirtualDir) -> bool {
    dir.file("NintendoLogo.png").is_some() && dir.file("StartupMovie.gif").is_some()
}

fn has_plaintext_magic(file: &VirtualFile) -> bool {
    matches!(
        file.read_bytes(4, 0x200).as_deref(),
        Ok(b"NCA3" | b"NCA2" | b"NCA1" | b"NCA0")
    )
}

/// Builder for plaintext NCA images, as accepted by
/// [`crate::decoder::PlaintextDecoder`].
///
/// Sections are laid out back to back after the header, each padded to a
/// media block.
#[derive(Debug, Clone)]
pub struct NcaBuilder {
    content_type: ContentType,
    title_id: u64,
    rights_id: RightsId,
    sdk_version: u32,
    key_generation: u8,
    sections: Vec<(FsType, EncryptionType, Vec<u8>)>,
}

impl NcaBuilder {
    pub fn new(content_type: ContentType, title_id: u64) -> Self {
        Self {
            content_type,
            title_id,
            rights_id: [0; 0x10],
            sdk_version: 0x000C_1100,
            key_generation: 0,
            sections: Vec::new(),
        }
    }

    pub fn rights_id(mut self, rights_id: RightsId) -> Self {
        self.rights_id = rights_id;
        self
    }

    pub fn key_generation(mut self, key_generation: u8) -> Self {
        self.key_generation = key_generation;
        self
    }

    /// Append a PartitionFS section holding `pfs0` bytes.
    pub fn partition(mut self, pfs0: Vec<u8>) -> Self {
        self.sections
            .push((FsType::PartitionFs, EncryptionType::None, pfs0));
        self
    }

    /// Append a RomFS section.
    pub fn romfs(mut self, data: Vec<u8>) -> Self {
        self.sections.push((FsType::RomFs, EncryptionType::None, data));
        self
    }

    /// Append a patch (BKTR) RomFS section.
    pub fn patch_romfs(mut self, data: Vec<u8>) -> Self {
        self.sections
            .push((FsType::RomFs, EncryptionType::AesCtrEx, data));
        self
    }

    /// Serialize. At most four sections are emitted.
    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0u8; NCA_HEADER_SIZE];
        out[0x200..0x204].copy_from_slice(b"NCA3");
        out[0x205] = u8::from(self.content_type);
        out[0x208..0x210].copy_from_slice(&0u64.to_le_bytes());
        out[0x210..0x218].copy_from_slice(&self.title_id.to_le_bytes());
        out[0x21C..0x220].copy_from_slice(&self.sdk_version.to_le_bytes());
        out[0x220] = self.key_generation;
        out[0x230..0x240].copy_from_slice(&self.rights_id);

        for (i, (fs_type, enc, data)) in self.sections.iter().take(4).enumerate() {
            let start_block = (out.len() as u64 / MEDIA_BLOCK_SIZE) as u32;
            out.extend_from_slice(data);
            let padded = out.len().next_multiple_of(MEDIA_BLOCK_SIZE as usize);
            out.resize(padded.max(start_block as usize * 0x200 + 0x200), 0);
            let end_block = (out.len() as u64 / MEDIA_BLOCK_SIZE) as u32;

            let entry = 0x240 + i * 0x10;
            out[entry..entry + 4].copy_from_slice(&start_block.to_le_bytes());
            out[entry + 4..entry + 8].copy_from_slice(&end_block.to_le_bytes());

            let fs = FS_HEADER_OFFSET + i * FS_HEADER_SIZE;
            out[fs..fs + 2].copy_from_slice(&2u16.to_le_bytes());
            out[fs + 2] = match fs_type {
                FsType::RomFs => 0,
                FsType::PartitionFs => 1,
                FsType::Unknown(x) => *x,
            };
            out[fs + 4] = match enc {
                EncryptionType::Auto => 0,
                EncryptionType::None => 1,
                EncryptionType::AesXts => 2,
                EncryptionType::AesCtr => 3,
                EncryptionType::AesCtrEx => 4,
                EncryptionType::Unknown(x) => *x,
            };
        }
        let content_size = out.len() as u64;
        out[0x208..0x210].copy_from_slice(&content_size.to_le_bytes());
        out
    }
}
