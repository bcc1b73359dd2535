//! XCI (NX Card Image) - physical game card dump format.
//!
//! ## Overall Layout
//! ```text
//! [0x0000–0x0FFF] CardKeyArea      (only in full dumps; absent in most)
//! [base + 0x000 ] CardHeader       (0x200 bytes; see below)
//! [base + HfsOffset]
//!                 Root HFS0        (update / normal / secure / logo)
//! ```
//!
//! `base` is 0 for a plain dump and 0x1000 when the key area is present.
//! Every offset inside the header is relative to `base`.
//!
//! ## CardHeader (0x200 bytes)
//! ```text
//! [+0x000] RSA-2048 signature over [+0x100..+0x200]     (0x100 bytes)
//! [+0x100] Magic "HEAD"                                  (4 bytes)
//! [+0x104] SecureAreaStartPage                           (u32 LE)
//! [+0x108] BackupAreaStartPage (always 0xFFFFFFFF)       (u32 LE)
//! [+0x10C] KekIndex                                      (1 byte)
//! [+0x10D] RomSize                                       (1 byte)
//! [+0x10E] HeaderVersion                                 (1 byte)
//! [+0x10F] Flags                                         (1 byte)
//! [+0x110] PackageId                                     (u64 LE)
//! [+0x118] ValidDataEnd (page units)                     (u64 LE)
//! [+0x120] InfoIv                                        (16 bytes)
//! [+0x130] HfsOffset                                     (u64 LE)
//! [+0x138] HfsHeaderSize                                 (u64 LE)
//! [+0x140] HfsHeaderHash (SHA-256)                       (32 bytes)
//! [+0x160] InitialDataHash (SHA-256)                     (32 bytes)
//! [+0x180] SecureModeFlag                                (u32 LE)
//! [+0x184] TitleKeyFlag                                  (u32 LE)
//! [+0x188] KeyFlag                                       (u32 LE)
//! [+0x18C] NormalAreaEnd (page units)                    (u32 LE)
//! [+0x190] GamecardInfo                                  (0x70 bytes)
//! ```
//!
//! ## GamecardInfo (0x70 bytes, as stored)
//! ```text
//! [+0x00] FirmwareVersion       (u64 LE)
//! [+0x08] AccessControlFlags    (u32 LE)
//! [+0x0C] ReadWaitTime1/2       (u32 LE × 2)
//! [+0x14] WriteWaitTime1/2      (u32 LE × 2)
//! [+0x1C] FirmwareMode          (u32 LE)
//! [+0x20] CupVersion            (u32 LE)
//! [+0x24] Reserved              (4 bytes)
//! [+0x28] UpdatePartitionHash   (u64 LE)
//! [+0x30] CupId                 (u64 LE)
//! [+0x38] Reserved              (0x38 bytes)
//! ```
//!
//! ## RomSize byte values
//! | Value | Capacity |
//! |-------|----------|
//! | 0xFA  | 1 GB     |
//! | 0xF8  | 2 GB     |
//! | 0xF0  | 4 GB     |
//! | 0xE0  | 8 GB     |
//! | 0xE1  | 16 GB    |
//! | 0xE2  | 32 GB    |

use std::io::{Read, Seek, SeekFrom};

use super::cnmt::Cnmt;
use super::hfs0::{self, Hfs0};
use super::nca::{ContentType, Nca};
use crate::decoder::ContentDecoder;
use crate::error::LoadStatus;
use crate::utils::{bytesa, le_u32, le_u64, magic, u8};
use crate::vfs::{OffsetFile, VectorDirectory, VfsDirectory, VfsFile, VfsReader, VirtualDir, VirtualFile};
use crate::Result;

pub const GAMECARD_HEADER_SIZE: u64 = 0x200;
/// Offset of the header in dumps that keep the card key area.
pub const KEY_AREA_SIZE: u64 = 0x1000;
/// Title id of the system update bundled on every card.
pub const SYSTEM_UPDATE_TITLE_ID: u64 = 0x0100_0000_0000_0816;

/// Named sub-partitions of the root HFS0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum XciPartition {
    Update,
    Normal,
    Secure,
    Logo,
}

impl XciPartition {
    pub const ALL: [XciPartition; 4] = [
        XciPartition::Update,
        XciPartition::Normal,
        XciPartition::Secure,
        XciPartition::Logo,
    ];

    /// Entry name in the root HFS0.
    pub fn name(self) -> &'static str {
        match self {
            XciPartition::Update => "update",
            XciPartition::Normal => "normal",
            XciPartition::Secure => "secure",
            XciPartition::Logo => "logo",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GamecardInfo {
    pub firmware_version: u64,
    pub access_control_flags: u32,
    pub read_wait_time: [u32; 2],
    pub write_wait_time: [u32; 2],
    pub firmware_mode: u32,
    pub cup_version: u32,
    pub update_partition_hash: u64,
    pub cup_id: u64,
}

/// The plaintext card header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GamecardHeader {
    pub secure_area_start: u32,
    pub backup_area_start: u32,
    pub kek_index: u8,
    /// RomSize byte (see table in module docs for capacity mapping).
    pub rom_size: u8,
    pub header_version: u8,
    pub flags: u8,
    pub package_id: u64,
    pub valid_data_end: u64,
    pub info_iv: [u8; 0x10],
    /// Offset of the root HFS0, relative to the header.
    pub hfs_offset: u64,
    pub hfs_header_size: u64,
    pub hfs_header_hash: [u8; 0x20],
    pub initial_data_hash: [u8; 0x20],
    pub secure_mode_flag: u32,
    pub title_key_flag: u32,
    pub key_flag: u32,
    pub normal_area_end: u32,
    pub info: GamecardInfo,
}

impl GamecardHeader {
    /// Parse a header. The reader must be positioned at the signature; it
    /// is left exactly [`GAMECARD_HEADER_SIZE`] bytes further on.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let _signature = bytesa::<0x100>(r)?;
        magic(r, b"HEAD")?;
        let secure_area_start = le_u32(r)?;
        let backup_area_start = le_u32(r)?;
        let kek_index = u8(r)?;
        let rom_size = u8(r)?;
        let header_version = u8(r)?;
        let flags = u8(r)?;
        let package_id = le_u64(r)?;
        let valid_data_end = le_u64(r)?;
        let info_iv = bytesa::<0x10>(r)?;
        let hfs_offset = le_u64(r)?;
        let hfs_header_size = le_u64(r)?;
        let hfs_header_hash = bytesa::<0x20>(r)?;
        let initial_data_hash = bytesa::<0x20>(r)?;
        let secure_mode_flag = le_u32(r)?;
        let title_key_flag = le_u32(r)?;
        let key_flag = le_u32(r)?;
        let normal_area_end = le_u32(r)?;

        let firmware_version = le_u64(r)?;
        let access_control_flags = le_u32(r)?;
        let read_wait_time = [le_u32(r)?, le_u32(r)?];
        let write_wait_time = [le_u32(r)?, le_u32(r)?];
        let firmware_mode = le_u32(r)?;
        let cup_version = le_u32(r)?;
        let _reserved1 = bytesa::<4>(r)?;
        let update_partition_hash = le_u64(r)?;
        let cup_id = le_u64(r)?;
        let _reserved2 = bytesa::<0x38>(r)?;

        Ok(Self {
            secure_area_start,
            backup_area_start,
            kek_index,
            rom_size,
            header_version,
            flags,
            package_id,
            valid_data_end,
            info_iv,
            hfs_offset,
            hfs_header_size,
            hfs_header_hash,
            initial_data_hash,
            secure_mode_flag,
            title_key_flag,
            key_flag,
            normal_area_end,
            info: GamecardInfo {
                firmware_version,
                access_control_flags,
                read_wait_time,
                write_wait_time,
                firmware_mode,
                cup_version,
                update_partition_hash,
                cup_id,
            },
        })
    }

    /// Return the ROM capacity as a human-readable string.
    pub fn rom_capacity(&self) -> &'static str {
        match self.rom_size {
            0xFA => "1 GB",
            0xF8 => "2 GB",
            0xF0 => "4 GB",
            0xE0 => "8 GB",
            0xE1 => "16 GB",
            0xE2 => "32 GB",
            _ => "unknown",
        }
    }
}

/// A game card image opened as its partitions.
///
/// Construction never fails; check [`Xci::status`] first. Only the secure
/// partition is required, the others may be absent.
#[derive(Debug, Clone)]
pub struct Xci {
    file: VirtualFile,
    header: Option<GamecardHeader>,
    header_offset: u64,
    status: LoadStatus,
    program_nca_status: LoadStatus,
    partitions: [Option<VirtualDir>; 4],
    partitions_raw: [Option<VirtualFile>; 4],
    program_title_ids: Vec<u64>,
    system_update_version: u32,
}

impl Xci {
    pub fn new(file: VirtualFile, decoder: &dyn ContentDecoder) -> Self {
        let mut xci = Self {
            file,
            header: None,
            header_offset: 0,
            status: LoadStatus::Success,
            program_nca_status: LoadStatus::ErrorMissingProgram,
            partitions: Default::default(),
            partitions_raw: Default::default(),
            program_title_ids: Vec::new(),
            system_update_version: 0,
        };
        xci.status = xci.load(decoder);
        xci
    }

    fn load(&mut self, decoder: &dyn ContentDecoder) -> LoadStatus {
        if self.file.size() < GAMECARD_HEADER_SIZE {
            return LoadStatus::ErrorBadHeader;
        }
        let (base, header) = match self.read_header() {
            Ok(found) => found,
            Err(e) => return LoadStatus::from(&e),
        };
        self.header_offset = base;
        self.header = Some(header);

        let Some(root_offset) = base.checked_add(header.hfs_offset) else {
            return LoadStatus::ErrorBadPartition;
        };
        let Some(root_size) = self.file.size().checked_sub(root_offset) else {
            return LoadStatus::ErrorBadPartition;
        };
        let entries = OffsetFile::new(self.file.clone(), "root", root_offset, root_size)
            .and_then(|root| Hfs0::entries(&(root as VirtualFile)));
        let entries = match entries {
            Ok(e) => e,
            Err(_) => return LoadStatus::ErrorBadPartition,
        };

        for kind in XciPartition::ALL {
            let Some(raw) = entries.iter().find(|f| f.name() == kind.name()) else {
                continue;
            };
            match Hfs0::open(raw.clone()) {
                Ok(dir) => self.partitions[kind.index()] = Some(dir),
                Err(_) => return LoadStatus::ErrorBadPartition,
            }
            self.partitions_raw[kind.index()] = Some(raw.clone());
        }

        let Some(secure) = self.partition(XciPartition::Secure) else {
            return LoadStatus::ErrorMissingPartition;
        };
        self.scan_programs(&secure, decoder);
        self.system_update_version = self.read_system_update_version(decoder);
        LoadStatus::Success
    }

    fn read_header(&self) -> Result<(u64, GamecardHeader)> {
        let mut r = VfsReader::new(self.file.clone());
        let first = GamecardHeader::parse(&mut r);
        match first {
            Err(crate::Error::BadMagic) if self.file.size() >= KEY_AREA_SIZE + GAMECARD_HEADER_SIZE => {
                r.seek(SeekFrom::Start(KEY_AREA_SIZE))?;
                Ok((KEY_AREA_SIZE, GamecardHeader::parse(&mut r)?))
            }
            other => Ok((0, other?)),
        }
    }

    fn scan_programs(&mut self, secure: &VirtualDir, decoder: &dyn ContentDecoder) {
        let Ok(files) = secure.files() else {
            self.program_nca_status = LoadStatus::ErrorBadPartition;
            return;
        };
        let mut first_failure = None;
        for file in files.into_iter().filter(is_nca) {
            let nca = Nca::new(file, None, decoder);
            if nca.content_type() != Some(ContentType::Program) {
                if !nca.status().is_success() {
                    first_failure.get_or_insert(nca.status());
                }
                continue;
            }
            if nca.status().is_success() {
                self.program_title_ids.push(nca.title_id());
            } else {
                first_failure.get_or_insert(nca.status());
            }
        }
        self.program_title_ids.sort_unstable();
        self.program_title_ids.dedup();
        self.program_nca_status = if self.program_title_ids.is_empty() {
            first_failure.unwrap_or(LoadStatus::ErrorMissingProgram)
        } else {
            LoadStatus::Success
        };
    }

    fn read_system_update_version(&self, decoder: &dyn ContentDecoder) -> u32 {
        let Some(update) = self.partition(XciPartition::Update) else {
            return 0;
        };
        let Ok(files) = update.files() else {
            return 0;
        };
        for file in files.into_iter().filter(is_nca) {
            let nca = Nca::new(file, None, decoder);
            if !nca.status().is_success()
                || nca.content_type() != Some(ContentType::Meta)
                || nca.title_id() != SYSTEM_UPDATE_TITLE_ID
            {
                continue;
            }
            let Some(section0) = nca.partitions().first() else {
                continue;
            };
            let Ok(meta_files) = section0.files() else {
                continue;
            };
            for meta in meta_files {
                if meta.extension().as_deref() != Some("cnmt") {
                    continue;
                }
                if let Ok(cnmt) = Cnmt::parse(&mut VfsReader::new(meta)) {
                    if let Some(rec) = cnmt.meta_records().first() {
                        return rec.title_version;
                    }
                }
            }
        }
        0
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    /// Status of the search for Program archives in the secure partition.
    pub fn program_nca_status(&self) -> LoadStatus {
        self.program_nca_status
    }

    pub fn header(&self) -> Option<&GamecardHeader> {
        self.header.as_ref()
    }

    /// 0 for a plain dump, [`KEY_AREA_SIZE`] when the key area is present.
    pub fn header_offset(&self) -> u64 {
        self.header_offset
    }

    /// 2 if the card carries a logo partition, 1 otherwise.
    pub fn format_version(&self) -> u8 {
        if self.partition(XciPartition::Logo).is_some() {
            0x2
        } else {
            0x1
        }
    }

    pub fn partition(&self, kind: XciPartition) -> Option<VirtualDir> {
        self.partitions[kind.index()].clone()
    }

    /// Every present partition, in [`XciPartition::ALL`] order.
    pub fn partitions(&self) -> Vec<VirtualDir> {
        self.partitions.iter().flatten().cloned().collect()
    }

    /// The partition's HFS0 image, undecoded.
    pub fn partition_raw(&self, kind: XciPartition) -> Option<VirtualFile> {
        self.partitions_raw[kind.index()].clone()
    }

    /// Title ids of the Program archives in the secure partition.
    pub fn program_title_ids(&self) -> &[u64] {
        &self.program_title_ids
    }

    /// The lowest program title id, or 0 if there is none.
    pub fn program_title_id(&self) -> u64 {
        self.program_title_ids.first().copied().unwrap_or(0)
    }

    pub fn system_update_title_id(&self) -> u64 {
        SYSTEM_UPDATE_TITLE_ID
    }

    /// Version of the bundled system update, or 0 if unknown.
    pub fn system_update_version(&self) -> u32 {
        self.system_update_version
    }

    pub fn base_file(&self) -> &VirtualFile {
        &self.file
    }

    /// Every `.nca` across all partitions in one flat directory. When two
    /// partitions hold the same name, the earlier partition wins.
    pub fn concatenated_pseudo_directory(&self) -> VirtualDir {
        let mut files = Vec::new();
        for dir in self.partitions.iter().flatten() {
            if let Ok(listing) = dir.files() {
                files.extend(listing.into_iter().filter(is_nca));
            }
        }
        VectorDirectory::read_only(self.file.name(), files, [])
    }
}

fn is_nca(file: &VirtualFile) -> bool {
    file.extension().is_some_and(|e| e.eq_ignore_ascii_case("nca"))
}

/// Serialize a plain (no key area) card image with the given root
/// partitions, each an HFS0 image.
pub fn build(partitions: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = vec![0u8; GAMECARD_HEADER_SIZE as usize];
    out[0x100..0x104].copy_from_slice(b"HEAD");
    out[0x108..0x10C].copy_from_slice(&u32::MAX.to_le_bytes());
    out[0x10D] = 0xFA;
    out[0x130..0x138].copy_from_slice(&GAMECARD_HEADER_SIZE.to_le_bytes());
    let root = hfs0::build(partitions);
    let header_size = 0x10 + partitions.len() as u64 * 0x40;
    out[0x138..0x140].copy_from_slice(&header_size.to_le_bytes());
    out.extend_from_slice(&root);
    out
}
