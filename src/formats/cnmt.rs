//! CNMT (Content Meta) - which content archives make up one title version.
//!
//! Found as the single `.cnmt` file inside the PartitionFS of a Meta-type
//! NCA, and as standalone blobs in a cache's overlay directory.
//!
//! ## Layout
//! ```text
//! [0x00] TitleId                         (u64 LE)
//! [0x08] TitleVersion                    (u32 LE)
//! [0x0C] TitleType                       (u8)
//! [0x0D] Reserved                        (u8)
//! [0x0E] TableOffset                     (u16 LE) - relative to 0x20
//! [0x10] ContentEntryCount               (u16 LE)
//! [0x12] MetaEntryCount                  (u16 LE)
//! [0x14] Attributes                      (u8)
//! [0x15] Reserved                        (2 bytes)
//! [0x17] IsCommitted                     (u8)
//! [0x18] RequiredDownloadSystemVersion   (u32 LE)
//! [0x1C] Reserved                        (4 bytes)
//! [0x20] OptionalHeader                  (0x10 bytes, Application/Patch/AddOnContent only)
//! [0x20 + TableOffset]
//!        ContentRecords                  (ContentEntryCount × 0x38 bytes)
//!        MetaRecords                     (MetaEntryCount × 0x10 bytes)
//! ```
//!
//! ## Content Record (0x38 bytes)
//! ```text
//! [0x00] Hash       (SHA-256, 0x20 bytes)
//! [0x20] ContentId  (0x10 bytes)
//! [0x30] Size       (u48 LE)
//! [0x36] Type       (u8)
//! [0x37] IdOffset   (u8)
//! ```
//!
//! ## Meta Record (0x10 bytes)
//! ```text
//! [0x00] TitleId     (u64 LE)
//! [0x08] Version     (u32 LE)
//! [0x0C] Type        (u8)
//! [0x0D] InstallType (u8)
//! [0x0E] Reserved    (2 bytes)
//! ```

use std::fmt;
use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::content::ContentId;
use crate::utils::{bytesa, le_u16, le_u32, le_u48, le_u64, put_le_u48, u8};
use crate::{Error, Result};

pub const CNMT_HEADER_SIZE: usize = 0x20;
pub const OPTIONAL_HEADER_SIZE: usize = 0x10;
pub const CONTENT_RECORD_SIZE: usize = 0x38;
pub const META_RECORD_SIZE: usize = 0x10;

/// Kind of title a CNMT describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TitleType {
    SystemProgram,
    SystemData,
    SystemUpdate,
    BootImagePackage,
    BootImagePackageSafe,
    Application,
    Patch,
    AddOnContent,
    Delta,
    Unknown(u8),
}

impl From<u8> for TitleType {
    fn from(v: u8) -> Self {
        match v {
            0x01 => Self::SystemProgram,
            0x02 => Self::SystemData,
            0x03 => Self::SystemUpdate,
            0x04 => Self::BootImagePackage,
            0x05 => Self::BootImagePackageSafe,
            0x80 => Self::Application,
            0x81 => Self::Patch,
            0x82 => Self::AddOnContent,
            0x83 => Self::Delta,
            x => Self::Unknown(x),
        }
    }
}

impl From<TitleType> for u8 {
    fn from(v: TitleType) -> Self {
        match v {
            TitleType::SystemProgram => 0x01,
            TitleType::SystemData => 0x02,
            TitleType::SystemUpdate => 0x03,
            TitleType::BootImagePackage => 0x04,
            TitleType::BootImagePackageSafe => 0x05,
            TitleType::Application => 0x80,
            TitleType::Patch => 0x81,
            TitleType::AddOnContent => 0x82,
            TitleType::Delta => 0x83,
            TitleType::Unknown(x) => x,
        }
    }
}

impl TitleType {
    /// Name used in overlay metadata file names.
    pub fn name(self) -> &'static str {
        match self {
            TitleType::SystemProgram => "SystemProgram",
            TitleType::SystemData => "SystemData",
            TitleType::SystemUpdate => "SystemUpdate",
            TitleType::BootImagePackage => "BootImagePackage",
            TitleType::BootImagePackageSafe => "BootImagePackageSafe",
            TitleType::Application => "Application",
            TitleType::Patch => "Patch",
            TitleType::AddOnContent => "AddOnContent",
            TitleType::Delta => "Delta",
            TitleType::Unknown(_) => "Unknown",
        }
    }

    /// Whether the 0x10-byte optional header follows the fixed header.
    pub fn has_optional_header(self) -> bool {
        matches!(
            self,
            TitleType::Application | TitleType::Patch | TitleType::AddOnContent
        )
    }
}

impl fmt::Display for TitleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// On-disk content record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentRecordType {
    Meta,
    Program,
    Data,
    Control,
    HtmlDocument,
    LegalInformation,
    DeltaFragment,
    Unknown(u8),
}

impl From<u8> for ContentRecordType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Meta,
            1 => Self::Program,
            2 => Self::Data,
            3 => Self::Control,
            4 => Self::HtmlDocument,
            5 => Self::LegalInformation,
            6 => Self::DeltaFragment,
            x => Self::Unknown(x),
        }
    }
}

impl From<ContentRecordType> for u8 {
    fn from(v: ContentRecordType) -> Self {
        match v {
            ContentRecordType::Meta => 0,
            ContentRecordType::Program => 1,
            ContentRecordType::Data => 2,
            ContentRecordType::Control => 3,
            ContentRecordType::HtmlDocument => 4,
            ContentRecordType::LegalInformation => 5,
            ContentRecordType::DeltaFragment => 6,
            ContentRecordType::Unknown(x) => x,
        }
    }
}

impl ContentRecordType {
    /// Record types a cache addresses when removing a title.
    pub const REMOVABLE: [ContentRecordType; 6] = [
        ContentRecordType::Meta,
        ContentRecordType::Program,
        ContentRecordType::Data,
        ContentRecordType::Control,
        ContentRecordType::HtmlDocument,
        ContentRecordType::LegalInformation,
    ];
}

/// One physical archive belonging to a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRecord {
    pub hash: [u8; 0x20],
    pub content_id: ContentId,
    /// 48-bit on disk.
    pub size: u64,
    pub record_type: ContentRecordType,
    pub id_offset: u8,
}

impl ContentRecord {
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let hash = bytesa::<0x20>(r)?;
        let content_id = ContentId::new(bytesa::<0x10>(r)?);
        let size = le_u48(r)?;
        let record_type = ContentRecordType::from(u8(r)?);
        let id_offset = u8(r)?;
        Ok(Self {
            hash,
            content_id,
            size,
            record_type,
            id_offset,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.hash);
        out.extend_from_slice(self.content_id.as_bytes());
        put_le_u48(out, self.size);
        out.push(u8::from(self.record_type));
        out.push(self.id_offset);
    }
}

/// Dependency entry (used by system updates and patches).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaRecord {
    pub title_id: u64,
    pub title_version: u32,
    pub title_type: TitleType,
    pub install_type: u8,
    pub reserved: [u8; 2],
}

impl MetaRecord {
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        Ok(Self {
            title_id: le_u64(r)?,
            title_version: le_u32(r)?,
            title_type: TitleType::from(u8(r)?),
            install_type: u8(r)?,
            reserved: bytesa::<2>(r)?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.title_id.to_le_bytes());
        out.extend_from_slice(&self.title_version.to_le_bytes());
        out.push(u8::from(self.title_type));
        out.push(self.install_type);
        out.extend_from_slice(&self.reserved);
    }
}

/// Fixed 0x20-byte header.
///
/// Reserved bytes are kept so serialization is byte exact. The entry
/// counts mirror the record lists of the owning [`Cnmt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CnmtHeader {
    pub title_id: u64,
    pub title_version: u32,
    pub title_type: TitleType,
    pub reserved: u8,
    pub table_offset: u16,
    pub number_content_entries: u16,
    pub number_meta_entries: u16,
    pub attributes: u8,
    pub reserved2: [u8; 2],
    pub is_committed: u8,
    pub required_download_system_version: u32,
    pub reserved3: [u8; 4],
}

impl CnmtHeader {
    /// A header with the given identity and a 0x10-byte table offset
    /// (room for the optional header), everything else zero.
    pub fn new(title_id: u64, title_version: u32, title_type: TitleType) -> Self {
        Self {
            title_id,
            title_version,
            title_type,
            reserved: 0,
            table_offset: OPTIONAL_HEADER_SIZE as u16,
            number_content_entries: 0,
            number_meta_entries: 0,
            attributes: 0,
            reserved2: [0; 2],
            is_committed: 0,
            required_download_system_version: 0,
            reserved3: [0; 4],
        }
    }

    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        Ok(Self {
            title_id: le_u64(r)?,
            title_version: le_u32(r)?,
            title_type: TitleType::from(u8(r)?),
            reserved: u8(r)?,
            table_offset: le_u16(r)?,
            number_content_entries: le_u16(r)?,
            number_meta_entries: le_u16(r)?,
            attributes: u8(r)?,
            reserved2: bytesa::<2>(r)?,
            is_committed: u8(r)?,
            required_download_system_version: le_u32(r)?,
            reserved3: bytesa::<4>(r)?,
        })
    }

    fn write(&self, out: &mut [u8]) {
        out[0x00..0x08].copy_from_slice(&self.title_id.to_le_bytes());
        out[0x08..0x0C].copy_from_slice(&self.title_version.to_le_bytes());
        out[0x0C] = u8::from(self.title_type);
        out[0x0D] = self.reserved;
        out[0x0E..0x10].copy_from_slice(&self.table_offset.to_le_bytes());
        out[0x10..0x12].copy_from_slice(&self.number_content_entries.to_le_bytes());
        out[0x12..0x14].copy_from_slice(&self.number_meta_entries.to_le_bytes());
        out[0x14] = self.attributes;
        out[0x15..0x17].copy_from_slice(&self.reserved2);
        out[0x17] = self.is_committed;
        out[0x18..0x1C].copy_from_slice(&self.required_download_system_version.to_le_bytes());
        out[0x1C..0x20].copy_from_slice(&self.reserved3);
    }
}

/// Extended header of Application, Patch and AddOnContent metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionalHeader {
    /// Application: patch id. Patch and AddOnContent: owning application id.
    pub title_id: u64,
    /// Required system or application version.
    pub minimum_version: u64,
}

/// A parsed content meta.
///
/// At most one content record per [`ContentRecordType`] is allowed, except
/// for `DeltaFragment` records, which a patch carries many of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cnmt {
    header: CnmtHeader,
    opt_header: OptionalHeader,
    content_records: Vec<ContentRecord>,
    meta_records: Vec<MetaRecord>,
}

impl Cnmt {
    /// Assemble a CNMT from parts. Entry counts in `header` are replaced by
    /// the lengths of the record lists.
    pub fn new(
        mut header: CnmtHeader,
        opt_header: OptionalHeader,
        content_records: Vec<ContentRecord>,
        meta_records: Vec<MetaRecord>,
    ) -> Result<Self> {
        check_unique_types(&content_records)?;
        check_table_offset(&header)?;
        header.number_content_entries = count(content_records.len())?;
        header.number_meta_entries = count(meta_records.len())?;
        Ok(Self {
            header,
            opt_header,
            content_records,
            meta_records,
        })
    }

    /// Parse from a reader positioned at the start of the header.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;
        let header = CnmtHeader::parse(r)?;
        check_table_offset(&header)?;

        let opt_header = if header.title_type.has_optional_header() {
            OptionalHeader {
                title_id: le_u64(r)?,
                minimum_version: le_u64(r)?,
            }
        } else {
            OptionalHeader::default()
        };

        r.seek(SeekFrom::Start(
            base + CNMT_HEADER_SIZE as u64 + header.table_offset as u64,
        ))?;

        let mut content_records = Vec::with_capacity(header.number_content_entries as usize);
        for _ in 0..header.number_content_entries {
            content_records.push(ContentRecord::parse(r)?);
        }
        let mut meta_records = Vec::with_capacity(header.number_meta_entries as usize);
        for _ in 0..header.number_meta_entries {
            meta_records.push(MetaRecord::parse(r)?);
        }

        check_unique_types(&content_records)?;

        Ok(Self {
            header,
            opt_header,
            content_records,
            meta_records,
        })
    }

    /// Parse from an in-memory blob.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::parse(&mut Cursor::new(data))
    }

    /// Serialize to the on-disk layout. Record order is preserved.
    pub fn serialize(&self) -> Vec<u8> {
        let has_opt = self.header.title_type.has_optional_header();
        let fixed = CNMT_HEADER_SIZE + if has_opt { OPTIONAL_HEADER_SIZE } else { 0 };
        let table = CNMT_HEADER_SIZE + self.header.table_offset as usize;

        let mut out = vec![0u8; fixed.max(table)];
        let mut header = self.header;
        header.number_content_entries = self.content_records.len() as u16;
        header.number_meta_entries = self.meta_records.len() as u16;
        header.write(&mut out[..CNMT_HEADER_SIZE]);
        if has_opt {
            out[0x20..0x28].copy_from_slice(&self.opt_header.title_id.to_le_bytes());
            out[0x28..0x30].copy_from_slice(&self.opt_header.minimum_version.to_le_bytes());
        }

        out.truncate(table);
        for rec in &self.content_records {
            rec.write(&mut out);
        }
        for rec in &self.meta_records {
            rec.write(&mut out);
        }
        out
    }

    pub fn header(&self) -> &CnmtHeader {
        &self.header
    }

    pub fn optional_header(&self) -> &OptionalHeader {
        &self.opt_header
    }

    pub fn title_id(&self) -> u64 {
        self.header.title_id
    }

    pub fn title_version(&self) -> u32 {
        self.header.title_version
    }

    pub fn title_type(&self) -> TitleType {
        self.header.title_type
    }

    pub fn content_records(&self) -> &[ContentRecord] {
        &self.content_records
    }

    pub fn meta_records(&self) -> &[MetaRecord] {
        &self.meta_records
    }

    /// First record of the given type.
    pub fn record(&self, record_type: ContentRecordType) -> Option<&ContentRecord> {
        self.content_records
            .iter()
            .find(|r| r.record_type == record_type)
    }

    /// Merge `other`'s records into `self`.
    ///
    /// A content record is added when no record of its type exists and
    /// replaces the existing one when they differ. `DeltaFragment` records
    /// are keyed by content id instead of type. Meta records are keyed by
    /// title id. Returns `true` if anything was added or replaced.
    pub fn union_records(&mut self, other: &Cnmt) -> bool {
        let mut changed = false;

        for rec in &other.content_records {
            let slot = if rec.record_type == ContentRecordType::DeltaFragment {
                self.content_records
                    .iter_mut()
                    .find(|r| r.record_type == rec.record_type && r.content_id == rec.content_id)
            } else {
                self.content_records
                    .iter_mut()
                    .find(|r| r.record_type == rec.record_type)
            };
            match slot {
                None => {
                    self.content_records.push(*rec);
                    changed = true;
                }
                Some(existing) if existing != rec => {
                    *existing = *rec;
                    changed = true;
                }
                Some(_) => {}
            }
        }

        for rec in &other.meta_records {
            match self
                .meta_records
                .iter_mut()
                .find(|r| r.title_id == rec.title_id)
            {
                None => {
                    self.meta_records.push(*rec);
                    changed = true;
                }
                Some(existing) if existing != rec => {
                    *existing = *rec;
                    changed = true;
                }
                Some(_) => {}
            }
        }

        self.header.number_content_entries = self.content_records.len() as u16;
        self.header.number_meta_entries = self.meta_records.len() as u16;
        changed
    }
}

/// File name of a standalone CNMT blob in an overlay directory, e.g.
/// `Application_0100000000010000.cnmt`.
pub fn overlay_file_name(title_type: TitleType, title_id: u64) -> String {
    format!("{}_{:016x}.cnmt", title_type.name(), title_id)
}

fn check_unique_types(records: &[ContentRecord]) -> Result<()> {
    for (i, rec) in records.iter().enumerate() {
        if rec.record_type == ContentRecordType::DeltaFragment {
            continue;
        }
        if records[..i].iter().any(|r| r.record_type == rec.record_type) {
            return Err(Error::Parse("duplicate content record type"));
        }
    }
    Ok(())
}

/// The record table must not overlap the optional header.
fn check_table_offset(header: &CnmtHeader) -> Result<()> {
    if header.title_type.has_optional_header()
        && (header.table_offset as usize) < OPTIONAL_HEADER_SIZE
    {
        return Err(Error::Parse("record table overlaps optional header"));
    }
    Ok(())
}

fn count(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::Parse("too many records"))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const TID: u64 = 0x0100_0000_0001_0000;

    fn record(kind: ContentRecordType, id_byte: u8) -> ContentRecord {
        ContentRecord {
            hash: [id_byte; 0x20],
            content_id: ContentId::new([id_byte; 0x10]),
            size: 0x1234_5678_9A,
            record_type: kind,
            id_offset: 0,
        }
    }

    fn cnmt(title_type: TitleType, records: Vec<ContentRecord>) -> Cnmt {
        Cnmt::new(
            CnmtHeader::new(TID, 0x10000, title_type),
            OptionalHeader {
                title_id: TID + 0x800,
                minimum_version: 0,
            },
            records,
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn serialize_then_parse_is_identity() {
        let mut original = cnmt(
            TitleType::Application,
            vec![
                record(ContentRecordType::Program, 1),
                record(ContentRecordType::Control, 2),
                record(ContentRecordType::LegalInformation, 3),
            ],
        );
        original.meta_records.push(MetaRecord {
            title_id: 0x0100_0000_0000_0816,
            title_version: 0x0C00_0000,
            title_type: TitleType::SystemUpdate,
            install_type: 0,
            reserved: [0; 2],
        });
        original.header.number_meta_entries = 1;
        original.header.is_committed = 1;
        original.header.reserved3 = [1, 2, 3, 4];

        let bytes = original.serialize();
        assert_eq!(bytes.len(), 0x30 + 3 * CONTENT_RECORD_SIZE + META_RECORD_SIZE);
        let parsed = Cnmt::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.serialize(), bytes);
    }

    #[test]
    fn system_titles_have_no_optional_header() {
        let mut header = CnmtHeader::new(0x0100_0000_0000_0809, 0, TitleType::SystemData);
        header.table_offset = 0;
        let meta = Cnmt::new(
            header,
            OptionalHeader::default(),
            vec![record(ContentRecordType::Data, 7)],
            Vec::new(),
        )
        .unwrap();
        let bytes = meta.serialize();
        assert_eq!(bytes.len(), CNMT_HEADER_SIZE + CONTENT_RECORD_SIZE);
        assert_eq!(&bytes[0x20..0x30], &[7u8; 0x10]);
        assert_eq!(Cnmt::from_bytes(&bytes).unwrap(), meta);
    }

    #[rstest]
    #[case(TitleType::Application, "Application_0100000000010000.cnmt")]
    #[case(TitleType::Patch, "Patch_0100000000010000.cnmt")]
    #[case(TitleType::AddOnContent, "AddOnContent_0100000000010000.cnmt")]
    #[case(TitleType::SystemData, "SystemData_0100000000010000.cnmt")]
    fn overlay_names(#[case] kind: TitleType, #[case] expected: &str) {
        assert_eq!(overlay_file_name(kind, TID), expected);
    }

    #[test]
    fn union_of_disjoint_types_adds_everything() {
        let mut a = cnmt(TitleType::Application, vec![record(ContentRecordType::Program, 1)]);
        let b = cnmt(TitleType::Application, vec![record(ContentRecordType::Control, 2)]);
        assert!(a.union_records(&b));
        assert_eq!(a.content_records().len(), 2);
        assert!(a.record(ContentRecordType::Control).is_some());
        assert_eq!(a.header().number_content_entries, 2);
    }

    #[test]
    fn union_with_self_changes_nothing() {
        let mut a = cnmt(
            TitleType::Application,
            vec![
                record(ContentRecordType::Program, 1),
                record(ContentRecordType::Data, 2),
            ],
        );
        let copy = a.clone();
        assert!(!a.union_records(&copy));
        assert_eq!(a, copy);
    }

    #[test]
    fn union_replaces_differing_record_of_same_type() {
        let mut a = cnmt(TitleType::Application, vec![record(ContentRecordType::Program, 1)]);
        let b = cnmt(TitleType::Application, vec![record(ContentRecordType::Program, 9)]);
        assert!(a.union_records(&b));
        assert_eq!(a.content_records().len(), 1);
        assert_eq!(
            a.record(ContentRecordType::Program).unwrap().content_id,
            ContentId::new([9; 0x10])
        );
    }

    #[test]
    fn delta_fragments_accumulate() {
        let mut a = cnmt(TitleType::Patch, vec![record(ContentRecordType::DeltaFragment, 1)]);
        let b = cnmt(TitleType::Patch, vec![record(ContentRecordType::DeltaFragment, 2)]);
        assert!(a.union_records(&b));
        assert_eq!(a.content_records().len(), 2);
    }

    #[test]
    fn duplicate_record_types_are_rejected() {
        let result = Cnmt::new(
            CnmtHeader::new(TID, 0, TitleType::Application),
            OptionalHeader::default(),
            vec![
                record(ContentRecordType::Program, 1),
                record(ContentRecordType::Program, 2),
            ],
            Vec::new(),
        );
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[rstest]
    #[case(TitleType::Application, 0, false)]
    #[case(TitleType::Patch, 0x08, false)]
    #[case(TitleType::AddOnContent, 0x0F, false)]
    #[case(TitleType::Application, 0x10, true)]
    #[case(TitleType::SystemData, 0, true)]
    fn table_offset_must_clear_optional_header(
        #[case] kind: TitleType,
        #[case] table_offset: u16,
        #[case] accepted: bool,
    ) {
        let mut header = CnmtHeader::new(TID, 0, kind);
        header.table_offset = table_offset;
        let result = Cnmt::new(
            header,
            OptionalHeader::default(),
            vec![record(ContentRecordType::Data, 1)],
            Vec::new(),
        );
        assert_eq!(result.is_ok(), accepted);
        if !accepted {
            assert!(matches!(result, Err(Error::Parse(_))));
        }
    }

    #[test]
    fn overlapping_table_offset_is_not_parsed() {
        let mut bytes = cnmt(TitleType::Application, vec![record(ContentRecordType::Program, 1)])
            .serialize();
        bytes[0x0E..0x10].copy_from_slice(&0u16.to_le_bytes());
        let err = Cnmt::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn truncated_record_table_is_eof() {
        let bytes = cnmt(TitleType::Application, vec![record(ContentRecordType::Program, 1)])
            .serialize();
        let err = Cnmt::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof));
    }
}
