//! Fixture builders shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use hakcache::content::{ContentId, RegisteredCache};
use hakcache::decoder::PlaintextDecoder;
use hakcache::formats::cnmt::{
    Cnmt, CnmtHeader, ContentRecord, ContentRecordType, OptionalHeader, TitleType,
};
use hakcache::formats::nca::{ContentType, Nca, NcaBuilder};
use hakcache::formats::pfs0;
use hakcache::vfs::{VectorDirectory, VectorFile, VirtualDir, VirtualFile};

pub const TITLE_ID: u64 = 0x0100_0000_0001_0000;
pub const DIGEST_PREFIX: usize = 0x10_0000;

pub fn program_image(title_id: u64, payload: &[u8]) -> Vec<u8> {
    NcaBuilder::new(ContentType::Program, title_id)
        .partition(pfs0::build(&[("main", payload), ("main.npdm", b"npdm")]))
        .romfs(payload.to_vec())
        .build()
}

pub fn control_image(title_id: u64) -> Vec<u8> {
    NcaBuilder::new(ContentType::Control, title_id)
        .romfs(b"control.nacp".to_vec())
        .build()
}

pub fn meta_image(cnmt: &Cnmt) -> Vec<u8> {
    let name = format!("{}_{:016x}.cnmt", cnmt.title_type().name(), cnmt.title_id());
    NcaBuilder::new(ContentType::Meta, cnmt.title_id())
        .partition(pfs0::build(&[(&name, &cnmt.serialize())]))
        .build()
}

pub fn open(name: &str, image: Vec<u8>) -> Nca {
    Nca::new(VectorFile::new(name, image), None, &PlaintextDecoder)
}

pub fn memory_cache() -> RegisteredCache {
    RegisteredCache::new(VectorDirectory::new("registered"), Arc::new(PlaintextDecoder))
        .expect("empty directory indexes")
}

fn record(image: &[u8], record_type: ContentRecordType) -> ContentRecord {
    let file: VirtualFile = VectorFile::new("record", image.to_vec());
    let (hash, content_id) = ContentId::derive(&file, DIGEST_PREFIX).expect("in-memory read");
    ContentRecord {
        hash,
        content_id,
        size: image.len() as u64,
        record_type,
        id_offset: 0,
    }
}

/// An NSP-style package: one Meta archive plus a program and a control
/// archive, each named by its content id.
pub struct Package {
    pub title_id: u64,
    pub version: u32,
    pub cnmt: Cnmt,
    pub meta_id: ContentId,
    pub files: Vec<(String, Vec<u8>)>,
}

impl Package {
    pub fn new(title_id: u64, version: u32, payload: &[u8]) -> Self {
        let program = program_image(title_id, payload);
        let control = control_image(title_id);
        let records = vec![
            record(&program, ContentRecordType::Program),
            record(&control, ContentRecordType::Control),
        ];
        let cnmt = Cnmt::new(
            CnmtHeader::new(title_id, version, TitleType::Application),
            OptionalHeader {
                title_id: title_id + 0x800,
                minimum_version: 0,
            },
            records.clone(),
            Vec::new(),
        )
        .expect("distinct record types");
        let meta = meta_image(&cnmt);
        let meta_id = record(&meta, ContentRecordType::Meta).content_id;

        let files = vec![
            (format!("{meta_id}.cnmt.nca"), meta),
            (format!("{}.nca", records[0].content_id), program),
            (format!("{}.nca", records[1].content_id), control),
        ];
        Self {
            title_id,
            version,
            cnmt,
            meta_id,
            files,
        }
    }

    pub fn content_id(&self, record_type: ContentRecordType) -> ContentId {
        self.cnmt
            .record(record_type)
            .map(|r| r.content_id)
            .expect("package has this record")
    }

    pub fn directory(&self) -> VirtualDir {
        let dir = VectorDirectory::new("package");
        for (name, bytes) in &self.files {
            dir.add_file(VectorFile::new(name.clone(), bytes.clone()));
        }
        dir
    }

    /// The package files as an HFS0 partition image.
    pub fn hfs0(&self) -> Vec<u8> {
        let entries: Vec<(&str, &[u8])> = self
            .files
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
            .collect();
        hakcache::formats::hfs0::build(&entries)
    }
}
