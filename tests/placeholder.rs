//! Staging archives in a PlaceholderCache and committing them.

mod common;

use std::sync::Arc;

use common::{TITLE_ID, memory_cache, program_image};
use hakcache::content::{ContentId, ContentProvider, PlaceholderCache};
use hakcache::decoder::PlaintextDecoder;
use hakcache::formats::nca::{ContentType, NcaBuilder};
use hakcache::vfs::{RealDirectory, VfsFile};
use hakcache::{Error, InstallResult};
use tempfile::TempDir;

fn stage(cache: &PlaceholderCache, image: &[u8]) -> ContentId {
    let id = PlaceholderCache::generate();
    cache.create(&id, image.len() as u64).unwrap();
    for (i, chunk) in image.chunks(0x300).enumerate() {
        cache.write(&id, (i * 0x300) as u64, chunk).unwrap();
    }
    id
}

#[test]
fn staged_archive_is_committed_and_dropped() {
    let temp = TempDir::new().unwrap();
    let staging = PlaceholderCache::new(
        RealDirectory::create(temp.path().join("placehld")).unwrap(),
        Arc::new(PlaintextDecoder),
    );
    let registered = memory_cache();
    let image = program_image(TITLE_ID, b"streamed in pieces");

    let placeholder = stage(&staging, &image);
    assert_eq!(staging.size(&placeholder).unwrap(), image.len() as u64);
    assert_eq!(staging.list().unwrap(), vec![placeholder]);

    let install: ContentId = "1234567890abcdef1234567890abcdef".parse().unwrap();
    let res = staging.register(&registered, &placeholder, &install).unwrap();
    assert_eq!(res, InstallResult::Success);

    assert!(!staging.exists(&placeholder));
    assert!(staging.list().unwrap().is_empty());
    let stored = registered.file_at_id(&install).unwrap();
    assert_eq!(stored.read_all().unwrap(), image);
}

#[test]
fn failed_register_keeps_the_placeholder() {
    let staging = PlaceholderCache::new(
        hakcache::vfs::VectorDirectory::new("placehld"),
        Arc::new(PlaintextDecoder),
    );
    let registered = memory_cache();
    let install: ContentId = "ffeeddccbbaa99887766554433221100".parse().unwrap();

    let first = stage(&staging, b"first");
    assert!(staging.register(&registered, &first, &install).unwrap().is_success());

    let second = stage(&staging, b"second");
    assert_eq!(
        staging.register(&registered, &second, &install).unwrap(),
        InstallResult::ErrorAlreadyExists
    );
    assert!(staging.exists(&second));
    assert_eq!(
        registered.file_at_id(&install).unwrap().read_all().unwrap(),
        b"first"
    );
    // A raw commit carries no metadata, so nothing is listed.
    assert!(registered.list_entries().is_empty());
}

#[test]
fn registering_an_unknown_placeholder_fails() {
    let staging = PlaceholderCache::new(
        hakcache::vfs::VectorDirectory::new("placehld"),
        Arc::new(PlaintextDecoder),
    );
    let registered = memory_cache();
    let missing = PlaceholderCache::generate();
    assert!(matches!(
        staging.register(&registered, &missing, &missing),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn rights_id_is_read_from_the_staged_header() {
    let staging = PlaceholderCache::new(
        hakcache::vfs::VectorDirectory::new("placehld"),
        Arc::new(PlaintextDecoder),
    );
    let image = NcaBuilder::new(ContentType::Program, TITLE_ID)
        .rights_id([0x11; 0x10])
        .romfs(b"data".to_vec())
        .build();
    let id = stage(&staging, &image);
    assert_eq!(staging.rights_id(&id), Some([0x11; 0x10]));
}
