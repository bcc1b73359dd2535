//! A content store backed by one directory tree.
//!
//! The directory is the durable state. The in-memory [`MetadataIndex`] is
//! rebuilt from scratch on every refresh and published with a single
//! pointer swap, so readers see either the old index or the new one.
//!
//! ```text
//! <root>/
//!   000000AB/ab01...66.nca       installed archives (any Layout)
//!   cd23...88.cnmt.nca
//!   ef45...99.nca/00, 01, ...    archive split into parts
//!   overlay_meta/
//!     Application_0100000000010000.cnmt
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{debug, error, info, warn};

use super::layout::{self, Layout};
use super::provider::{
    ContentProvider, ContentProviderEntry, EntryFilter, ParsingFunction, identity_parser,
};
use super::ContentId;
use crate::config::CacheOptions;
use crate::decoder::ContentDecoder;
use crate::error::InstallResult;
use crate::formats::cnmt::{
    Cnmt, CnmtHeader, ContentRecord, ContentRecordType, OptionalHeader, TitleType,
    overlay_file_name,
};
use crate::formats::nca::{ContentType, Nca};
use crate::formats::xci::{Xci, XciPartition};
use crate::vfs::{VfsCopyFn, VfsDirectory, VfsFile, VfsReader, VirtualDir, VirtualFile};
use crate::Result;

/// Title metadata known to a cache.
#[derive(Debug, Default)]
pub struct MetadataIndex {
    /// CNMTs read from Meta archives on disk.
    pub meta: BTreeMap<u64, Cnmt>,
    /// Content id of the Meta archive each entry of `meta` came from.
    pub meta_id: BTreeMap<u64, ContentId>,
    /// CNMTs synthesized by installs and stored as standalone blobs.
    pub overlay_meta: BTreeMap<u64, Cnmt>,
}

impl MetadataIndex {
    /// Content id of `record_type` for `title_id`. Meta lookups prefer the
    /// physical Meta archive; otherwise the overlay wins over disk metadata.
    pub fn content_id(&self, title_id: u64, record_type: ContentRecordType) -> Option<ContentId> {
        if record_type == ContentRecordType::Meta {
            if let Some(id) = self.meta_id.get(&title_id) {
                return Some(*id);
            }
        }
        record_in(&self.overlay_meta, title_id, record_type)
            .or_else(|| record_in(&self.meta, title_id, record_type))
    }
}

fn record_in(
    map: &BTreeMap<u64, Cnmt>,
    title_id: u64,
    record_type: ContentRecordType,
) -> Option<ContentId> {
    map.get(&title_id)?
        .record(record_type)
        .map(|r| r.content_id)
}

/// Directory-backed content store.
pub struct RegisteredCache {
    dir: VirtualDir,
    parser: ParsingFunction,
    decoder: Arc<dyn ContentDecoder>,
    options: CacheOptions,
    index: RwLock<Arc<MetadataIndex>>,
    /// Serializes installs, removals and refreshes.
    mutation: Mutex<()>,
}

impl fmt::Debug for RegisteredCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredCache")
            .field("dir", &self.dir.name())
            .field("decoder", &self.decoder)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl RegisteredCache {
    /// Open `dir` with default options and index it.
    pub fn new(dir: VirtualDir, decoder: Arc<dyn ContentDecoder>) -> Result<Self> {
        Self::with_parser(dir, decoder, identity_parser(), CacheOptions::default())
    }

    /// Open `dir`, passing every located archive through `parser`.
    pub fn with_parser(
        dir: VirtualDir,
        decoder: Arc<dyn ContentDecoder>,
        parser: ParsingFunction,
        options: CacheOptions,
    ) -> Result<Self> {
        options.validate()?;
        let cache = Self {
            dir,
            parser,
            decoder,
            options,
            index: RwLock::default(),
            mutation: Mutex::new(()),
        };
        cache.rebuild()?;
        Ok(cache)
    }

    pub fn dir(&self) -> &VirtualDir {
        &self.dir
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn decoder(&self) -> &Arc<dyn ContentDecoder> {
        &self.decoder
    }

    /// Snapshot of the current index.
    pub fn index(&self) -> Arc<MetadataIndex> {
        self.index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutation.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The archive stored under `id`, in any layout.
    pub fn file_at_id(&self, id: &ContentId) -> Option<VirtualFile> {
        layout::locate(&self.dir, id)
    }

    /// Open the entry as an archive with this cache's decoder.
    pub fn open_entry(&self, title_id: u64, record_type: ContentRecordType) -> Option<Nca> {
        self.entry(title_id, record_type, self.decoder.as_ref())
    }

    fn rebuild(&self) -> Result<()> {
        let ids = layout::scan(&self.dir)?;
        let mut index = MetadataIndex::default();

        for id in &ids {
            let Some(file) = layout::locate(&self.dir, id) else {
                continue;
            };
            let nca = Nca::new((self.parser)(file, id), None, self.decoder.as_ref());
            if !nca.status().is_success() || nca.content_type() != Some(ContentType::Meta) {
                continue;
            }
            match read_meta_nca(&nca) {
                Ok(Some(cnmt)) => {
                    index.meta_id.insert(nca.title_id(), *id);
                    index.meta.insert(nca.title_id(), cnmt);
                }
                Ok(None) => {
                    warn!(content_id = %id, "meta archive has no cnmt, skipping");
                }
                Err(e) => {
                    warn!(content_id = %id, error = %e, "unparsable meta archive, skipping");
                }
            }
        }

        if let Some(overlay) = self.dir.subdirectory(&self.options.overlay_dir_name) {
            for file in overlay.files()? {
                if file.extension().as_deref() != Some("cnmt") {
                    continue;
                }
                match Cnmt::parse(&mut VfsReader::new(file.clone())) {
                    Ok(cnmt) => {
                        index.overlay_meta.insert(cnmt.title_id(), cnmt);
                    }
                    Err(e) => {
                        warn!(file = %file.name(), error = %e, "unparsable overlay metadata, skipping");
                    }
                }
            }
        }

        debug!(
            dir = %self.dir.name(),
            archives = ids.len(),
            meta = index.meta.len(),
            overlay = index.overlay_meta.len(),
            "rebuilt content index"
        );
        *self.index.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(index);
        Ok(())
    }

    fn refresh_after_write(&self) {
        if let Err(e) = self.rebuild() {
            warn!(dir = %self.dir.name(), error = %e, "refresh after write failed");
        }
    }

    /// Install a bare archive with no enclosing metadata.
    ///
    /// A single-record CNMT of `title_type` is written (or merged) into the
    /// overlay directory, then the archive is copied under its derived id.
    pub fn install_entry(
        &self,
        nca: &Nca,
        title_type: TitleType,
        overwrite_if_exists: bool,
        copy: VfsCopyFn<'_>,
    ) -> InstallResult {
        let Some(record_type) = nca.record_type() else {
            error!(name = %nca.name(), "archive has no installable content type");
            return InstallResult::ErrorMetaFailed;
        };
        let file = nca.base_file();
        let (hash, content_id) = match ContentId::derive(file, self.options.digest_prefix_size) {
            Ok(derived) => derived,
            Err(e) => {
                error!(name = %nca.name(), error = %e, "failed to read archive for content id");
                return InstallResult::ErrorMetaFailed;
            }
        };
        let record = ContentRecord {
            hash,
            content_id,
            size: file.size(),
            record_type,
            id_offset: 0,
        };
        let header = CnmtHeader::new(nca.title_id(), 0, title_type);

        let _guard = self.lock();
        self.install_with_meta(file, header, record, overwrite_if_exists, copy)
    }

    /// Install one archive of an existing multi-archive title, keeping the
    /// caller's version, title type and content record.
    pub fn install_entry_with_base(
        &self,
        nca: &Nca,
        base_header: &CnmtHeader,
        base_record: &ContentRecord,
        overwrite_if_exists: bool,
        copy: VfsCopyFn<'_>,
    ) -> InstallResult {
        let header = CnmtHeader::new(
            nca.title_id(),
            base_header.title_version,
            base_header.title_type,
        );
        let _guard = self.lock();
        self.install_with_meta(
            nca.base_file(),
            header,
            *base_record,
            overwrite_if_exists,
            copy,
        )
    }

    fn install_with_meta(
        &self,
        file: &VirtualFile,
        header: CnmtHeader,
        record: ContentRecord,
        overwrite_if_exists: bool,
        copy: VfsCopyFn<'_>,
    ) -> InstallResult {
        let cnmt = match Cnmt::new(header, OptionalHeader::default(), vec![record], Vec::new()) {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "failed to build metadata");
                return InstallResult::ErrorMetaFailed;
            }
        };
        if !self.write_overlay_meta(&cnmt) {
            return InstallResult::ErrorMetaFailed;
        }
        self.install_file(file, copy, overwrite_if_exists, Some(record.content_id))
    }

    /// Write `cnmt` into the overlay, merging with an existing blob for the
    /// same title, then refresh. True if the title is indexed afterwards.
    fn write_overlay_meta(&self, cnmt: &Cnmt) -> bool {
        let overlay = match self.dir.create_subdirectory(&self.options.overlay_dir_name) {
            Ok(d) => d,
            Err(e) => {
                error!(error = %e, "failed to create overlay directory");
                return false;
            }
        };
        let name = overlay_file_name(cnmt.title_type(), cnmt.title_id());

        let blob = match overlay.file(&name) {
            None => Some(cnmt.serialize()),
            Some(existing) => match Cnmt::parse(&mut VfsReader::new(existing)) {
                Ok(mut merged) => merged.union_records(cnmt).then(|| merged.serialize()),
                Err(e) => {
                    warn!(file = %name, error = %e, "replacing unreadable overlay metadata");
                    Some(cnmt.serialize())
                }
            },
        };

        if let Some(blob) = blob {
            if let Err(e) = write_blob(&overlay, &name, &blob) {
                error!(file = %name, error = %e, "failed to write overlay metadata");
                return false;
            }
        }

        if let Err(e) = self.rebuild() {
            error!(error = %e, "refresh after metadata write failed");
            return false;
        }
        self.index()
            .overlay_meta
            .get(&cnmt.title_id())
            .is_some_and(|c| c.title_type() == cnmt.title_type())
    }

    /// Copy `file` into the cache under `override_id`, or under an id
    /// derived from its leading bytes.
    pub fn raw_install_nca(
        &self,
        file: &VirtualFile,
        copy: VfsCopyFn<'_>,
        overwrite_if_exists: bool,
        override_id: Option<ContentId>,
    ) -> InstallResult {
        let _guard = self.lock();
        self.install_file(file, copy, overwrite_if_exists, override_id)
    }

    fn install_file(
        &self,
        file: &VirtualFile,
        copy: VfsCopyFn<'_>,
        overwrite_if_exists: bool,
        override_id: Option<ContentId>,
    ) -> InstallResult {
        let id = match override_id {
            Some(id) => id,
            None => match ContentId::derive(file, self.options.digest_prefix_size) {
                Ok((_, id)) => id,
                Err(e) => {
                    error!(name = %file.name(), error = %e, "failed to read archive for content id");
                    return InstallResult::ErrorCopyFailed;
                }
            },
        };

        if self.file_at_id(&id).is_some() {
            if !overwrite_if_exists {
                warn!(content_id = %id, "archive already installed, skipping");
                return InstallResult::ErrorAlreadyExists;
            }
            warn!(content_id = %id, "overwriting existing archive");
            self.delete_archive(&id);
        }

        let out = match self.dir.create_file_relative(&Layout::INSTALL.path_for(&id)) {
            Ok(f) => f,
            Err(e) => {
                error!(content_id = %id, error = %e, "failed to create archive file");
                return InstallResult::ErrorCopyFailed;
            }
        };
        if !copy(file, &out, self.options.copy_block_size) {
            error!(content_id = %id, "copy failed");
            return InstallResult::ErrorCopyFailed;
        }

        info!(content_id = %id, size = file.size(), "installed archive");
        self.refresh_after_write();
        InstallResult::Success
    }

    /// Delete `id` under every layout it exists in. Best effort.
    fn delete_archive(&self, id: &ContentId) -> bool {
        let mut removed = false;
        for layout in layout::existing_layouts(&self.dir, id) {
            let path = layout.path_for(id);
            let result = if self.dir.file_relative(&path).is_some() {
                self.dir.delete_file_relative(&path)
            } else {
                self.dir.delete_directory_relative(&path)
            };
            match result {
                Ok(deleted) => removed |= deleted,
                Err(e) => warn!(content_id = %id, path = %path, error = %e, "failed to delete archive"),
            }
        }
        removed
    }

    /// Remove every archive referenced by `title_id`'s metadata, and the
    /// overlay patch metadata of `title_id + 0..0x10`. Returns whether
    /// anything was deleted.
    pub fn remove_existing_entry(&self, title_id: u64) -> bool {
        let _guard = self.lock();
        let index = self.index();
        let mut removed = false;

        let ids: Vec<ContentId> = ContentRecordType::REMOVABLE
            .iter()
            .filter_map(|&t| index.content_id(title_id, t))
            .collect();
        if !ids.is_empty() {
            info!(
                title_id = format_args!("{title_id:016X}"),
                version = self.entry_version(title_id).unwrap_or(0),
                "removing previously installed title"
            );
        }
        for id in &ids {
            removed |= self.delete_archive(id);
        }

        if let Some(overlay) = self.dir.subdirectory(&self.options.overlay_dir_name) {
            for i in 0..0x10 {
                let name = overlay_file_name(TitleType::Patch, title_id.wrapping_add(i));
                match overlay.delete_file(&name) {
                    Ok(deleted) => removed |= deleted,
                    Err(e) => warn!(file = %name, error = %e, "failed to delete overlay metadata"),
                }
            }
        }

        self.refresh_after_write();
        removed
    }

    /// Install every archive of a package directory (an NSP root or a
    /// gamecard secure partition).
    ///
    /// The package's Meta archive drives the install: it is copied first,
    /// then each content record is copied from the package file named by
    /// its content id. Delta fragments are skipped.
    pub fn install_package(
        &self,
        package: &VirtualDir,
        overwrite_if_exists: bool,
        copy: VfsCopyFn<'_>,
    ) -> InstallResult {
        let files = match package.files() {
            Ok(f) => f,
            Err(e) => {
                error!(package = %package.name(), error = %e, "failed to list package");
                return InstallResult::ErrorMetaFailed;
            }
        };

        let mut found = None;
        for file in &files {
            let Some(id) = layout::parse_archive_name(&file.name()) else {
                continue;
            };
            let nca = Nca::new(file.clone(), None, self.decoder.as_ref());
            if !nca.status().is_success() || nca.content_type() != Some(ContentType::Meta) {
                continue;
            }
            if let Ok(Some(cnmt)) = read_meta_nca(&nca) {
                found = Some((id, file.clone(), cnmt));
                break;
            }
        }
        let Some((meta_id, meta_file, cnmt)) = found else {
            error!(
                package = %package.name(),
                "package has no readable metadata archive; check the decoder keys"
            );
            return InstallResult::ErrorMetaFailed;
        };

        if overwrite_if_exists {
            self.remove_existing_entry(cnmt.title_id());
        }

        let _guard = self.lock();
        let res = self.install_file(&meta_file, copy, overwrite_if_exists, Some(meta_id));
        if !res.is_success() {
            return res;
        }

        for record in cnmt.content_records() {
            if record.record_type == ContentRecordType::DeltaFragment {
                continue;
            }
            let Some(file) = files
                .iter()
                .find(|f| layout::parse_archive_name(&f.name()) == Some(record.content_id))
            else {
                error!(
                    content_id = %record.content_id,
                    package = %package.name(),
                    "package is missing an archive named by its metadata"
                );
                return InstallResult::ErrorCopyFailed;
            };
            let res = self.install_file(file, copy, overwrite_if_exists, Some(record.content_id));
            if !res.is_success() {
                return res;
            }
        }

        info!(
            title_id = format_args!("{:016X}", cnmt.title_id()),
            version = cnmt.title_version(),
            archives = cnmt.content_records().len() + 1,
            "installed package"
        );
        InstallResult::Success
    }

    /// Install a gamecard image from its secure partition. Content ids are
    /// kept as named on the card.
    pub fn install_xci(
        &self,
        xci: &Xci,
        overwrite_if_exists: bool,
        copy: VfsCopyFn<'_>,
    ) -> InstallResult {
        match xci.partition(XciPartition::Secure) {
            Some(secure) => self.install_package(&secure, overwrite_if_exists, copy),
            None => {
                error!(status = %xci.status(), "gamecard has no secure partition");
                InstallResult::ErrorMetaFailed
            }
        }
    }
}

impl ContentProvider for RegisteredCache {
    fn refresh(&self) -> Result<()> {
        let _guard = self.lock();
        self.rebuild()
    }

    fn has_entry(&self, title_id: u64, record_type: ContentRecordType) -> bool {
        self.entry_raw(title_id, record_type).is_some()
    }

    fn entry_version(&self, title_id: u64) -> Option<u32> {
        let index = self.index();
        index
            .meta
            .get(&title_id)
            .or_else(|| index.overlay_meta.get(&title_id))
            .map(Cnmt::title_version)
    }

    fn entry_unparsed(
        &self,
        title_id: u64,
        record_type: ContentRecordType,
    ) -> Option<VirtualFile> {
        let id = self.index().content_id(title_id, record_type)?;
        self.file_at_id(&id)
    }

    fn entry_raw(&self, title_id: u64, record_type: ContentRecordType) -> Option<VirtualFile> {
        let id = self.index().content_id(title_id, record_type)?;
        let file = self.file_at_id(&id)?;
        Some((self.parser)(file, &id))
    }

    fn list_entries_filter(&self, filter: &EntryFilter) -> Vec<ContentProviderEntry> {
        let index = self.index();
        let mut out = Vec::new();

        for cnmt in index.meta.values() {
            if filter.matches(cnmt.title_type(), ContentRecordType::Meta, cnmt.title_id()) {
                out.push(ContentProviderEntry::new(
                    cnmt.title_id(),
                    ContentRecordType::Meta,
                ));
            }
            self.push_present_records(cnmt, filter, &mut out);
        }
        for cnmt in index.overlay_meta.values() {
            self.push_present_records(cnmt, filter, &mut out);
        }

        out.sort();
        out.dedup();
        out
    }
}

impl RegisteredCache {
    fn push_present_records(
        &self,
        cnmt: &Cnmt,
        filter: &EntryFilter,
        out: &mut Vec<ContentProviderEntry>,
    ) {
        for rec in cnmt.content_records() {
            if filter.matches(cnmt.title_type(), rec.record_type, cnmt.title_id())
                && self.file_at_id(&rec.content_id).is_some()
            {
                out.push(ContentProviderEntry::new(cnmt.title_id(), rec.record_type));
            }
        }
    }
}

/// The CNMT carried by the first partition of a Meta archive.
fn read_meta_nca(nca: &Nca) -> Result<Option<Cnmt>> {
    let Some(section0) = nca.partitions().first() else {
        return Ok(None);
    };
    for file in section0.files()? {
        if file.extension().as_deref() == Some("cnmt") {
            return Cnmt::parse(&mut VfsReader::new(file)).map(Some);
        }
    }
    Ok(None)
}

fn write_blob(dir: &VirtualDir, name: &str, data: &[u8]) -> Result<()> {
    let out = dir.create_file(name)?;
    out.resize(data.len() as u64)?;
    out.write_at(data, 0)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::decoder::PlaintextDecoder;
    use crate::formats::nca::NcaBuilder;
    use crate::formats::pfs0;
    use crate::vfs::{VectorDirectory, VectorFile, raw_copy};

    const TID: u64 = 0x0100_0000_0001_0000;

    fn cache() -> RegisteredCache {
        RegisteredCache::new(VectorDirectory::new("registered"), Arc::new(PlaintextDecoder))
            .unwrap()
    }

    fn program(title_id: u64, payload: &[u8]) -> Nca {
        let bytes = NcaBuilder::new(ContentType::Program, title_id)
            .partition(pfs0::build(&[("main", payload), ("main.npdm", b"npdm")]))
            .build();
        Nca::new(VectorFile::new("program.nca", bytes), None, &PlaintextDecoder)
    }

    #[test]
    fn bare_install_synthesizes_overlay_metadata() {
        let cache = cache();
        let nca = program(TID, b"code");
        let res = cache.install_entry(&nca, TitleType::Application, false, &raw_copy);
        assert_eq!(res, InstallResult::Success);

        let overlay = cache.dir().subdirectory("overlay_meta").unwrap();
        assert!(overlay.file("Application_0100000000010000.cnmt").is_some());
        assert!(cache.has_entry(TID, ContentRecordType::Program));
        assert!(!cache.has_entry(TID, ContentRecordType::Meta));
        assert_eq!(cache.entry_version(TID), Some(0));
        assert_eq!(
            cache.list_entries(),
            vec![ContentProviderEntry::new(TID, ContentRecordType::Program)]
        );
        let stored = cache
            .entry_unparsed(TID, ContentRecordType::Program)
            .unwrap();
        assert_eq!(stored.read_all().unwrap(), nca.base_file().read_all().unwrap());
    }

    #[test]
    fn second_install_merges_into_the_same_blob() {
        let cache = cache();
        let program = program(TID, b"code");
        let control = Nca::new(
            VectorFile::new(
                "control.nca",
                NcaBuilder::new(ContentType::Control, TID)
                    .romfs(b"nacp".to_vec())
                    .build(),
            ),
            None,
            &PlaintextDecoder,
        );
        assert!(cache
            .install_entry(&program, TitleType::Application, false, &raw_copy)
            .is_success());
        assert!(cache
            .install_entry(&control, TitleType::Application, false, &raw_copy)
            .is_success());

        let index = cache.index();
        let merged = &index.overlay_meta[&TID];
        assert_eq!(merged.content_records().len(), 2);
        assert_eq!(cache.list_entries_filter(&EntryFilter::default().title_id(TID)).len(), 2);
    }

    #[test]
    fn failing_copy_is_reported() {
        let cache = cache();
        let nca = program(TID, b"code");
        let res = cache.install_entry(&nca, TitleType::Application, false, &|_: &VirtualFile, _: &VirtualFile, _: usize| false);
        assert_eq!(res, InstallResult::ErrorCopyFailed);
        assert!(cache.list_entries().is_empty());
    }

    #[test]
    fn listing_skips_records_without_files() {
        let cache = cache();
        let nca = program(TID, b"code");
        assert!(cache
            .install_entry(&nca, TitleType::Application, false, &raw_copy)
            .is_success());
        let id = cache.index().content_id(TID, ContentRecordType::Program).unwrap();
        cache
            .dir()
            .delete_file_relative(&Layout::INSTALL.path_for(&id))
            .unwrap();
        assert!(cache.list_entries().is_empty());
        assert!(!cache.has_entry(TID, ContentRecordType::Program));
    }

    #[test]
    fn corrupt_overlay_blob_does_not_block_refresh() {
        let cache = cache();
        let overlay = cache.dir().create_subdirectory("overlay_meta").unwrap();
        write_blob(&overlay, "Application_0100000000010000.cnmt", b"junk").unwrap();
        cache.refresh().unwrap();
        assert!(cache.index().overlay_meta.is_empty());
    }

    #[test]
    fn unparsable_meta_archive_is_skipped() {
        let mut partition = pfs0::build(&[("Application_0100000000010000.cnmt", b"cnmt")]);
        partition[0x10..0x18].copy_from_slice(&u64::MAX.to_le_bytes());
        let meta = NcaBuilder::new(ContentType::Meta, TID)
            .partition(partition)
            .build();
        let id = ContentId::new([0x5A; 0x10]);
        let dir: VirtualDir = VectorDirectory::new("registered");
        write_blob(&dir, &Layout::LowerFlatMeta.path_for(&id), &meta).unwrap();

        let cache = RegisteredCache::new(dir, Arc::new(PlaintextDecoder)).unwrap();
        assert!(cache.index().meta.is_empty());
        assert!(!cache.has_entry(TID, ContentRecordType::Meta));

        let nca = program(TID, b"code");
        assert!(cache
            .install_entry(&nca, TitleType::Application, false, &raw_copy)
            .is_success());
        assert!(cache.has_entry(TID, ContentRecordType::Program));
    }

    #[rstest]
    #[case(CacheOptions { digest_prefix_size: 0, ..CacheOptions::default() })]
    #[case(CacheOptions { copy_block_size: 0, ..CacheOptions::default() })]
    #[case(CacheOptions { overlay_dir_name: "a/b".into(), ..CacheOptions::default() })]
    fn invalid_options_are_refused(#[case] options: CacheOptions) {
        let result = RegisteredCache::with_parser(
            VectorDirectory::new("registered"),
            Arc::new(PlaintextDecoder),
            identity_parser(),
            options,
        );
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }

    #[test]
    fn custom_parser_wraps_raw_entries_only() {
        let parser: ParsingFunction =
            Arc::new(|file: VirtualFile, _: &ContentId| -> VirtualFile {
                VectorFile::new("wrapped", file.read_all().unwrap_or_default())
            });
        let cache = RegisteredCache::with_parser(
            VectorDirectory::new("registered"),
            Arc::new(PlaintextDecoder),
            parser,
            CacheOptions::default(),
        )
        .unwrap();
        let nca = program(TID, b"code");
        assert!(cache
            .install_entry(&nca, TitleType::Application, false, &raw_copy)
            .is_success());
        let raw = cache.entry_raw(TID, ContentRecordType::Program).unwrap();
        let unparsed = cache.entry_unparsed(TID, ContentRecordType::Program).unwrap();
        assert_eq!(raw.name(), "wrapped");
        assert_ne!(unparsed.name(), "wrapped");
    }
}
