//! In-memory provider for content registered by the frontend.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard};

use super::provider::{ContentProvider, ContentProviderEntry, EntryFilter};
use crate::Result;
use crate::formats::cnmt::{ContentRecordType, TitleType};
use crate::vfs::VirtualFile;

type Key = (TitleType, ContentRecordType, u64);

/// Files keyed by `(title type, record type, title id)`.
///
/// There is nothing to rescan, so [`ContentProvider::refresh`] is a no-op,
/// and there is no metadata, so versions are always unknown.
#[derive(Debug, Default)]
pub struct ManualContentProvider {
    entries: RwLock<BTreeMap<Key, VirtualFile>>,
}

impl ManualContentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> RwLockReadGuard<'_, BTreeMap<Key, VirtualFile>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace an entry.
    pub fn add_entry(
        &self,
        title_type: TitleType,
        record_type: ContentRecordType,
        title_id: u64,
        file: VirtualFile,
    ) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((title_type, record_type, title_id), file);
    }

    pub fn clear_all_entries(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl ContentProvider for ManualContentProvider {
    fn refresh(&self) -> Result<()> {
        Ok(())
    }

    fn has_entry(&self, title_id: u64, record_type: ContentRecordType) -> bool {
        self.entry_raw(title_id, record_type).is_some()
    }

    fn entry_version(&self, _title_id: u64) -> Option<u32> {
        None
    }

    fn entry_unparsed(
        &self,
        title_id: u64,
        record_type: ContentRecordType,
    ) -> Option<VirtualFile> {
        self.entry_raw(title_id, record_type)
    }

    fn entry_raw(&self, title_id: u64, record_type: ContentRecordType) -> Option<VirtualFile> {
        self.entries()
            .iter()
            .find(|((_, r, t), _)| *r == record_type && *t == title_id)
            .map(|(_, file)| file.clone())
    }

    fn list_entries_filter(&self, filter: &EntryFilter) -> Vec<ContentProviderEntry> {
        let mut out: Vec<ContentProviderEntry> = self
            .entries()
            .keys()
            .filter(|(tt, r, t)| filter.matches(*tt, *r, *t))
            .map(|&(_, r, t)| ContentProviderEntry::new(t, r))
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{VectorFile, VfsFile};

    #[test]
    fn add_lookup_clear() {
        let manual = ManualContentProvider::new();
        manual.add_entry(
            TitleType::Application,
            ContentRecordType::Program,
            7,
            VectorFile::new("a", b"one".to_vec()),
        );
        manual.add_entry(
            TitleType::Application,
            ContentRecordType::Program,
            7,
            VectorFile::new("b", b"two".to_vec()),
        );
        assert!(manual.has_entry(7, ContentRecordType::Program));
        assert!(!manual.has_entry(7, ContentRecordType::Control));
        assert_eq!(
            manual
                .entry_unparsed(7, ContentRecordType::Program)
                .unwrap()
                .read_all()
                .unwrap(),
            b"two"
        );
        assert_eq!(manual.entry_version(7), None);
        assert_eq!(manual.list_entries().len(), 1);

        manual.clear_all_entries();
        assert!(manual.list_entries().is_empty());
        manual.refresh().unwrap();
    }

    #[test]
    fn same_key_under_two_title_types_lists_once() {
        let manual = ManualContentProvider::new();
        for kind in [TitleType::Application, TitleType::Patch] {
            manual.add_entry(kind, ContentRecordType::Control, 9, VectorFile::new("c", Vec::new()));
        }
        assert_eq!(
            manual.list_entries(),
            vec![ContentProviderEntry::new(9, ContentRecordType::Control)]
        );
        let patches = manual.list_entries_filter(&EntryFilter::default().title_type(TitleType::Patch));
        assert_eq!(patches.len(), 1);
    }
}
