//! The lookup surface shared by every content store.

use std::fmt;
use std::sync::Arc;

use super::ContentId;
use crate::Result;
use crate::decoder::ContentDecoder;
use crate::formats::cnmt::{ContentRecordType, TitleType};
use crate::formats::nca::Nca;
use crate::vfs::VirtualFile;

/// Transforms a located archive before it is handed out, e.g. to wrap it in
/// an outer storage layer. Receives the id the file was located by.
pub type ParsingFunction = Arc<dyn Fn(VirtualFile, &ContentId) -> VirtualFile + Send + Sync>;

/// The identity [`ParsingFunction`].
pub fn identity_parser() -> ParsingFunction {
    Arc::new(|file: VirtualFile, _: &ContentId| file)
}

/// A listing key. Ordered by title id, then record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentProviderEntry {
    pub title_id: u64,
    pub record_type: ContentRecordType,
}

impl ContentProviderEntry {
    pub fn new(title_id: u64, record_type: ContentRecordType) -> Self {
        Self {
            title_id,
            record_type,
        }
    }
}

impl fmt::Display for ContentProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}/{:?}", self.title_id, self.record_type)
    }
}

/// Optional predicates for listings; `None` matches anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub title_type: Option<TitleType>,
    pub record_type: Option<ContentRecordType>,
    pub title_id: Option<u64>,
}

impl EntryFilter {
    pub fn title_type(mut self, title_type: TitleType) -> Self {
        self.title_type = Some(title_type);
        self
    }

    pub fn record_type(mut self, record_type: ContentRecordType) -> Self {
        self.record_type = Some(record_type);
        self
    }

    pub fn title_id(mut self, title_id: u64) -> Self {
        self.title_id = Some(title_id);
        self
    }

    pub fn matches(
        &self,
        title_type: TitleType,
        record_type: ContentRecordType,
        title_id: u64,
    ) -> bool {
        self.title_type.is_none_or(|t| t == title_type)
            && self.record_type.is_none_or(|t| t == record_type)
            && self.title_id.is_none_or(|t| t == title_id)
    }
}

/// A store that can answer "content of kind K for title T".
///
/// Lookup misses are `None`/`false`, never errors.
pub trait ContentProvider: Send + Sync + fmt::Debug {
    /// Rebuild any in-memory index from the backing store.
    fn refresh(&self) -> Result<()>;

    fn has_entry(&self, title_id: u64, record_type: ContentRecordType) -> bool;

    /// Title version recorded in the title's metadata.
    fn entry_version(&self, title_id: u64) -> Option<u32>;

    /// The stored file, exactly as located.
    fn entry_unparsed(&self, title_id: u64, record_type: ContentRecordType)
    -> Option<VirtualFile>;

    /// The stored file after any provider-specific wrapping.
    fn entry_raw(&self, title_id: u64, record_type: ContentRecordType) -> Option<VirtualFile>;

    /// Sorted, duplicate-free entries matching `filter`.
    fn list_entries_filter(&self, filter: &EntryFilter) -> Vec<ContentProviderEntry>;

    fn list_entries(&self) -> Vec<ContentProviderEntry> {
        self.list_entries_filter(&EntryFilter::default())
    }

    /// The entry opened as an archive. The caller checks its status.
    fn entry(
        &self,
        title_id: u64,
        record_type: ContentRecordType,
        decoder: &dyn ContentDecoder,
    ) -> Option<Nca> {
        let file = self.entry_raw(title_id, record_type)?;
        Some(Nca::new(file, None, decoder))
    }

    fn has_entry_for(&self, entry: ContentProviderEntry) -> bool {
        self.has_entry(entry.title_id, entry.record_type)
    }

    fn entry_unparsed_for(&self, entry: ContentProviderEntry) -> Option<VirtualFile> {
        self.entry_unparsed(entry.title_id, entry.record_type)
    }

    fn entry_raw_for(&self, entry: ContentProviderEntry) -> Option<VirtualFile> {
        self.entry_raw(entry.title_id, entry.record_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_order_by_title_then_type() {
        let mut entries = vec![
            ContentProviderEntry::new(2, ContentRecordType::Meta),
            ContentProviderEntry::new(1, ContentRecordType::Data),
            ContentProviderEntry::new(1, ContentRecordType::Program),
        ];
        entries.sort();
        assert_eq!(
            entries,
            vec![
                ContentProviderEntry::new(1, ContentRecordType::Program),
                ContentProviderEntry::new(1, ContentRecordType::Data),
                ContentProviderEntry::new(2, ContentRecordType::Meta),
            ]
        );
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = EntryFilter::default();
        assert!(filter.matches(TitleType::Patch, ContentRecordType::Program, 7));
        let narrowed = filter.title_id(7).record_type(ContentRecordType::Data);
        assert!(narrowed.matches(TitleType::Patch, ContentRecordType::Data, 7));
        assert!(!narrowed.matches(TitleType::Patch, ContentRecordType::Program, 7));
        assert!(!narrowed.matches(TitleType::Patch, ContentRecordType::Data, 8));
    }
}
