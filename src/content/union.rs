//! Layered lookup over several providers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use tracing::trace;

use super::provider::{ContentProvider, ContentProviderEntry, EntryFilter};
use crate::Result;
use crate::formats::cnmt::ContentRecordType;
use crate::vfs::VirtualFile;

/// Origin of a provider in a [`ContentProviderUnion`]. Declaration order is
/// lookup precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentProviderUnionSlot {
    SysNand,
    UserNand,
    SdCard,
    FrontendManual,
}

impl fmt::Display for ContentProviderUnionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SysNand => "sysnand",
            Self::UserNand => "usernand",
            Self::SdCard => "sdcard",
            Self::FrontendManual => "manual",
        };
        f.write_str(s)
    }
}

type Slot = ContentProviderUnionSlot;

/// Merges providers by slot.
///
/// Point lookups return the first hit in slot order; listings gather from
/// every slot and are sorted and deduplicated. Slots hold weak handles: the
/// union never keeps a provider alive, and a dropped provider behaves like
/// an empty slot.
#[derive(Default)]
pub struct ContentProviderUnion {
    providers: RwLock<BTreeMap<Slot, Weak<dyn ContentProvider>>>,
}

impl fmt::Debug for ContentProviderUnion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots: Vec<Slot> = self.live().into_iter().map(|(slot, _)| slot).collect();
        f.debug_struct("ContentProviderUnion")
            .field("slots", &slots)
            .finish()
    }
}

impl ContentProviderUnion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `slot` at `provider`, replacing whatever was there.
    pub fn set_slot(&self, slot: Slot, provider: &Arc<dyn ContentProvider>) {
        self.providers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(slot, Arc::downgrade(provider));
    }

    pub fn clear_slot(&self, slot: Slot) {
        self.providers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&slot);
    }

    /// Populated slots in precedence order.
    fn live(&self) -> Vec<(Slot, Arc<dyn ContentProvider>)> {
        self.providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter_map(|(slot, weak)| weak.upgrade().map(|p| (*slot, p)))
            .collect()
    }

    fn first<T>(&self, f: impl Fn(&dyn ContentProvider) -> Option<T>) -> Option<T> {
        self.live().into_iter().find_map(|(_, p)| f(p.as_ref()))
    }

    /// Like [`ContentProvider::list_entries_filter`], tagged with the slot
    /// each entry came from and optionally restricted to one `origin`.
    ///
    /// An entry present in two slots appears once per slot.
    pub fn list_entries_filter_origin(
        &self,
        origin: Option<Slot>,
        filter: &EntryFilter,
    ) -> Vec<(Slot, ContentProviderEntry)> {
        let mut out: Vec<(Slot, ContentProviderEntry)> = self
            .live()
            .into_iter()
            .filter(|(slot, _)| origin.is_none_or(|o| o == *slot))
            .flat_map(|(slot, p)| {
                p.list_entries_filter(filter)
                    .into_iter()
                    .map(move |entry| (slot, entry))
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// The slot that answers lookups for `(title_id, record_type)`.
    pub fn slot_for_entry(&self, title_id: u64, record_type: ContentRecordType) -> Option<Slot> {
        self.live()
            .into_iter()
            .find(|(_, p)| p.has_entry(title_id, record_type))
            .map(|(slot, _)| slot)
    }
}

impl ContentProvider for ContentProviderUnion {
    fn refresh(&self) -> Result<()> {
        for (slot, provider) in self.live() {
            trace!(%slot, "refreshing slot");
            provider.refresh()?;
        }
        Ok(())
    }

    fn has_entry(&self, title_id: u64, record_type: ContentRecordType) -> bool {
        self.live()
            .iter()
            .any(|(_, p)| p.has_entry(title_id, record_type))
    }

    fn entry_version(&self, title_id: u64) -> Option<u32> {
        self.first(|p| p.entry_version(title_id))
    }

    fn entry_unparsed(
        &self,
        title_id: u64,
        record_type: ContentRecordType,
    ) -> Option<VirtualFile> {
        self.first(|p| p.entry_unparsed(title_id, record_type))
    }

    fn entry_raw(&self, title_id: u64, record_type: ContentRecordType) -> Option<VirtualFile> {
        self.first(|p| p.entry_raw(title_id, record_type))
    }

    fn list_entries_filter(&self, filter: &EntryFilter) -> Vec<ContentProviderEntry> {
        let mut out: Vec<ContentProviderEntry> = self
            .live()
            .iter()
            .flat_map(|(_, p)| p.list_entries_filter(filter))
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ManualContentProvider;
    use crate::formats::cnmt::TitleType;
    use crate::vfs::{VectorFile, VfsFile};

    fn manual_with(title_id: u64, body: &[u8]) -> Arc<dyn ContentProvider> {
        let manual = ManualContentProvider::new();
        manual.add_entry(
            TitleType::Application,
            ContentRecordType::Program,
            title_id,
            VectorFile::new("p", body.to_vec()),
        );
        Arc::new(manual)
    }

    #[test]
    fn lower_slot_wins_point_lookups() {
        let sys = manual_with(1, b"sys");
        let user = manual_with(1, b"user");
        let union = ContentProviderUnion::new();
        union.set_slot(Slot::UserNand, &user);
        union.set_slot(Slot::SysNand, &sys);

        let file = union.entry_raw(1, ContentRecordType::Program).unwrap();
        assert_eq!(file.read_all().unwrap(), b"sys");
        assert_eq!(
            union.slot_for_entry(1, ContentRecordType::Program),
            Some(Slot::SysNand)
        );

        union.clear_slot(Slot::SysNand);
        let file = union.entry_raw(1, ContentRecordType::Program).unwrap();
        assert_eq!(file.read_all().unwrap(), b"user");
    }

    #[test]
    fn listing_is_deduplicated_but_origin_listing_is_not() {
        let sys = manual_with(1, b"a");
        let sd = manual_with(1, b"b");
        let union = ContentProviderUnion::new();
        union.set_slot(Slot::SysNand, &sys);
        union.set_slot(Slot::SdCard, &sd);

        assert_eq!(
            union.list_entries(),
            vec![ContentProviderEntry::new(1, ContentRecordType::Program)]
        );
        let tagged = union.list_entries_filter_origin(None, &EntryFilter::default());
        assert_eq!(tagged.len(), 2);
        assert_eq!(tagged[0].0, Slot::SysNand);

        let only_sd = union.list_entries_filter_origin(Some(Slot::SdCard), &EntryFilter::default());
        assert_eq!(only_sd.len(), 1);
        assert_eq!(only_sd[0].0, Slot::SdCard);
    }

    #[test]
    fn dropped_provider_reads_as_empty_slot() {
        let union = ContentProviderUnion::new();
        {
            let temp = manual_with(5, b"x");
            union.set_slot(Slot::FrontendManual, &temp);
            assert!(union.has_entry(5, ContentRecordType::Program));
        }
        assert!(!union.has_entry(5, ContentRecordType::Program));
        assert!(union.list_entries().is_empty());
        assert_eq!(union.entry_version(5), None);
        union.refresh().unwrap();
    }
}
