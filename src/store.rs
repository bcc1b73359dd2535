//! The assembled set of stores an emulated console sees.

use std::sync::Arc;

use tracing::info;

use crate::Result;
use crate::config::StoreConfig;
use crate::content::{
    ContentProvider, ContentProviderUnion, ContentProviderUnionSlot, ManualContentProvider,
    PlaceholderCache, RegisteredCache, identity_parser,
};
use crate::decoder::ContentDecoder;
use crate::vfs::RealDirectory;

/// System, user and SD card caches with their placeholder areas, plus the
/// frontend's manual provider, layered into one [`ContentProviderUnion`].
///
/// The store holds the strong references; the union only holds weak ones.
#[derive(Debug)]
pub struct ContentStore {
    system: Arc<RegisteredCache>,
    user: Arc<RegisteredCache>,
    sdmc: Option<Arc<RegisteredCache>>,
    system_placeholder: PlaceholderCache,
    user_placeholder: PlaceholderCache,
    manual: Arc<ManualContentProvider>,
    union: ContentProviderUnion,
}

impl ContentStore {
    /// Create any missing directories named by `config` and index them.
    pub fn open(config: &StoreConfig, decoder: Arc<dyn ContentDecoder>) -> Result<Self> {
        let open_cache = |path: &std::path::Path| -> Result<Arc<RegisteredCache>> {
            let cache = RegisteredCache::with_parser(
                RealDirectory::create(path)?,
                decoder.clone(),
                identity_parser(),
                config.cache.clone(),
            )?;
            Ok(Arc::new(cache))
        };

        let system = open_cache(&config.system_dir)?;
        let user = open_cache(&config.user_dir)?;
        let sdmc = config.sdmc_dir.as_deref().map(open_cache).transpose()?;
        let system_placeholder = PlaceholderCache::new(
            RealDirectory::create(&config.system_placeholder_dir)?,
            decoder.clone(),
        );
        let user_placeholder =
            PlaceholderCache::new(RealDirectory::create(&config.user_placeholder_dir)?, decoder);
        let manual = Arc::new(ManualContentProvider::new());

        let union = ContentProviderUnion::new();
        let attach = |slot: ContentProviderUnionSlot, provider: Arc<dyn ContentProvider>| {
            union.set_slot(slot, &provider);
        };
        attach(ContentProviderUnionSlot::SysNand, system.clone());
        attach(ContentProviderUnionSlot::UserNand, user.clone());
        if let Some(sdmc) = &sdmc {
            attach(ContentProviderUnionSlot::SdCard, sdmc.clone());
        }
        attach(ContentProviderUnionSlot::FrontendManual, manual.clone());

        info!(
            system = %config.system_dir.display(),
            user = %config.user_dir.display(),
            sdmc = sdmc.is_some(),
            "content store opened"
        );

        Ok(Self {
            system,
            user,
            sdmc,
            system_placeholder,
            user_placeholder,
            manual,
            union,
        })
    }

    pub fn system(&self) -> &Arc<RegisteredCache> {
        &self.system
    }

    pub fn user(&self) -> &Arc<RegisteredCache> {
        &self.user
    }

    pub fn sdmc(&self) -> Option<&Arc<RegisteredCache>> {
        self.sdmc.as_ref()
    }

    pub fn system_placeholder(&self) -> &PlaceholderCache {
        &self.system_placeholder
    }

    pub fn user_placeholder(&self) -> &PlaceholderCache {
        &self.user_placeholder
    }

    pub fn manual(&self) -> &Arc<ManualContentProvider> {
        &self.manual
    }

    /// Every provider, layered by slot.
    pub fn union(&self) -> &ContentProviderUnion {
        &self.union
    }

    /// Rescan every directory-backed cache.
    pub fn refresh(&self) -> Result<()> {
        self.union.refresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::PlaintextDecoder;
    use crate::formats::cnmt::{ContentRecordType, TitleType};
    use crate::vfs::{VectorFile, VfsFile};

    #[test]
    fn open_creates_directories_and_layers_providers() {
        let root = tempfile::tempdir().unwrap();
        let config = StoreConfig::with_root(root.path());
        let store = ContentStore::open(&config, Arc::new(PlaintextDecoder)).unwrap();

        assert!(config.system_dir.is_dir());
        assert!(config.user_placeholder_dir.is_dir());
        assert!(store.sdmc().is_some());
        assert!(store.union().list_entries().is_empty());

        store.manual().add_entry(
            TitleType::Application,
            ContentRecordType::Control,
            0x0100_0000_0001_0000,
            VectorFile::new("control", b"nacp".to_vec()),
        );
        assert_eq!(
            store.union().slot_for_entry(0x0100_0000_0001_0000, ContentRecordType::Control),
            Some(ContentProviderUnionSlot::FrontendManual)
        );
        let file = store
            .union()
            .entry_raw(0x0100_0000_0001_0000, ContentRecordType::Control)
            .unwrap();
        assert_eq!(file.read_all().unwrap(), b"nacp");
        store.refresh().unwrap();
    }

    #[test]
    fn sd_card_slot_is_optional() {
        let root = tempfile::tempdir().unwrap();
        let mut config = StoreConfig::with_root(root.path());
        config.sdmc_dir = None;
        let store = ContentStore::open(&config, Arc::new(PlaintextDecoder)).unwrap();
        assert!(store.sdmc().is_none());
        assert!(!root.path().join("sdmc").exists());
    }
}
