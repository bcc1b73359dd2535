//! Staging area for archives that are still being written.
//!
//! Placeholders are always stored in the [`Layout::LowerSharded`] layout and
//! become real content only when [`PlaceholderCache::register`] copies them
//! into a [`RegisteredCache`].

use std::io;
use std::sync::Arc;

use tracing::{debug, info};

use super::layout::{self, Layout};
use super::{ContentId, RegisteredCache};
use crate::decoder::ContentDecoder;
use crate::error::{InstallResult, LoadStatus};
use crate::formats::nca::{Nca, RightsId};
use crate::vfs::{VfsDirectory, VfsFile, VirtualDir, VirtualFile, raw_copy};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct PlaceholderCache {
    dir: VirtualDir,
    decoder: Arc<dyn ContentDecoder>,
}

impl PlaceholderCache {
    pub fn new(dir: VirtualDir, decoder: Arc<dyn ContentDecoder>) -> Self {
        Self { dir, decoder }
    }

    /// A fresh random placeholder id.
    pub fn generate() -> ContentId {
        loop {
            let id = ContentId::generate();
            if !id.is_zero() {
                return id;
            }
        }
    }

    pub fn dir(&self) -> &VirtualDir {
        &self.dir
    }

    fn path(id: &ContentId) -> String {
        Layout::LowerSharded.path_for(id)
    }

    fn file(&self, id: &ContentId) -> Result<VirtualFile> {
        self.dir
            .file_relative(&Self::path(id))
            .ok_or_else(|| Error::NotFound(format!("placeholder {id}")))
    }

    /// Create an empty placeholder of `size` bytes. Fails if `id` is
    /// already staged.
    pub fn create(&self, id: &ContentId, size: u64) -> Result<()> {
        if self.exists(id) {
            return Err(Error::AlreadyExists(format!("placeholder {id}")));
        }
        let file = self.dir.create_file_relative(&Self::path(id))?;
        file.resize(size)?;
        debug!(placeholder = %id, size, "created placeholder");
        Ok(())
    }

    /// Returns `false` if nothing was staged under `id`.
    pub fn delete(&self, id: &ContentId) -> Result<bool> {
        self.dir.delete_file_relative(&Self::path(id))
    }

    pub fn exists(&self, id: &ContentId) -> bool {
        self.dir.file_relative(&Self::path(id)).is_some()
    }

    pub fn write(&self, id: &ContentId, offset: u64, data: &[u8]) -> Result<()> {
        let written = self.file(id)?.write_at(data, offset)?;
        if written != data.len() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write to placeholder {id}"),
            )));
        }
        Ok(())
    }

    pub fn size(&self, id: &ContentId) -> Result<u64> {
        Ok(self.file(id)?.size())
    }

    pub fn set_size(&self, id: &ContentId, new_size: u64) -> Result<()> {
        self.file(id)?.resize(new_size)
    }

    /// Every staged id.
    pub fn list(&self) -> Result<Vec<ContentId>> {
        let mut out = Vec::new();
        for shard in self.dir.subdirectories()? {
            for file in shard.files()? {
                out.extend(layout::parse_archive_name(&file.name()));
            }
        }
        Ok(out)
    }

    /// Rights id of the staged archive, if it has one.
    ///
    /// A patch archive without its base still reports its header, so
    /// [`LoadStatus::ErrorMissingBktrBaseRomFs`] is accepted here.
    pub fn rights_id(&self, id: &ContentId) -> Option<RightsId> {
        let file = self.dir.file_relative(&Self::path(id))?;
        let nca = Nca::new(file, None, self.decoder.as_ref());
        match nca.status() {
            LoadStatus::Success | LoadStatus::ErrorMissingBktrBaseRomFs => {}
            _ => return None,
        }
        let rights_id = nca.rights_id();
        rights_id.iter().any(|&b| b != 0).then_some(rights_id)
    }

    /// Commit `placeholder` into `cache` as `install`, then drop the
    /// placeholder. The placeholder is kept if the install fails.
    pub fn register(
        &self,
        cache: &RegisteredCache,
        placeholder: &ContentId,
        install: &ContentId,
    ) -> Result<InstallResult> {
        let file = self.file(placeholder)?;
        let res = cache.raw_install_nca(&file, &raw_copy, false, Some(*install));
        if res.is_success() {
            self.delete(placeholder)?;
            info!(%placeholder, %install, "registered placeholder");
        }
        Ok(res)
    }

    /// Remove everything staged.
    pub fn clean_all(&self) -> Result<()> {
        for sub in self.dir.subdirectories()? {
            self.dir.delete_subdirectory_recursive(&sub.name())?;
        }
        for file in self.dir.files()? {
            self.dir.delete_file(&file.name())?;
        }
        Ok(())
    }
}
