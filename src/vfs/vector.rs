//! In-memory files and directories.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{VfsDirectory, VfsFile, VirtualDir, VirtualFile, read_only_error};
use crate::Result;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// A growable byte buffer exposed as a file.
#[derive(Debug)]
pub struct VectorFile {
    name: String,
    data: RwLock<Vec<u8>>,
}

impl VectorFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            data: RwLock::new(data),
        })
    }
}

impl VfsFile for VectorFile {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn size(&self) -> u64 {
        read(&self.data).len() as u64
    }

    fn resize(&self, new_size: u64) -> Result<()> {
        let len = usize::try_from(new_size).map_err(|_| crate::Error::InvalidRange)?;
        write(&self.data).resize(len, 0);
        Ok(())
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let data = read(&self.data);
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&self, bytes: &[u8], offset: u64) -> Result<usize> {
        let start = usize::try_from(offset).map_err(|_| crate::Error::InvalidRange)?;
        let mut data = write(&self.data);
        let end = start + bytes.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    fn is_writable(&self) -> bool {
        true
    }
}

/// A directory held entirely in memory.
///
/// Built read-only from a fixed listing (partition contents, pseudo
/// directories) or writable for scratch trees.
#[derive(Debug)]
pub struct VectorDirectory {
    name: String,
    files: RwLock<BTreeMap<String, VirtualFile>>,
    dirs: RwLock<BTreeMap<String, VirtualDir>>,
    writable: bool,
}

impl VectorDirectory {
    /// Empty writable directory.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            files: RwLock::default(),
            dirs: RwLock::default(),
            writable: true,
        })
    }

    /// Fixed listing. When two files share a name the first one wins.
    pub fn read_only(
        name: impl Into<String>,
        files: impl IntoIterator<Item = VirtualFile>,
        dirs: impl IntoIterator<Item = VirtualDir>,
    ) -> Arc<Self> {
        let mut file_map = BTreeMap::new();
        for f in files {
            file_map.entry(f.name()).or_insert(f);
        }
        let mut dir_map = BTreeMap::new();
        for d in dirs {
            dir_map.entry(d.name()).or_insert(d);
        }
        Arc::new(Self {
            name: name.into(),
            files: RwLock::new(file_map),
            dirs: RwLock::new(dir_map),
            writable: false,
        })
    }

    /// Insert or replace a file (works on read-only listings too; used while
    /// assembling them).
    pub fn add_file(&self, file: VirtualFile) {
        write(&self.files).insert(file.name(), file);
    }

    fn guard_write(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(read_only_error(&self.name))
        }
    }
}

impl VfsDirectory for VectorDirectory {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn files(&self) -> Result<Vec<VirtualFile>> {
        Ok(read(&self.files).values().cloned().collect())
    }

    fn subdirectories(&self) -> Result<Vec<VirtualDir>> {
        Ok(read(&self.dirs).values().cloned().collect())
    }

    fn file(&self, name: &str) -> Option<VirtualFile> {
        read(&self.files).get(name).cloned()
    }

    fn subdirectory(&self, name: &str) -> Option<VirtualDir> {
        read(&self.dirs).get(name).cloned()
    }

    fn create_file(&self, name: &str) -> Result<VirtualFile> {
        self.guard_write()?;
        let file: VirtualFile = VectorFile::new(name, Vec::new());
        write(&self.files).insert(name.to_owned(), file.clone());
        Ok(file)
    }

    fn create_subdirectory(&self, name: &str) -> Result<VirtualDir> {
        self.guard_write()?;
        let mut dirs = write(&self.dirs);
        let dir = dirs
            .entry(name.to_owned())
            .or_insert_with(|| VectorDirectory::new(name) as VirtualDir);
        Ok(dir.clone())
    }

    fn delete_file(&self, name: &str) -> Result<bool> {
        self.guard_write()?;
        Ok(write(&self.files).remove(name).is_some())
    }

    fn delete_subdirectory_recursive(&self, name: &str) -> Result<bool> {
        self.guard_write()?;
        Ok(write(&self.dirs).remove(name).is_some())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}
