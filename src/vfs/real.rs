//! Host filesystem backend.
//!
//! Handles hold a path only; every operation opens the file afresh, so a
//! handle never pins a descriptor and stays valid across renames of
//! unrelated entries.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{VfsDirectory, VfsFile, VirtualDir, VirtualFile, read_only_error};
use crate::{Error, Result};

/// A directory on the host filesystem.
#[derive(Debug, Clone)]
pub struct RealDirectory {
    path: PathBuf,
    writable: bool,
}

impl RealDirectory {
    /// Open an existing directory for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> Result<VirtualDir> {
        let path = path.as_ref().to_path_buf();
        if !path.is_dir() {
            return Err(Error::NotFound(path.display().to_string()));
        }
        Ok(Arc::new(Self {
            path,
            writable: true,
        }))
    }

    /// Open a directory, creating it (and its parents) if missing.
    pub fn create(path: impl AsRef<Path>) -> Result<VirtualDir> {
        fs::create_dir_all(path.as_ref())?;
        Self::open(path)
    }

    /// Open an existing directory; every handle derived from it is read-only.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<VirtualDir> {
        let path = path.as_ref().to_path_buf();
        if !path.is_dir() {
            return Err(Error::NotFound(path.display().to_string()));
        }
        Ok(Arc::new(Self {
            path,
            writable: false,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn child(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    fn guard_write(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(read_only_error(&self.name()))
        }
    }
}

impl VfsDirectory for RealDirectory {
    fn name(&self) -> String {
        file_name(&self.path)
    }

    fn files(&self) -> Result<Vec<VirtualFile>> {
        let mut out: Vec<VirtualFile> = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                out.push(Arc::new(RealFile {
                    path: entry.path(),
                    writable: self.writable,
                }));
            }
        }
        Ok(out)
    }

    fn subdirectories(&self) -> Result<Vec<VirtualDir>> {
        let mut out: Vec<VirtualDir> = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                out.push(Arc::new(RealDirectory {
                    path: entry.path(),
                    writable: self.writable,
                }));
            }
        }
        Ok(out)
    }

    fn file(&self, name: &str) -> Option<VirtualFile> {
        let path = self.child(name);
        path.is_file().then(|| {
            Arc::new(RealFile {
                path,
                writable: self.writable,
            }) as VirtualFile
        })
    }

    fn subdirectory(&self, name: &str) -> Option<VirtualDir> {
        let path = self.child(name);
        path.is_dir().then(|| {
            Arc::new(RealDirectory {
                path,
                writable: self.writable,
            }) as VirtualDir
        })
    }

    fn create_file(&self, name: &str) -> Result<VirtualFile> {
        self.guard_write()?;
        let path = self.child(name);
        File::create(&path)?;
        Ok(Arc::new(RealFile {
            path,
            writable: true,
        }))
    }

    fn create_subdirectory(&self, name: &str) -> Result<VirtualDir> {
        self.guard_write()?;
        let path = self.child(name);
        fs::create_dir_all(&path)?;
        Ok(Arc::new(RealDirectory {
            path,
            writable: true,
        }))
    }

    fn delete_file(&self, name: &str) -> Result<bool> {
        self.guard_write()?;
        match fs::remove_file(self.child(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_subdirectory_recursive(&self, name: &str) -> Result<bool> {
        self.guard_write()?;
        match fs::remove_dir_all(self.child(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}

/// A file on the host filesystem.
#[derive(Debug, Clone)]
pub struct RealFile {
    path: PathBuf,
    writable: bool,
}

impl RealFile {
    /// Open an existing file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<VirtualFile> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(Error::NotFound(path.display().to_string()));
        }
        Ok(Arc::new(Self {
            path,
            writable: false,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&self) -> Result<File> {
        if !self.writable {
            return Err(read_only_error(&self.name()));
        }
        Ok(OpenOptions::new().write(true).open(&self.path)?)
    }
}

impl VfsFile for RealFile {
    fn name(&self) -> String {
        file_name(&self.path)
    }

    fn size(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    fn resize(&self, new_size: u64) -> Result<()> {
        self.writer()?.set_len(new_size)?;
        Ok(())
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut f = File::open(&self.path)?;
        f.seek(SeekFrom::Start(offset))?;
        let mut done = 0;
        while done < buf.len() {
            match f.read(&mut buf[done..]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(done)
    }

    fn write_at(&self, data: &[u8], offset: u64) -> Result<usize> {
        let mut f = self.writer()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)?;
        Ok(data.len())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_list_and_delete_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let root = RealDirectory::open(tmp.path()).unwrap();

        let f = root.create_file_relative("000000AB/x.nca").unwrap();
        f.write_at(b"hello", 2).unwrap();
        assert_eq!(f.size(), 7);
        assert_eq!(f.read_bytes(5, 2).unwrap(), b"hello");

        let subs = root.subdirectories().unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].name(), "000000AB");
        assert!(root.delete_directory_relative("000000AB").unwrap());
        assert!(!root.delete_directory_relative("000000AB").unwrap());
    }

    #[test]
    fn read_only_handles_refuse_writes() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a"), b"abc").unwrap();
        let root = RealDirectory::open_read_only(tmp.path()).unwrap();
        let f = root.file("a").unwrap();
        assert!(!f.is_writable());
        assert!(f.write_at(b"z", 0).is_err());
        assert!(root.create_file("b").is_err());
    }
}
