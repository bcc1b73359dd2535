//! Virtual filesystem capability consumed by the content store.
//!
//! The store never touches `std::fs` directly. Everything it reads or
//! writes goes through two object-safe traits:
//!
//! * [`VfsFile`] - a byte range with positional read/write and resize.
//! * [`VfsDirectory`] - a named container of files and subdirectories.
//!
//! Handles are reference counted ([`VirtualFile`], [`VirtualDir`]) so a
//! located archive can outlive the lookup that produced it.
//!
//! ## Implementations
//!
//! | Type | Backing |
//! |------|---------|
//! | [`RealDirectory`] / [`RealFile`] | host filesystem |
//! | [`VectorDirectory`] / [`VectorFile`] | memory |
//! | [`OffsetFile`] | byte window of another file |
//! | [`ConcatenatedFile`] | several files joined end to end |
//!
//! [`VfsReader`] adapts any [`VirtualFile`] to [`std::io::Read`] +
//! [`std::io::Seek`] so the format parsers can consume it.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::Result;

mod concat;
mod offset;
mod real;
mod vector;

pub use concat::ConcatenatedFile;
pub use offset::OffsetFile;
pub use real::{RealDirectory, RealFile};
pub use vector::{VectorDirectory, VectorFile};

/// Shared handle to a file.
pub type VirtualFile = Arc<dyn VfsFile>;
/// Shared handle to a directory.
pub type VirtualDir = Arc<dyn VfsDirectory>;

/// Copy strategy used when installing archives: `(source, destination, block_size)`.
///
/// Returning `false` aborts the install with a copy failure.
pub type VfsCopyFn<'a> = &'a dyn Fn(&VirtualFile, &VirtualFile, usize) -> bool;

/// A file with positional byte access.
pub trait VfsFile: Send + Sync + fmt::Debug {
    /// Leaf name, including extension.
    fn name(&self) -> String;

    /// Current size in bytes.
    fn size(&self) -> u64;

    /// Grow or truncate the file to `new_size` bytes.
    fn resize(&self, new_size: u64) -> Result<()>;

    /// Read up to `buf.len()` bytes at `offset`. Returns the count read;
    /// short only at end of file.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Write `data` at `offset`, extending the file if needed. Returns the
    /// count written.
    fn write_at(&self, data: &[u8], offset: u64) -> Result<usize>;

    fn is_writable(&self) -> bool;

    /// Text after the last `.` of the name, if any.
    fn extension(&self) -> Option<String> {
        let name = self.name();
        name.rfind('.').map(|i| name[i + 1..].to_owned())
    }

    /// Read up to `len` bytes at `offset`, truncated at end of file.
    fn read_bytes(&self, len: usize, offset: u64) -> Result<Vec<u8>> {
        let avail = self.size().saturating_sub(offset);
        let len = len.min(usize::try_from(avail).unwrap_or(usize::MAX));
        let mut buf = vec![0u8; len];
        let mut done = 0;
        while done < len {
            let n = self.read_at(&mut buf[done..], offset + done as u64)?;
            if n == 0 {
                break;
            }
            done += n;
        }
        buf.truncate(done);
        Ok(buf)
    }

    /// Read the entire file.
    fn read_all(&self) -> Result<Vec<u8>> {
        let len = usize::try_from(self.size()).unwrap_or(usize::MAX);
        self.read_bytes(len, 0)
    }
}

/// A directory of named files and subdirectories.
///
/// Relative paths use `/` separators; empty components are ignored.
pub trait VfsDirectory: Send + Sync + fmt::Debug {
    fn name(&self) -> String;

    fn files(&self) -> Result<Vec<VirtualFile>>;

    fn subdirectories(&self) -> Result<Vec<VirtualDir>>;

    /// Direct child file by name.
    fn file(&self, name: &str) -> Option<VirtualFile>;

    /// Direct child directory by name.
    fn subdirectory(&self, name: &str) -> Option<VirtualDir>;

    /// Create (or truncate) a child file.
    fn create_file(&self, name: &str) -> Result<VirtualFile>;

    /// Create a child directory, returning the existing one if present.
    fn create_subdirectory(&self, name: &str) -> Result<VirtualDir>;

    /// Returns `false` if no such file existed.
    fn delete_file(&self, name: &str) -> Result<bool>;

    /// Returns `false` if no such directory existed.
    fn delete_subdirectory_recursive(&self, name: &str) -> Result<bool>;

    fn is_writable(&self) -> bool;

    /// Delete a child directory and everything below it, then recreate it empty.
    fn clean_subdirectory_recursive(&self, name: &str) -> Result<bool> {
        self.delete_subdirectory_recursive(name)?;
        self.create_subdirectory(name)?;
        Ok(true)
    }

    fn file_relative(&self, path: &str) -> Option<VirtualFile> {
        let (parents, leaf) = split_path(path)?;
        match parents.split_first() {
            None => self.file(leaf),
            Some((first, rest)) => {
                let mut dir = self.subdirectory(first)?;
                for part in rest {
                    dir = dir.subdirectory(part)?;
                }
                dir.file(leaf)
            }
        }
    }

    fn directory_relative(&self, path: &str) -> Option<VirtualDir> {
        let mut parts = components(path);
        let first = parts.next()?;
        let mut dir = self.subdirectory(first)?;
        for part in parts {
            dir = dir.subdirectory(part)?;
        }
        Some(dir)
    }

    /// Create a file at `path`, creating intermediate directories.
    fn create_file_relative(&self, path: &str) -> Result<VirtualFile> {
        let (parents, leaf) = split_path(path).ok_or(crate::Error::InvalidRange)?;
        match parents.split_first() {
            None => self.create_file(leaf),
            Some((first, rest)) => {
                let mut dir = self.create_subdirectory(first)?;
                for part in rest {
                    dir = dir.create_subdirectory(part)?;
                }
                dir.create_file(leaf)
            }
        }
    }

    /// Create every directory along `path`.
    fn create_directory_relative(&self, path: &str) -> Result<VirtualDir> {
        let mut parts = components(path);
        let first = parts.next().ok_or(crate::Error::InvalidRange)?;
        let mut dir = self.create_subdirectory(first)?;
        for part in parts {
            dir = dir.create_subdirectory(part)?;
        }
        Ok(dir)
    }

    fn delete_file_relative(&self, path: &str) -> Result<bool> {
        let Some((parents, leaf)) = split_path(path) else {
            return Ok(false);
        };
        if parents.is_empty() {
            return self.delete_file(leaf);
        }
        match self.directory_relative(&parents.join("/")) {
            Some(dir) => dir.delete_file(leaf),
            None => Ok(false),
        }
    }

    fn delete_directory_relative(&self, path: &str) -> Result<bool> {
        let Some((parents, leaf)) = split_path(path) else {
            return Ok(false);
        };
        if parents.is_empty() {
            return self.delete_subdirectory_recursive(leaf);
        }
        match self.directory_relative(&parents.join("/")) {
            Some(dir) => dir.delete_subdirectory_recursive(leaf),
            None => Ok(false),
        }
    }
}

fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn split_path(path: &str) -> Option<(Vec<&str>, &str)> {
    let mut parts: Vec<&str> = components(path).collect();
    let leaf = parts.pop()?;
    Some((parts, leaf))
}

/// Default copy strategy: resize `dest` to the size of `src`, then stream
/// `block_size` chunks across.
pub fn raw_copy(src: &VirtualFile, dest: &VirtualFile, block_size: usize) -> bool {
    let size = src.size();
    if dest.resize(size).is_err() {
        return false;
    }
    let block_size = block_size.max(1);
    let mut offset = 0u64;
    while offset < size {
        let chunk = match src.read_bytes(block_size, offset) {
            Ok(c) if !c.is_empty() => c,
            _ => return false,
        };
        match dest.write_at(&chunk, offset) {
            Ok(n) if n == chunk.len() => {}
            _ => return false,
        }
        offset += chunk.len() as u64;
    }
    true
}

pub(crate) fn read_only_error(name: &str) -> crate::Error {
    crate::Error::Io(io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("{name} is read-only"),
    ))
}

/// [`Read`] + [`Seek`] cursor over a [`VirtualFile`].
#[derive(Debug, Clone)]
pub struct VfsReader {
    file: VirtualFile,
    pos: u64,
}

impl VfsReader {
    pub fn new(file: VirtualFile) -> Self {
        Self { file, pos: 0 }
    }

    pub fn into_inner(self) -> VirtualFile {
        self.file
    }
}

impl Read for VfsReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self
            .file
            .read_at(buf, self.pos)
            .map_err(|e| match e {
                crate::Error::Io(e) => e,
                other => io::Error::other(other),
            })?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for VfsReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let next = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(d) => self.file.size().checked_add_signed(d),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
        };
        match next {
            Some(p) => {
                self.pos = p;
                Ok(p)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_copy_moves_every_byte_across_blocks() {
        let src: VirtualFile = VectorFile::new("src", (0..=255u8).cycle().take(1000).collect());
        let dest: VirtualFile = VectorFile::new("dest", Vec::new());
        assert!(raw_copy(&src, &dest, 64));
        assert_eq!(dest.read_all().unwrap(), src.read_all().unwrap());
    }

    #[test]
    fn relative_paths_create_intermediate_directories() {
        let root = VectorDirectory::new("root");
        let file = root.create_file_relative("a/b/c.bin").unwrap();
        file.write_at(b"xyz", 0).unwrap();
        assert!(root.directory_relative("a/b").is_some());
        assert_eq!(root.file_relative("a/b/c.bin").unwrap().read_all().unwrap(), b"xyz");
        assert!(root.delete_file_relative("a/b/c.bin").unwrap());
        assert!(root.file_relative("a/b/c.bin").is_none());
    }

    #[test]
    fn reader_seeks_and_reads_through_vfs() {
        let file: VirtualFile = VectorFile::new("f", b"0123456789".to_vec());
        let mut r = VfsReader::new(file);
        r.seek(SeekFrom::Start(4)).unwrap();
        let mut buf = [0u8; 3];
        r.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"456");
        assert!(r.seek(SeekFrom::Current(-100)).is_err());
    }

    #[test]
    fn extension_is_text_after_last_dot() {
        let file = VectorFile::new("Application_0100000000010000.cnmt", Vec::new());
        assert_eq!(file.extension().as_deref(), Some("cnmt"));
        let bare = VectorFile::new("00", Vec::new());
        assert_eq!(bare.extension(), None);
    }
}
