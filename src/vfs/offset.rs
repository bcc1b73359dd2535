//! Byte window over another file.

use std::sync::Arc;

use super::{VfsFile, VirtualFile, read_only_error};
use crate::{Error, Result};

/// Read-only view of `size` bytes of `base` starting at `offset`.
///
/// Container parsers hand these out for entries inside a partition so no
/// payload is ever copied.
#[derive(Debug)]
pub struct OffsetFile {
    base: VirtualFile,
    name: String,
    offset: u64,
    size: u64,
}

impl OffsetFile {
    /// Returns [`Error::InvalidRange`] if the window extends past the end of `base`.
    pub fn new(
        base: VirtualFile,
        name: impl Into<String>,
        offset: u64,
        size: u64,
    ) -> Result<Arc<Self>> {
        let end = offset.checked_add(size).ok_or(Error::InvalidRange)?;
        if end > base.size() {
            return Err(Error::InvalidRange);
        }
        Ok(Arc::new(Self {
            base,
            name: name.into(),
            offset,
            size,
        }))
    }

    pub fn base(&self) -> &VirtualFile {
        &self.base
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl VfsFile for OffsetFile {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn resize(&self, _new_size: u64) -> Result<()> {
        Err(read_only_error(&self.name))
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }
        let avail = self.size - offset;
        let len = buf.len().min(usize::try_from(avail).unwrap_or(usize::MAX));
        self.base.read_at(&mut buf[..len], self.offset + offset)
    }

    fn write_at(&self, _data: &[u8], _offset: u64) -> Result<usize> {
        Err(read_only_error(&self.name))
    }

    fn is_writable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::VectorFile;

    #[test]
    fn window_is_clamped_to_its_range() {
        let base: VirtualFile = VectorFile::new("base", b"abcdefghij".to_vec());
        let window = OffsetFile::new(base.clone(), "w", 2, 4).unwrap();
        assert_eq!(window.read_all().unwrap(), b"cdef");
        assert_eq!(window.read_bytes(10, 3).unwrap(), b"f");
        assert!(OffsetFile::new(base, "bad", 8, 4).is_err());
    }
}
