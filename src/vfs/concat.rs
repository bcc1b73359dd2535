//! Several files joined end to end into one logical stream.

use std::sync::Arc;

use super::{VfsFile, VirtualFile, read_only_error};
use crate::Result;

/// Read-only concatenation of `parts` in the given order.
#[derive(Debug)]
pub struct ConcatenatedFile {
    name: String,
    /// `(start offset within the logical stream, part)`, ascending.
    parts: Vec<(u64, VirtualFile)>,
    size: u64,
}

impl ConcatenatedFile {
    pub fn new(name: impl Into<String>, parts: Vec<VirtualFile>) -> Arc<Self> {
        let mut offset = 0u64;
        let mut indexed = Vec::with_capacity(parts.len());
        for part in parts {
            let len = part.size();
            indexed.push((offset, part));
            offset += len;
        }
        Arc::new(Self {
            name: name.into(),
            parts: indexed,
            size: offset,
        })
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }
}

impl VfsFile for ConcatenatedFile {
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
        // Last part whose start is <= offset.
        let mut idx = self.parts.partition_point(|(start, _)| *start <= offset) - 1;
        let mut done = 0usize;
        let mut pos = offset;
        while done < buf.len() && idx < self.parts.len() {
            let (start, part) = &self.parts[idx];
            let n = part.read_at(&mut buf[done..], pos - start)?;
            if n == 0 {
                idx += 1;
                continue;
            }
            done += n;
            pos += n as u64;
            if pos >= start + part.size() {
                idx += 1;
            }
        }
        Ok(done)
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
    fn reads_span_part_boundaries() {
        let parts: Vec<VirtualFile> = vec![
            VectorFile::new("00", b"abc".to_vec()),
            VectorFile::new("01", Vec::new()),
            VectorFile::new("02", b"defg".to_vec()),
        ];
        let joined = ConcatenatedFile::new("00", parts);
        assert_eq!(joined.size(), 7);
        assert_eq!(joined.read_all().unwrap(), b"abcdefg");
        assert_eq!(joined.read_bytes(3, 2).unwrap(), b"cde");
        assert_eq!(joined.read_bytes(4, 6).unwrap(), b"g");
    }
}
