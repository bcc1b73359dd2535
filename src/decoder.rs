//! Seam to the decryption engine.
//!
//! Content archives are stored encrypted. Turning them into plaintext (key
//! derivation, title-key unwrapping, AES-XTS header and AES-CTR section
//! decryption) is the job of an external engine; the store only needs two
//! things from it, captured by [`ContentDecoder`].
//!
//! [`PlaintextDecoder`] is the identity engine for archives that are
//! already decrypted: the header is read verbatim and section `i` is the
//! byte range described by fs entry `i`.

use std::fmt;

use crate::formats::nca::{NCA_HEADER_SIZE, NcaHeader};
use crate::vfs::{OffsetFile, VfsFile, VirtualFile};
use crate::{Error, Result};

/// Produces plaintext views of a content archive.
pub trait ContentDecoder: Send + Sync + fmt::Debug {
    /// Plaintext of the first [`NCA_HEADER_SIZE`] bytes of `file` (main
    /// header followed by the four fs headers).
    fn decrypt_header(&self, file: &VirtualFile) -> Result<Vec<u8>>;

    /// Plaintext stream of section `index`, as described by `header`.
    fn open_section(
        &self,
        file: &VirtualFile,
        header: &NcaHeader,
        index: usize,
    ) -> Result<VirtualFile>;
}

/// Identity decoder for already-decrypted archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextDecoder;

impl ContentDecoder for PlaintextDecoder {
    fn decrypt_header(&self, file: &VirtualFile) -> Result<Vec<u8>> {
        let bytes = file.read_bytes(NCA_HEADER_SIZE, 0)?;
        if bytes.len() != NCA_HEADER_SIZE {
            return Err(Error::UnexpectedEof);
        }
        Ok(bytes)
    }

    fn open_section(
        &self,
        file: &VirtualFile,
        header: &NcaHeader,
        index: usize,
    ) -> Result<VirtualFile> {
        let (offset, size) = header.section_range(index).ok_or(Error::InvalidRange)?;
        Ok(OffsetFile::new(
            file.clone(),
            format!("section{index}"),
            offset,
            size,
        )?)
    }
}
