//! 16-byte content addressing key.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::vfs::{VfsFile, VirtualFile};
use crate::{Error, Result};

/// Identifies one stored archive. Rendered as 32 hex digits in file names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ContentId([u8; 0x10]);

impl ContentId {
    pub const fn new(bytes: [u8; 0x10]) -> Self {
        Self(bytes)
    }

    /// Random id, used for fresh placeholders.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 0x10];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Derive an id from the first `prefix_size` bytes of `file`.
    ///
    /// The digest is SHA-256; the id is its first 16 bytes. Returns the full
    /// digest alongside, for use as a content record hash.
    pub fn derive(file: &VirtualFile, prefix_size: usize) -> Result<([u8; 0x20], Self)> {
        let data = file.read_bytes(prefix_size, 0)?;
        let hash: [u8; 0x20] = Sha256::digest(&data).into();
        let mut id = [0u8; 0x10];
        id.copy_from_slice(&hash[..0x10]);
        Ok((hash, Self(id)))
    }

    pub fn as_bytes(&self) -> &[u8; 0x10] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// 32 hex digits in the requested case.
    pub fn to_hex(&self, upper: bool) -> String {
        if upper {
            hex::encode_upper(self.0)
        } else {
            hex::encode(self.0)
        }
    }
}

impl From<[u8; 0x10]> for ContentId {
    fn from(bytes: [u8; 0x10]) -> Self {
        Self(bytes)
    }
}

impl FromStr for ContentId {
    type Err = Error;

    /// Accepts 32 hex digits of either case.
    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 0x10];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| Error::InvalidContentId(s.to_owned()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex(false))
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({self})")
    }
}
