//! Store configuration.
//!
//! Loaded from a YAML file:
//!
//! ```yaml
//! system_dir: nand/system/Contents/registered
//! user_dir: nand/user/Contents/registered
//! sdmc_dir: sdmc/Nintendo/Contents/registered   # optional
//! system_placeholder_dir: nand/system/Contents/placehld
//! user_placeholder_dir: nand/user/Contents/placehld
//! cache:                                          # optional
//!   overlay_dir_name: overlay_meta
//!   copy_block_size: 4194304
//!   digest_prefix_size: 1048576
//! ```
//!
//! Relative paths are resolved against the config file's parent directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Overlay subdirectory holding synthesized metadata blobs.
pub const DEFAULT_OVERLAY_DIR_NAME: &str = "overlay_meta";
/// Block size handed to copy functions during installs.
pub const DEFAULT_COPY_BLOCK_SIZE: usize = 0x40_0000;
/// Bytes of an archive hashed to derive its content id.
pub const DEFAULT_DIGEST_PREFIX_SIZE: usize = 0x10_0000;

/// Per-cache tunables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    pub overlay_dir_name: String,
    pub copy_block_size: usize,
    pub digest_prefix_size: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            overlay_dir_name: DEFAULT_OVERLAY_DIR_NAME.to_owned(),
            copy_block_size: DEFAULT_COPY_BLOCK_SIZE,
            digest_prefix_size: DEFAULT_DIGEST_PREFIX_SIZE,
        }
    }
}

impl CacheOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        let name = &self.overlay_dir_name;
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::Config(format!("invalid overlay_dir_name {name:?}")));
        }
        if self.copy_block_size == 0 {
            return Err(Error::Config("copy_block_size must be non-zero".into()));
        }
        if self.digest_prefix_size == 0 {
            return Err(Error::Config("digest_prefix_size must be non-zero".into()));
        }
        Ok(())
    }
}

/// Raw config file schema (matches the YAML structure).
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    system_dir: String,
    user_dir: String,
    #[serde(default)]
    sdmc_dir: Option<String>,
    #[serde(default)]
    system_placeholder_dir: Option<String>,
    #[serde(default)]
    user_placeholder_dir: Option<String>,
    #[serde(default)]
    cache: CacheOptions,
}

/// Resolved configuration with absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub system_dir: PathBuf,
    pub user_dir: PathBuf,
    pub sdmc_dir: Option<PathBuf>,
    pub system_placeholder_dir: PathBuf,
    pub user_placeholder_dir: PathBuf,
    pub cache: CacheOptions,
}

impl StoreConfig {
    /// Conventional layout below a single emulated storage root.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            system_dir: root.join("nand/system/Contents/registered"),
            user_dir: root.join("nand/user/Contents/registered"),
            sdmc_dir: Some(root.join("sdmc/Nintendo/Contents/registered")),
            system_placeholder_dir: root.join("nand/system/Contents/placehld"),
            user_placeholder_dir: root.join("nand/user/Contents/placehld"),
            cache: CacheOptions::default(),
        }
    }

    /// Load and resolve a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let base = path.parent().unwrap_or(Path::new("."));
        Self::from_yaml(&text, base)
    }

    /// Parse YAML, resolving relative paths against `base`.
    pub fn from_yaml(text: &str, base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref();
        let raw: ConfigFile =
            serde_yaml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        raw.cache.validate()?;

        let system_dir = resolve_path(base, &raw.system_dir);
        let user_dir = resolve_path(base, &raw.user_dir);
        let system_placeholder_dir = match &raw.system_placeholder_dir {
            Some(p) => resolve_path(base, p),
            None => sibling(&system_dir, "placehld"),
        };
        let user_placeholder_dir = match &raw.user_placeholder_dir {
            Some(p) => resolve_path(base, p),
            None => sibling(&user_dir, "placehld"),
        };

        Ok(Self {
            system_dir,
            user_dir,
            sdmc_dir: raw.sdmc_dir.as_deref().map(|p| resolve_path(base, p)),
            system_placeholder_dir,
            user_placeholder_dir,
            cache: raw.cache,
        })
    }
}

fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// `dir`'s sibling named `name` (`.../Contents/registered` -> `.../Contents/placehld`).
fn sibling(dir: &Path, name: &str) -> PathBuf {
    match dir.parent() {
        Some(parent) => parent.join(name),
        None => dir.join(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_against_base() {
        let yaml = "system_dir: nand/system/Contents/registered\n\
                    user_dir: /abs/user/registered\n";
        let config = StoreConfig::from_yaml(yaml, "/emu").unwrap();
        assert_eq!(config.system_dir, PathBuf::from("/emu/nand/system/Contents/registered"));
        assert_eq!(config.user_dir, PathBuf::from("/abs/user/registered"));
        assert_eq!(config.user_placeholder_dir, PathBuf::from("/abs/user/placehld"));
        assert_eq!(config.sdmc_dir, None);
        assert_eq!(config.cache, CacheOptions::default());
    }

    #[test]
    fn cache_section_overrides_defaults() {
        let yaml = "system_dir: s\nuser_dir: u\ncache:\n  overlay_dir_name: side_meta\n";
        let config = StoreConfig::from_yaml(yaml, "/").unwrap();
        assert_eq!(config.cache.overlay_dir_name, "side_meta");
        assert_eq!(config.cache.copy_block_size, DEFAULT_COPY_BLOCK_SIZE);
    }

    #[test]
    fn nested_overlay_name_is_rejected() {
        let yaml = "system_dir: s\nuser_dir: u\ncache:\n  overlay_dir_name: a/b\n";
        assert!(matches!(
            StoreConfig::from_yaml(yaml, "/"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn missing_required_field_is_config_error() {
        assert!(matches!(
            StoreConfig::from_yaml("user_dir: u\n", "/"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn load_reads_file_next_to_base() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("store.yaml");
        std::fs::write(&path, "system_dir: sys\nuser_dir: usr\nsdmc_dir: sd\n").unwrap();
        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.system_dir, tmp.path().join("sys"));
        assert_eq!(config.sdmc_dir, Some(tmp.path().join("sd")));
    }
}
