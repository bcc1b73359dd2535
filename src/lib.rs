//! **hakcache** - a content-addressed store for Nintendo Switch content
//! archives, with layered lookup across several backing stores.
//!
//! # Layers
//! | Module | Role |
//! |--------|------|
//! | [`vfs`]      | File and directory capability the store is written against |
//! | [`decoder`]  | Seam for turning raw archive bytes into plaintext sections |
//! | [`formats`]  | NCA, XCI, CNMT, PFS0 and HFS0 parsers |
//! | [`content`]  | Registered, placeholder, manual and union stores |
//! | [`config`]   | YAML store configuration |
//! | [`store`]    | All stores of one emulated console, opened from a config |
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use hakcache::config::StoreConfig;
//! use hakcache::content::ContentProvider;
//! use hakcache::decoder::PlaintextDecoder;
//! use hakcache::formats::cnmt::ContentRecordType;
//! use hakcache::store::ContentStore;
//! use hakcache::vfs::VfsFile;
//!
//! let config = StoreConfig::load("store.yaml")?;
//! let store = ContentStore::open(&config, Arc::new(PlaintextDecoder))?;
//! if let Some(program) = store
//!     .union()
//!     .entry_raw(0x0100_0000_0001_0000, ContentRecordType::Program)
//! {
//!     println!("{}", program.name());
//! }
//! # Ok::<(), hakcache::Error>(())
//! ```

pub mod config;
pub mod content;
pub mod decoder;
pub mod error;
pub mod formats;
pub mod store;
pub(crate) mod utils;
pub mod vfs;

pub use error::{Error, InstallResult, LoadStatus, Result};
