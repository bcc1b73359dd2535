//! Parsers for the Switch content container formats.
//!
//! All parsers follow the same conventions:
//!
//! * **Generic over** [`std::io::Read`] + [`std::io::Seek`] - header `parse`
//!   methods accept a [`std::io::Cursor`], a [`crate::vfs::VfsReader`], or
//!   anything else that implements both traits.
//! * **Metadata only** - `parse` reads headers and builds an in-memory
//!   description. File data is never eagerly loaded; containers expose
//!   their entries as [`crate::vfs::OffsetFile`] windows instead.
//! * **Decryption is separate** - [`nca::Nca`] gets its plaintext header and
//!   sections from a [`crate::decoder::ContentDecoder`].
//! * **Writers for fixtures** - the archive formats have a `build` helper
//!   (or [`nca::NcaBuilder`]) that produces a minimal valid image.
//!
//! ## Format overview
//!
//! | Module   | Format     | Description |
//! |----------|------------|-------------|
//! | [`pfs0`] | PFS0 / NSP | Flat archive; NSP packages and NCA ExeFS/Logo/Meta sections |
//! | [`hfs0`] | HFS0       | SHA-256-hashed archive embedded in XCI game cards |
//! | [`xci`]  | XCI        | Game card image; root HFS0 holds the update/normal/secure/logo partitions |
//! | [`nca`]  | NCA        | Content archive; holds program, meta, control and data content |
//! | [`cnmt`] | CNMT       | Content metadata listing the archives that make up a title |

pub mod cnmt;
pub mod hfs0;
pub mod nca;
pub mod pfs0;
pub mod xci;
