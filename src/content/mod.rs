//! Content-addressed stores.
//!
//! | Type | Role |
//! |------|------|
//! | [`RegisteredCache`]         | Installed archives in one directory tree, indexed by their CNMTs |
//! | [`PlaceholderCache`]        | Archives staged while an install is in progress |
//! | [`ManualContentProvider`]   | In-memory entries injected by the frontend |
//! | [`ContentProviderUnion`]    | Several providers layered by [`ContentProviderUnionSlot`] |
//!
//! Every store except the placeholder cache implements [`ContentProvider`].

mod id;
pub mod layout;
mod manual;
mod placeholder;
mod provider;
mod registered;
mod union;

pub use id::ContentId;
pub use layout::Layout;
pub use manual::ManualContentProvider;
pub use placeholder::PlaceholderCache;
pub use provider::{
    ContentProvider, ContentProviderEntry, EntryFilter, ParsingFunction, identity_parser,
};
pub use registered::{MetadataIndex, RegisteredCache};
pub use union::{ContentProviderUnion, ContentProviderUnionSlot};
