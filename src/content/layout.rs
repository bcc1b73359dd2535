//! Mapping between content ids and paths inside a cache directory.
//!
//! Three naming choices have been used by different installer
//! generations: hex case, sharded vs flat placement, and a `.cnmt.nca`
//! suffix for meta archives. Only the combinations in [`Layout`] are legal
//! (the suffix never appears in a sharded tree).
//!
//! ```text
//! UpperSharded   000000AB/AB0123...EF.nca
//! UpperFlat      AB0123...EF.nca
//! LowerSharded   000000AB/ab0123...ef.nca
//! LowerFlat      ab0123...ef.nca
//! LowerFlatMeta  ab0123...ef.cnmt.nca
//! UpperFlatMeta  AB0123...EF.cnmt.nca
//! ```
//!
//! The shard directory is selected by the id's leading byte and is always
//! written in upper case.
//!
//! Any of those leaves may be a directory instead of a file, holding the
//! archive split into parts named `00`, `01`, ... `FF`.

use super::ContentId;
use crate::vfs::{ConcatenatedFile, VfsDirectory, VirtualDir, VirtualFile};

/// A legal combination of hex case, shard placement and suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    UpperSharded,
    UpperFlat,
    LowerSharded,
    LowerFlat,
    LowerFlatMeta,
    UpperFlatMeta,
}

impl Layout {
    /// Lookup order.
    pub const LOOKUP_ORDER: [Layout; 6] = [
        Layout::UpperSharded,
        Layout::UpperFlat,
        Layout::LowerSharded,
        Layout::LowerFlat,
        Layout::LowerFlatMeta,
        Layout::UpperFlatMeta,
    ];

    /// Layout used for every write.
    pub const INSTALL: Layout = Layout::LowerSharded;

    /// Returns `None` for the illegal sharded + suffixed combinations.
    pub fn new(upper: bool, sharded: bool, suffixed: bool) -> Option<Self> {
        match (upper, sharded, suffixed) {
            (true, true, false) => Some(Layout::UpperSharded),
            (true, false, false) => Some(Layout::UpperFlat),
            (false, true, false) => Some(Layout::LowerSharded),
            (false, false, false) => Some(Layout::LowerFlat),
            (false, false, true) => Some(Layout::LowerFlatMeta),
            (true, false, true) => Some(Layout::UpperFlatMeta),
            (_, true, true) => None,
        }
    }

    pub fn is_upper(self) -> bool {
        matches!(
            self,
            Layout::UpperSharded | Layout::UpperFlat | Layout::UpperFlatMeta
        )
    }

    pub fn is_sharded(self) -> bool {
        matches!(self, Layout::UpperSharded | Layout::LowerSharded)
    }

    pub fn is_suffixed(self) -> bool {
        matches!(self, Layout::LowerFlatMeta | Layout::UpperFlatMeta)
    }

    /// Relative path of `id` under this layout.
    pub fn path_for(self, id: &ContentId) -> String {
        let name = id.to_hex(self.is_upper());
        let ext = if self.is_suffixed() { "cnmt.nca" } else { "nca" };
        if self.is_sharded() {
            format!("{}/{name}.{ext}", shard_dir_name(id))
        } else {
            format!("{name}.{ext}")
        }
    }
}

/// Name of the shard directory holding `id`.
pub fn shard_dir_name(id: &ContentId) -> String {
    format!("000000{:02X}", id.as_bytes()[0])
}

/// Open the file at `path`, or reassemble it if `path` is a part directory.
pub fn open_file_or_parts(dir: &VirtualDir, path: &str) -> Option<VirtualFile> {
    if let Some(file) = dir.file_relative(path) {
        return Some(file);
    }
    let parts_dir = dir.directory_relative(path)?;

    let files = parts_dir.files().ok()?;
    if let [only] = files.as_slice() {
        if only.name() == "00" {
            return Some(only.clone());
        }
    }

    let mut parts = Vec::new();
    for i in 0..0x100usize {
        let part = parts_dir
            .file(&format!("{i:02X}"))
            .or_else(|| parts_dir.file(&format!("{i:02x}")));
        match part {
            Some(p) => parts.push(p),
            None => break,
        }
    }
    let first = parts.first()?.name();
    Some(ConcatenatedFile::new(first, parts))
}

/// Try every layout in [`Layout::LOOKUP_ORDER`] and return the first hit.
pub fn locate(dir: &VirtualDir, id: &ContentId) -> Option<VirtualFile> {
    Layout::LOOKUP_ORDER
        .iter()
        .find_map(|layout| open_file_or_parts(dir, &layout.path_for(id)))
}

/// Every layout under which `id` currently exists, in lookup order.
pub fn existing_layouts(dir: &VirtualDir, id: &ContentId) -> Vec<Layout> {
    Layout::LOOKUP_ORDER
        .into_iter()
        .filter(|layout| {
            let path = layout.path_for(id);
            dir.file_relative(&path).is_some() || dir.directory_relative(&path).is_some()
        })
        .collect()
}

/// Parse an archive leaf name (`<32 hex>.nca` or `<32 hex>.cnmt.nca`, any
/// case) back to its id.
pub fn parse_archive_name(name: &str) -> Option<ContentId> {
    let lower = name.to_ascii_lowercase();
    let stem = match lower.len() {
        36 => lower.strip_suffix(".nca")?,
        41 => lower.strip_suffix(".cnmt.nca")?,
        _ => return None,
    };
    stem.parse().ok()
}

fn is_shard_dir_name(name: &str) -> bool {
    name.len() == 8
        && name.starts_with("000000")
        && name[6..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// Every content id present anywhere in `dir`, as file or part directory,
/// flat or sharded. Ids may repeat if stored under several layouts.
pub fn scan(dir: &VirtualDir) -> crate::Result<Vec<ContentId>> {
    let mut ids = Vec::new();
    for sub in dir.subdirectories()? {
        let name = sub.name();
        if let Some(id) = parse_archive_name(&name) {
            ids.push(id);
            continue;
        }
        if !is_shard_dir_name(&name) {
            continue;
        }
        for nested in sub.subdirectories()? {
            ids.extend(parse_archive_name(&nested.name()));
        }
        for file in sub.files()? {
            ids.extend(parse_archive_name(&file.name()));
        }
    }
    for file in dir.files()? {
        ids.extend(parse_archive_name(&file.name()));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::vfs::{VectorDirectory, VfsFile};

    const ID: ContentId = ContentId::new([
        0xAB, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55,
        0x66,
    ]);

    #[rstest]
    #[case(Layout::UpperSharded, "000000AB/AB0123456789ABCDEF00112233445566.nca")]
    #[case(Layout::UpperFlat, "AB0123456789ABCDEF00112233445566.nca")]
    #[case(Layout::LowerSharded, "000000AB/ab0123456789abcdef00112233445566.nca")]
    #[case(Layout::LowerFlat, "ab0123456789abcdef00112233445566.nca")]
    #[case(Layout::LowerFlatMeta, "ab0123456789abcdef00112233445566.cnmt.nca")]
    #[case(Layout::UpperFlatMeta, "AB0123456789ABCDEF00112233445566.cnmt.nca")]
    fn paths(#[case] layout: Layout, #[case] expected: &str) {
        assert_eq!(layout.path_for(&ID), expected);
        assert_eq!(
            Layout::new(layout.is_upper(), layout.is_sharded(), layout.is_suffixed()),
            Some(layout)
        );
    }

    #[test]
    fn sharded_suffix_is_illegal() {
        assert_eq!(Layout::new(true, true, true), None);
        assert_eq!(Layout::new(false, true, true), None);
    }

    #[rstest]
    #[case(Layout::UpperSharded)]
    #[case(Layout::UpperFlat)]
    #[case(Layout::LowerSharded)]
    #[case(Layout::LowerFlat)]
    #[case(Layout::LowerFlatMeta)]
    #[case(Layout::UpperFlatMeta)]
    fn locate_finds_every_layout(#[case] layout: Layout) {
        let root: VirtualDir = VectorDirectory::new("root");
        let file = root.create_file_relative(&layout.path_for(&ID)).unwrap();
        file.write_at(b"archive", 0).unwrap();
        let found = locate(&root, &ID).unwrap();
        assert_eq!(found.read_all().unwrap(), b"archive");
        assert_eq!(existing_layouts(&root, &ID), vec![layout]);
        assert_eq!(scan(&root).unwrap(), vec![ID]);
    }

    #[test]
    fn part_directory_is_concatenated_in_order() {
        let root: VirtualDir = VectorDirectory::new("root");
        let parts = root
            .create_directory_relative(&Layout::LowerSharded.path_for(&ID))
            .unwrap();
        for (name, data) in [("02", b"ghi"), ("00", b"abc"), ("01", b"def")] {
            parts.create_file(name).unwrap().write_at(data, 0).unwrap();
        }
        let joined = locate(&root, &ID).unwrap();
        assert_eq!(joined.read_all().unwrap(), b"abcdefghi");
        assert_eq!(joined.name(), "00");
        assert_eq!(scan(&root).unwrap(), vec![ID]);
    }

    #[test]
    fn single_part_is_returned_directly() {
        let root: VirtualDir = VectorDirectory::new("root");
        let parts = root
            .create_directory_relative(&Layout::UpperFlat.path_for(&ID))
            .unwrap();
        parts.create_file("00").unwrap().write_at(b"solo", 0).unwrap();
        assert_eq!(locate(&root, &ID).unwrap().read_all().unwrap(), b"solo");
    }

    #[test]
    fn parts_stop_at_first_gap() {
        let root: VirtualDir = VectorDirectory::new("root");
        let parts = root
            .create_directory_relative(&Layout::LowerFlat.path_for(&ID))
            .unwrap();
        for (name, data) in [("00", b"a"), ("01", b"b"), ("03", b"d")] {
            parts.create_file(name).unwrap().write_at(data, 0).unwrap();
        }
        assert_eq!(locate(&root, &ID).unwrap().read_all().unwrap(), b"ab");
    }

    #[test]
    fn missing_id_is_none() {
        let root: VirtualDir = VectorDirectory::new("root");
        assert!(locate(&root, &ID).is_none());
        root.create_directory_relative(&Layout::LowerFlat.path_for(&ID))
            .unwrap();
        assert!(locate(&root, &ID).is_none());
    }

    #[test]
    fn scan_ignores_foreign_names() {
        let root: VirtualDir = VectorDirectory::new("root");
        root.create_file("readme.txt").unwrap();
        root.create_file_relative("overlay_meta/Application_0100000000010000.cnmt")
            .unwrap();
        root.create_file_relative("000000ZZ/ab0123456789abcdef00112233445566.nca")
            .unwrap();
        assert!(scan(&root).unwrap().is_empty());
    }

    #[rstest]
    #[case("AB0123456789ABCDEF00112233445566.nca", true)]
    #[case("ab0123456789abcdef00112233445566.CNMT.NCA", true)]
    #[case("ab0123456789abcdef0011223344556.nca", false)]
    #[case("ab0123456789abcdef00112233445566.nsp", false)]
    fn archive_names(#[case] name: &str, #[case] ok: bool) {
        assert_eq!(parse_archive_name(name).is_some(), ok);
    }
}
