use std::cmp::Ordering;

use bstr::{BStr, BString, ByteSlice};
use vault_hash::ObjectId;

use crate::ObjectError;

/// File mode for tree entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Regular file (100644)
    Regular,
    /// Executable file (100755)
    Executable,
    /// Symbolic link (120000)
    Symlink,
    /// Submodule link (160000)
    Gitlink,
    /// Subdirectory (040000)
    Tree,
}

impl FileMode {
    /// Parse from octal ASCII bytes (e.g. `b"100644"`).
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        let raw = parse_octal(s)
            .ok_or_else(|| ObjectError::InvalidFileMode(String::from_utf8_lossy(s).into()))?;
        Self::from_raw(raw)
            .ok_or_else(|| ObjectError::InvalidFileMode(String::from_utf8_lossy(s).into()))
    }

    /// Create from the raw numeric value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0o100644 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o160000 => Some(Self::Gitlink),
            0o040000 => Some(Self::Tree),
            _ => None,
        }
    }

    /// The raw numeric value.
    pub fn raw(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Gitlink => 0o160000,
            Self::Tree => 0o40000,
        }
    }

    /// Octal ASCII form as written in tree payloads (no leading zero for
    /// directories).
    pub fn as_bytes(&self) -> BString {
        BString::from(format!("{:o}", self.raw()))
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Tree)
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, Self::Regular | Self::Executable)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, Self::Symlink)
    }

    pub fn is_gitlink(&self) -> bool {
        matches!(self, Self::Gitlink)
    }
}

fn parse_octal(s: &[u8]) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let mut val: u32 = 0;
    for &b in s {
        if !(b'0'..=b'7').contains(&b) {
            return None;
        }
        val = val.checked_mul(8)?.checked_add(u32::from(b - b'0'))?;
    }
    Some(val)
}

/// Validate a tree entry name: non-empty, no '/', not "." or "..".
pub fn validate_entry_name(name: &BStr) -> Result<(), ObjectError> {
    let reason = if name.is_empty() {
        Some("empty name")
    } else if name.contains(&b'/') {
        Some("name contains '/'")
    } else if name == "." || name == ".." {
        Some("name is '.' or '..'")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ObjectError::InvalidEntryName {
            name: BString::from(name.as_bytes()),
            reason,
        }),
        None => Ok(()),
    }
}

/// A single entry in a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: BString,
    pub id: ObjectId,
}

impl TreeEntry {
    /// Create a validated entry.
    pub fn new(
        mode: FileMode,
        name: impl Into<BString>,
        id: ObjectId,
    ) -> Result<Self, ObjectError> {
        let name = name.into();
        validate_entry_name(name.as_bstr())?;
        Ok(Self { mode, name, id })
    }

    /// Compare entries using git's tree sorting: directories compare as if
    /// their name carried a trailing '/'.
    pub fn cmp_entries(a: &TreeEntry, b: &TreeEntry) -> Ordering {
        tree_name_compare(
            a.name.as_ref(),
            a.mode.is_tree(),
            b.name.as_ref(),
            b.mode.is_tree(),
        )
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::cmp_entries(self, other)
    }
}

/// Git's tree entry name comparison: after the shared prefix, a directory
/// contributes an implicit '/' where a file contributes NUL.
fn tree_name_compare(name1: &[u8], is_dir1: bool, name2: &[u8], is_dir2: bool) -> Ordering {
    let min_len = name1.len().min(name2.len());
    let cmp = name1[..min_len].cmp(&name2[..min_len]);
    if cmp != Ordering::Equal {
        return cmp;
    }
    let c1 = if name1.len() > min_len {
        name1[min_len]
    } else if is_dir1 {
        b'/'
    } else {
        0
    };
    let c2 = if name2.len() > min_len {
        name2[min_len]
    } else if is_dir2 {
        b'/'
    } else {
        0
    };
    c1.cmp(&c2)
}

/// A tree object — an ordered directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a tree payload. Each entry is `<octal-mode> <name>\0<20 id bytes>`.
    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        let mut entries = Vec::new();
        let mut pos = 0;
        while pos < payload.len() {
            let (entry, next) = parse_one_entry(payload, pos)?;
            entries.push(entry);
            pos = next;
        }
        Ok(Self { entries })
    }

    /// Serialize to the canonical payload: entries in tree sort order.
    pub fn serialize_payload(&self) -> Vec<u8> {
        let mut sorted = self.entries.clone();
        sorted.sort();

        let mut out = Vec::new();
        for entry in &sorted {
            out.extend_from_slice(&entry.mode.as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.id.as_bytes());
        }
        out
    }

    /// Sort entries in place.
    pub fn sort(&mut self) {
        self.entries.sort();
    }

    /// Find an entry by name.
    pub fn find(&self, name: &BStr) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_bstr() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse the entry starting at `start`. Returns the entry and the offset
/// just past its ID bytes.
fn parse_one_entry(payload: &[u8], start: usize) -> Result<(TreeEntry, usize), ObjectError> {
    let entry_error = |offset: usize, reason: &str| ObjectError::InvalidTreeEntry {
        offset,
        reason: reason.into(),
    };

    let space = payload[start..]
        .iter()
        .position(|&b| b == b' ')
        .map(|p| p + start)
        .ok_or_else(|| entry_error(start, "missing space after mode"))?;
    let mode = FileMode::from_bytes(&payload[start..space])
        .map_err(|_| entry_error(start, "invalid mode"))?;

    let name_start = space + 1;
    let nul = payload[name_start..]
        .iter()
        .position(|&b| b == 0)
        .map(|p| p + name_start)
        .ok_or_else(|| entry_error(name_start, "missing null after name"))?;
    let name = BString::from(&payload[name_start..nul]);
    validate_entry_name(name.as_bstr())?;

    let id_start = nul + 1;
    let id_bytes = payload
        .get(id_start..id_start + 20)
        .ok_or_else(|| entry_error(id_start, "truncated object id"))?;
    let id = ObjectId::from_bytes(id_bytes)?;

    Ok((TreeEntry { mode, name, id }, id_start + 20))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_roundtrip() {
        for mode in [
            FileMode::Regular,
            FileMode::Executable,
            FileMode::Symlink,
            FileMode::Gitlink,
            FileMode::Tree,
        ] {
            assert_eq!(FileMode::from_bytes(&mode.as_bytes()).unwrap(), mode);
        }
    }

    #[test]
    fn tree_mode_has_no_leading_zero() {
        assert_eq!(FileMode::Tree.as_bytes(), "40000");
    }

    #[test]
    fn unknown_mode_rejected() {
        assert!(FileMode::from_bytes(b"100600").is_err());
        assert!(FileMode::from_raw(0o777).is_none());
    }

    #[test]
    fn dir_sorts_after_dot_file() {
        // "foo" (dir) compares as "foo/"; '/' > '.', so it lands after "foo.c".
        let dir = TreeEntry {
            mode: FileMode::Tree,
            name: BString::from("foo"),
            id: ObjectId::NULL,
        };
        let file = TreeEntry {
            mode: FileMode::Regular,
            name: BString::from("foo.c"),
            id: ObjectId::NULL,
        };
        assert_eq!(TreeEntry::cmp_entries(&dir, &file), Ordering::Greater);
    }

    #[test]
    fn dir_sorts_after_hyphenated_file() {
        let dir = TreeEntry {
            mode: FileMode::Tree,
            name: BString::from("foo"),
            id: ObjectId::NULL,
        };
        let file = TreeEntry {
            mode: FileMode::Regular,
            name: BString::from("foo-bar"),
            id: ObjectId::NULL,
        };
        assert_eq!(TreeEntry::cmp_entries(&dir, &file), Ordering::Greater);
    }

    #[test]
    fn parse_empty_tree() {
        assert!(Tree::parse(b"").unwrap().is_empty());
    }

    #[test]
    fn parse_single_entry() {
        let id = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        let mut data = Vec::new();
        data.extend_from_slice(b"100644 hello.txt\0");
        data.extend_from_slice(id.as_bytes());

        let tree = Tree::parse(&data).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.entries[0].mode, FileMode::Regular);
        assert_eq!(tree.entries[0].name, "hello.txt");
        assert_eq!(tree.entries[0].id, id);
    }

    #[test]
    fn serialize_sorts_and_is_idempotent() {
        let id = ObjectId::NULL;
        let tree = Tree {
            entries: vec![
                TreeEntry {
                    mode: FileMode::Regular,
                    name: BString::from("b.txt"),
                    id,
                },
                TreeEntry {
                    mode: FileMode::Tree,
                    name: BString::from("a-dir"),
                    id,
                },
            ],
        };

        let once = tree.serialize_payload();
        let parsed = Tree::parse(&once).unwrap();
        assert_eq!(parsed.entries[0].name, "a-dir");
        assert_eq!(parsed.entries[1].name, "b.txt");
        assert_eq!(parsed.serialize_payload(), once);
    }

    #[test]
    fn entry_name_validation() {
        assert!(TreeEntry::new(FileMode::Regular, "ok.txt", ObjectId::NULL).is_ok());
        assert!(TreeEntry::new(FileMode::Regular, "", ObjectId::NULL).is_err());
        assert!(TreeEntry::new(FileMode::Regular, "a/b", ObjectId::NULL).is_err());
        assert!(TreeEntry::new(FileMode::Regular, ".", ObjectId::NULL).is_err());
        assert!(TreeEntry::new(FileMode::Regular, "..", ObjectId::NULL).is_err());
    }

    #[test]
    fn parse_rejects_bad_names() {
        let id = ObjectId::NULL;
        let mut data = Vec::new();
        data.extend_from_slice(b"100644 ..\0");
        data.extend_from_slice(id.as_bytes());
        assert!(Tree::parse(&data).is_err());
    }

    #[test]
    fn find_entry() {
        let id = ObjectId::NULL;
        let tree = Tree {
            entries: vec![
                TreeEntry {
                    mode: FileMode::Regular,
                    name: BString::from("README.md"),
                    id,
                },
                TreeEntry {
                    mode: FileMode::Tree,
                    name: BString::from("src"),
                    id,
                },
            ],
        };
        assert!(tree.find(BStr::new("README.md")).is_some());
        assert!(tree.find(BStr::new("missing")).is_none());
    }
}
