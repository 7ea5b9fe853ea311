//! The `packed-refs` table.
//!
//! Format:
//! ```text
//! # pack-refs with: peeled fully-peeled sorted
//! <hex-id> <refname>
//! ^<hex-id>          (peeled target of the annotated tag above)
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use vault_hash::ObjectId;
use vault_util::lockfile::LockFile;

use crate::{RefError, RefName};

/// One packed ref entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedRef {
    pub name: RefName,
    pub id: ObjectId,
    /// Peeled target for annotated tags.
    pub peeled: Option<ObjectId>,
}

/// Parsed `packed-refs` contents.
#[derive(Debug, Clone, Default)]
pub struct PackedRefs {
    refs: Vec<PackedRef>,
    sorted: bool,
}

impl PackedRefs {
    /// Parse the table from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self, RefError> {
        let mut refs = Vec::new();
        let mut sorted = false;

        for line in data.lines() {
            if line.is_empty() {
                continue;
            }
            if line.starts_with(b"#") {
                if line.find(b"sorted").is_some() {
                    sorted = true;
                }
                continue;
            }
            if let Some(peeled_hex) = line.strip_prefix(b"^") {
                let hex = std::str::from_utf8(peeled_hex)
                    .map_err(|_| RefError::Parse("non-UTF-8 peeled id".into()))?;
                let peeled = ObjectId::from_hex(hex.trim())?;
                match refs.last_mut() {
                    Some(last) => {
                        let entry: &mut PackedRef = last;
                        entry.peeled = Some(peeled);
                    }
                    None => return Err(RefError::Parse("peeled line without a ref".into())),
                }
                continue;
            }

            let space = line
                .find_byte(b' ')
                .ok_or_else(|| RefError::Parse("missing space in packed-refs line".into()))?;
            let hex = std::str::from_utf8(&line[..space])
                .map_err(|_| RefError::Parse("non-UTF-8 packed id".into()))?;
            let id = ObjectId::from_hex(hex)?;
            let name_str = std::str::from_utf8(&line[space + 1..])
                .map_err(|_| RefError::Parse("non-UTF-8 packed ref name".into()))?;
            refs.push(PackedRef {
                name: RefName::new(name_str.trim())?,
                id,
                peeled: None,
            });
        }

        Ok(Self { refs, sorted })
    }

    /// Load from disk; an absent file is an empty table.
    pub fn load(git_dir: &Path) -> Result<Self, RefError> {
        let path = packed_refs_path(git_dir);
        let data = match fs::read(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self {
                    refs: Vec::new(),
                    sorted: true,
                })
            }
            Err(e) => return Err(RefError::IoPath { path, source: e }),
        };
        Self::parse(&data)
    }

    /// Look up one ref.
    pub fn find(&self, name: &RefName) -> Option<&PackedRef> {
        if self.sorted {
            self.refs
                .binary_search_by(|r| r.name.cmp(name))
                .ok()
                .map(|i| &self.refs[i])
        } else {
            self.refs.iter().find(|r| r.name == *name)
        }
    }

    /// Rewrite the table atomically.
    pub fn write(&self, git_dir: &Path) -> Result<(), RefError> {
        let path = packed_refs_path(git_dir);
        let mut lock = LockFile::acquire(&path)?;

        let mut sorted_refs = self.refs.clone();
        sorted_refs.sort_by(|a, b| a.name.cmp(&b.name));

        let mut out = Vec::new();
        out.extend_from_slice(b"# pack-refs with: peeled fully-peeled sorted \n");
        for entry in &sorted_refs {
            out.extend_from_slice(format!("{} {}\n", entry.id.to_hex(), entry.name).as_bytes());
            if let Some(peeled) = &entry.peeled {
                out.extend_from_slice(format!("^{}\n", peeled.to_hex()).as_bytes());
            }
        }

        lock.write_all(&out).map_err(|e| RefError::IoPath {
            path: path.clone(),
            source: e,
        })?;
        lock.commit()?;
        Ok(())
    }

    /// Insert or replace an entry.
    pub fn upsert(&mut self, name: RefName, id: ObjectId, peeled: Option<ObjectId>) {
        if let Some(existing) = self.refs.iter_mut().find(|r| r.name == name) {
            existing.id = id;
            existing.peeled = peeled;
            return;
        }
        self.refs.push(PackedRef { name, id, peeled });
        self.refs.sort_by(|a, b| a.name.cmp(&b.name));
        self.sorted = true;
    }

    /// Drop an entry, reporting whether it existed.
    pub fn remove(&mut self, name: &RefName) -> bool {
        let before = self.refs.len();
        self.refs.retain(|r| r.name != *name);
        self.refs.len() < before
    }

    pub fn refs(&self) -> &[PackedRef] {
        &self.refs
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

fn packed_refs_path(git_dir: &Path) -> PathBuf {
    git_dir.join("packed-refs")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(c: char) -> ObjectId {
        ObjectId::from_hex(&c.to_string().repeat(40)).unwrap()
    }

    #[test]
    fn parse_empty() {
        assert!(PackedRefs::parse(b"").unwrap().is_empty());
    }

    #[test]
    fn parse_with_header_and_peeled() {
        let data = b"# pack-refs with: peeled fully-peeled sorted \n\
                     aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa refs/tags/v1.0\n\
                     ^bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb\n\
                     cccccccccccccccccccccccccccccccccccccccc refs/heads/main\n";
        let packed = PackedRefs::parse(data).unwrap();
        assert_eq!(packed.refs().len(), 2);
        assert_eq!(packed.refs()[0].peeled, Some(oid('b')));
        assert_eq!(packed.refs()[1].peeled, None);
    }

    #[test]
    fn stray_peeled_line_is_an_error() {
        assert!(PackedRefs::parse(b"^aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n").is_err());
    }

    #[test]
    fn find_uses_binary_search_when_sorted() {
        let data = b"# pack-refs with: peeled fully-peeled sorted \n\
                     aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa refs/heads/alpha\n\
                     bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb refs/heads/beta\n";
        let packed = PackedRefs::parse(data).unwrap();
        assert_eq!(
            packed
                .find(&RefName::new("refs/heads/beta").unwrap())
                .unwrap()
                .id,
            oid('b')
        );
        assert!(packed
            .find(&RefName::new("refs/heads/gamma").unwrap())
            .is_none());
    }

    #[test]
    fn write_and_reload_preserves_peeled() {
        let dir = tempfile::tempdir().unwrap();
        let mut packed = PackedRefs::default();
        packed.upsert(RefName::new("refs/heads/main").unwrap(), oid('a'), None);
        packed.upsert(
            RefName::new("refs/tags/v1.0").unwrap(),
            oid('b'),
            Some(oid('c')),
        );
        packed.write(dir.path()).unwrap();

        let loaded = PackedRefs::load(dir.path()).unwrap();
        assert_eq!(loaded.refs().len(), 2);
        let tag = loaded.find(&RefName::new("refs/tags/v1.0").unwrap()).unwrap();
        assert_eq!(tag.peeled, Some(oid('c')));
    }

    #[test]
    fn upsert_replaces_and_remove_drops() {
        let mut packed = PackedRefs::default();
        let name = RefName::new("refs/heads/main").unwrap();
        packed.upsert(name.clone(), oid('a'), None);
        packed.upsert(name.clone(), oid('b'), None);
        assert_eq!(packed.refs().len(), 1);
        assert_eq!(packed.find(&name).unwrap().id, oid('b'));

        assert!(packed.remove(&name));
        assert!(!packed.remove(&name));
        assert!(packed.is_empty());
    }

    #[test]
    fn absent_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PackedRefs::load(dir.path()).unwrap().is_empty());
    }
}
