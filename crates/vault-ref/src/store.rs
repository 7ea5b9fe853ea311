//! The ref store: loose files over the packed table.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use vault_hash::ObjectId;

use crate::loose;
use crate::packed::PackedRefs;
use crate::{RefError, RefName, Reference};

pub struct RefStore {
    git_dir: PathBuf,
}

impl RefStore {
    pub fn open(git_dir: impl AsRef<Path>) -> Self {
        Self {
            git_dir: git_dir.as_ref().to_path_buf(),
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Read one ref without following symbolic targets. Loose wins over
    /// packed.
    pub fn get(&self, name: &RefName) -> Result<Option<Reference>, RefError> {
        if let Some(reference) = loose::read_loose(&self.git_dir, name)? {
            return Ok(Some(reference));
        }
        let packed = PackedRefs::load(&self.git_dir)?;
        Ok(packed.find(name).map(|entry| Reference::Direct {
            name: entry.name.clone(),
            id: entry.id,
        }))
    }

    /// Resolve to an object ID, following symbolic chains with a cycle
    /// guard. `None` when the name (or the chain's end) does not exist.
    pub fn resolve(&self, name: &RefName) -> Result<Option<ObjectId>, RefError> {
        let mut visited: HashSet<RefName> = HashSet::new();
        let mut current = name.clone();

        loop {
            if !visited.insert(current.clone()) {
                return Err(RefError::SymbolicCycle(current.to_string()));
            }
            match self.get(&current)? {
                Some(Reference::Direct { id, .. }) => return Ok(Some(id)),
                Some(Reference::Symbolic { target, .. }) => current = target,
                None => return Ok(None),
            }
        }
    }

    /// Set a direct ref (loose write only).
    pub fn set(&self, name: &RefName, id: &ObjectId) -> Result<(), RefError> {
        loose::write_loose(&self.git_dir, name, id)
    }

    /// Set a symbolic ref (loose write only).
    pub fn set_symbolic(&self, name: &RefName, target: &RefName) -> Result<(), RefError> {
        loose::write_symbolic(&self.git_dir, name, target)
    }

    /// Remove a ref. A packed-only ref forces a packed-refs rewrite.
    pub fn remove(&self, name: &RefName) -> Result<bool, RefError> {
        let loose_removed = loose::delete_loose(&self.git_dir, name)?;

        let mut packed = PackedRefs::load(&self.git_dir)?;
        let packed_removed = packed.remove(name);
        if packed_removed {
            packed.write(&self.git_dir)?;
        }

        Ok(loose_removed || packed_removed)
    }

    pub fn has(&self, name: &RefName) -> bool {
        matches!(self.get(name), Ok(Some(_)))
    }

    /// All refs matching `prefix`, loose and packed merged (loose wins),
    /// sorted by name.
    pub fn list(&self, prefix: Option<&str>) -> Result<Vec<Reference>, RefError> {
        let mut names: Vec<RefName> = loose::enumerate_loose(&self.git_dir, prefix)?;

        let packed = PackedRefs::load(&self.git_dir)?;
        for entry in packed.refs() {
            if let Some(p) = prefix {
                if !entry.name.as_str().starts_with(p) {
                    continue;
                }
            }
            names.push(entry.name.clone());
        }
        names.sort();
        names.dedup();

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            if let Some(reference) = self.get(&name)? {
                out.push(reference);
            }
        }
        Ok(out)
    }

    /// Explicit repack: move every loose ref under `refs/` into the packed
    /// table (symbolic refs stay loose).
    pub fn pack_refs(&self) -> Result<(), RefError> {
        let mut packed = PackedRefs::load(&self.git_dir)?;
        let mut to_delete = Vec::new();

        for name in loose::enumerate_loose(&self.git_dir, Some("refs/"))? {
            match loose::read_loose(&self.git_dir, &name)? {
                Some(Reference::Direct { id, .. }) => {
                    packed.upsert(name.clone(), id, None);
                    to_delete.push(name);
                }
                _ => continue,
            }
        }

        packed.write(&self.git_dir)?;
        for name in to_delete {
            loose::delete_loose(&self.git_dir, &name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(c: char) -> ObjectId {
        ObjectId::from_hex(&c.to_string().repeat(40)).unwrap()
    }

    fn name(s: &str) -> RefName {
        RefName::new(s).unwrap()
    }

    #[test]
    fn set_then_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let store = RefStore::open(dir.path());

        store.set(&name("refs/heads/main"), &oid('a')).unwrap();
        assert_eq!(
            store.resolve(&name("refs/heads/main")).unwrap(),
            Some(oid('a'))
        );
        assert!(store.has(&name("refs/heads/main")));
    }

    #[test]
    fn symbolic_head_resolves_through_branch() {
        let dir = tempfile::tempdir().unwrap();
        let store = RefStore::open(dir.path());

        store.set(&name("refs/heads/main"), &oid('a')).unwrap();
        store
            .set_symbolic(&name("HEAD"), &name("refs/heads/main"))
            .unwrap();

        assert_eq!(store.resolve(&name("HEAD")).unwrap(), Some(oid('a')));

        // Moving the branch moves HEAD.
        store.set(&name("refs/heads/main"), &oid('b')).unwrap();
        assert_eq!(store.resolve(&name("HEAD")).unwrap(), Some(oid('b')));
    }

    #[test]
    fn dangling_symbolic_resolves_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = RefStore::open(dir.path());
        store
            .set_symbolic(&name("HEAD"), &name("refs/heads/unborn"))
            .unwrap();
        assert_eq!(store.resolve(&name("HEAD")).unwrap(), None);
    }

    #[test]
    fn symbolic_cycle_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = RefStore::open(dir.path());
        store
            .set_symbolic(&name("refs/heads/one"), &name("refs/heads/two"))
            .unwrap();
        store
            .set_symbolic(&name("refs/heads/two"), &name("refs/heads/one"))
            .unwrap();
        assert!(matches!(
            store.resolve(&name("refs/heads/one")),
            Err(RefError::SymbolicCycle(_))
        ));
    }

    #[test]
    fn loose_shadows_packed() {
        let dir = tempfile::tempdir().unwrap();
        let store = RefStore::open(dir.path());

        let mut packed = PackedRefs::default();
        packed.upsert(name("refs/heads/main"), oid('a'), None);
        packed.write(dir.path()).unwrap();

        assert_eq!(
            store.resolve(&name("refs/heads/main")).unwrap(),
            Some(oid('a'))
        );

        store.set(&name("refs/heads/main"), &oid('b')).unwrap();
        assert_eq!(
            store.resolve(&name("refs/heads/main")).unwrap(),
            Some(oid('b'))
        );
    }

    #[test]
    fn remove_covers_loose_and_packed() {
        let dir = tempfile::tempdir().unwrap();
        let store = RefStore::open(dir.path());

        let mut packed = PackedRefs::default();
        packed.upsert(name("refs/heads/packed-only"), oid('a'), None);
        packed.write(dir.path()).unwrap();
        store.set(&name("refs/heads/loose-only"), &oid('b')).unwrap();

        assert!(store.remove(&name("refs/heads/packed-only")).unwrap());
        assert!(store.remove(&name("refs/heads/loose-only")).unwrap());
        assert!(!store.remove(&name("refs/heads/neither")).unwrap());

        assert!(!store.has(&name("refs/heads/packed-only")));
        assert!(!store.has(&name("refs/heads/loose-only")));
    }

    #[test]
    fn list_merges_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let store = RefStore::open(dir.path());

        let mut packed = PackedRefs::default();
        packed.upsert(name("refs/heads/main"), oid('a'), None);
        packed.upsert(name("refs/tags/v1.0"), oid('b'), None);
        packed.write(dir.path()).unwrap();

        // Shadow one packed ref and add a purely loose one.
        store.set(&name("refs/heads/main"), &oid('c')).unwrap();
        store.set(&name("refs/heads/dev"), &oid('d')).unwrap();

        let heads = store.list(Some("refs/heads/")).unwrap();
        assert_eq!(heads.len(), 2);
        assert_eq!(heads[0].name().as_str(), "refs/heads/dev");
        assert_eq!(heads[1].name().as_str(), "refs/heads/main");
        assert_eq!(heads[1].target_id(), Some(oid('c')));

        let all = store.list(None).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn pack_refs_moves_loose_into_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = RefStore::open(dir.path());

        store.set(&name("refs/heads/main"), &oid('a')).unwrap();
        store
            .set_symbolic(&name("HEAD"), &name("refs/heads/main"))
            .unwrap();

        store.pack_refs().unwrap();

        assert!(!dir.path().join("refs/heads/main").exists());
        // Still resolvable through the packed table; HEAD stays loose.
        assert_eq!(
            store.resolve(&name("refs/heads/main")).unwrap(),
            Some(oid('a'))
        );
        assert!(dir.path().join("HEAD").exists());
    }
}
