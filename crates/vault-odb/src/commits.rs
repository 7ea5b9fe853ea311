//! Commit store facade.

use vault_hash::ObjectId;
use vault_object::{Commit, ObjectType};

use crate::{load_typed, peek_header, store_object, typed_keys, OdbError, SharedStore};

pub struct Commits {
    store: SharedStore,
}

impl Commits {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Store a commit in canonical form, returning the content address.
    pub fn store(&self, commit: &Commit) -> Result<ObjectId, OdbError> {
        store_object(&self.store, ObjectType::Commit, &commit.serialize_payload())
    }

    /// Load and parse a commit; `None` on absence or a non-commit object.
    pub fn load(&self, id: &ObjectId) -> Result<Option<Commit>, OdbError> {
        match load_typed(&self.store, id, ObjectType::Commit)? {
            Some(payload) => {
                Ok(Some(Commit::parse(&payload).map_err(|e| OdbError::Corrupt {
                    id: *id,
                    reason: e.to_string(),
                })?))
            }
            None => Ok(None),
        }
    }

    /// Root tree of a commit.
    pub fn get_tree(&self, id: &ObjectId) -> Result<Option<ObjectId>, OdbError> {
        Ok(self.load(id)?.map(|c| c.tree))
    }

    /// Parent IDs of a commit.
    pub fn get_parents(&self, id: &ObjectId) -> Result<Option<Vec<ObjectId>>, OdbError> {
        Ok(self.load(id)?.map(|c| c.parents))
    }

    pub fn has(&self, id: &ObjectId) -> bool {
        matches!(
            peek_header(&self.store, id),
            Ok(Some((ObjectType::Commit, _)))
        )
    }

    pub fn remove(&self, id: &ObjectId) -> Result<bool, OdbError> {
        if !self.has(id) {
            return Ok(false);
        }
        Ok(self.store.remove(id)?)
    }

    pub fn keys(&self) -> Result<Vec<ObjectId>, OdbError> {
        typed_keys(&self.store, ObjectType::Commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vault_raw::MemoryStore;
    use vault_util::date::{GitDate, Signature};

    fn commits() -> Commits {
        Commits::new(Arc::new(MemoryStore::new()))
    }

    fn sig() -> Signature {
        Signature::new("A Tester", "tester@example.com", GitDate::new(1_600_000_000, 0)).unwrap()
    }

    fn sample(parents: Vec<ObjectId>) -> Commit {
        Commit {
            tree: ObjectId::EMPTY_TREE,
            parents,
            author: sig(),
            committer: sig(),
            encoding: None,
            gpgsig: None,
            message: "a message\n".into(),
        }
    }

    #[test]
    fn store_load_roundtrip() {
        let commits = commits();
        let commit = sample(vec![]);
        let id = commits.store(&commit).unwrap();
        assert_eq!(commits.load(&id).unwrap().unwrap(), commit);
        assert_eq!(commits.get_tree(&id).unwrap(), Some(ObjectId::EMPTY_TREE));
        assert_eq!(commits.get_parents(&id).unwrap(), Some(vec![]));
    }

    #[test]
    fn parents_preserved_in_order() {
        let commits = commits();
        let p1 = commits.store(&sample(vec![])).unwrap();
        let p2 = commits.store(&{
            let mut c = sample(vec![]);
            c.message = "other root\n".into();
            c
        })
        .unwrap();

        let merge = commits.store(&sample(vec![p1, p2])).unwrap();
        assert_eq!(commits.get_parents(&merge).unwrap(), Some(vec![p1, p2]));
    }

    #[test]
    fn missing_commit_is_none() {
        let commits = commits();
        assert!(commits.load(&ObjectId::NULL).unwrap().is_none());
        assert_eq!(commits.get_tree(&ObjectId::NULL).unwrap(), None);
    }
}
