//! Tree store facade.

use bstr::BStr;
use vault_hash::ObjectId;
use vault_object::{ObjectType, Tree, TreeEntry};

use crate::{load_typed, peek_header, store_object, typed_keys, OdbError, SharedStore};

pub struct Trees {
    store: SharedStore,
}

impl Trees {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Store a tree in canonical form, returning the content address.
    pub fn store(&self, tree: &Tree) -> Result<ObjectId, OdbError> {
        store_object(&self.store, ObjectType::Tree, &tree.serialize_payload())
    }

    /// The well-known empty tree, stored on demand.
    pub fn store_empty(&self) -> Result<ObjectId, OdbError> {
        self.store(&Tree::new())
    }

    /// Load and parse a tree; `None` on absence or a non-tree object.
    pub fn load(&self, id: &ObjectId) -> Result<Option<Tree>, OdbError> {
        match load_typed(&self.store, id, ObjectType::Tree)? {
            Some(payload) => Ok(Some(Tree::parse(&payload).map_err(|e| OdbError::Corrupt {
                id: *id,
                reason: e.to_string(),
            })?)),
            None => Ok(None),
        }
    }

    /// Look up one entry by name.
    pub fn get_entry(
        &self,
        tree_id: &ObjectId,
        name: &BStr,
    ) -> Result<Option<TreeEntry>, OdbError> {
        Ok(self
            .load(tree_id)?
            .and_then(|tree| tree.find(name).cloned()))
    }

    /// Iterate a tree's entries in canonical order.
    pub fn entries(&self, tree_id: &ObjectId) -> Result<Option<Vec<TreeEntry>>, OdbError> {
        Ok(self.load(tree_id)?.map(|mut tree| {
            tree.sort();
            tree.entries
        }))
    }

    pub fn has(&self, id: &ObjectId) -> bool {
        matches!(
            peek_header(&self.store, id),
            Ok(Some((ObjectType::Tree, _)))
        )
    }

    pub fn remove(&self, id: &ObjectId) -> Result<bool, OdbError> {
        if !self.has(id) {
            return Ok(false);
        }
        Ok(self.store.remove(id)?)
    }

    pub fn keys(&self) -> Result<Vec<ObjectId>, OdbError> {
        typed_keys(&self.store, ObjectType::Tree)
    }
}
