//! Annotated tag store facade.

use vault_hash::ObjectId;
use vault_object::{ObjectType, Tag};

use crate::{load_typed, peek_header, store_object, typed_keys, OdbError, SharedStore};

/// Tag-to-tag chains longer than this are refused.
pub const MAX_TAG_CHAIN: usize = 100;

pub struct Tags {
    store: SharedStore,
}

impl Tags {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Store an annotated tag, returning the content address.
    pub fn store(&self, tag: &Tag) -> Result<ObjectId, OdbError> {
        store_object(&self.store, ObjectType::Tag, &tag.serialize_payload())
    }

    /// Load and parse a tag; `None` on absence or a non-tag object.
    pub fn load(&self, id: &ObjectId) -> Result<Option<Tag>, OdbError> {
        match load_typed(&self.store, id, ObjectType::Tag)? {
            Some(payload) => Ok(Some(Tag::parse(&payload).map_err(|e| OdbError::Corrupt {
                id: *id,
                reason: e.to_string(),
            })?)),
            None => Ok(None),
        }
    }

    /// Target of a tag.
    ///
    /// With `peel` set, tag-to-tag chains are followed until a non-tag
    /// target, up to [`MAX_TAG_CHAIN`] links.
    pub fn get_target(
        &self,
        id: &ObjectId,
        peel: bool,
    ) -> Result<Option<(ObjectId, ObjectType)>, OdbError> {
        let Some(mut tag) = self.load(id)? else {
            return Ok(None);
        };
        if !peel {
            return Ok(Some((tag.target, tag.target_type)));
        }

        let mut hops = 0;
        while tag.target_type == ObjectType::Tag {
            hops += 1;
            if hops > MAX_TAG_CHAIN {
                return Err(OdbError::TagChainTooDeep {
                    id: *id,
                    max: MAX_TAG_CHAIN,
                });
            }
            match self.load(&tag.target)? {
                Some(next) => tag = next,
                // A dangling link still reports where the chain pointed.
                None => return Ok(Some((tag.target, tag.target_type))),
            }
        }
        Ok(Some((tag.target, tag.target_type)))
    }

    pub fn has(&self, id: &ObjectId) -> bool {
        matches!(peek_header(&self.store, id), Ok(Some((ObjectType::Tag, _))))
    }

    pub fn remove(&self, id: &ObjectId) -> Result<bool, OdbError> {
        if !self.has(id) {
            return Ok(false);
        }
        Ok(self.store.remove(id)?)
    }

    pub fn keys(&self) -> Result<Vec<ObjectId>, OdbError> {
        typed_keys(&self.store, ObjectType::Tag)
    }
}
