//! Overlay: a read-only layer (packs) over a writable layer (loose).

use vault_hash::ObjectId;

use crate::{RawError, RawStore};

/// Read-only source consulted before the writable layer.
///
/// The pack directory implements this; tests can use any map-like stand-in.
pub trait ReadLayer {
    fn load(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, RawError>;
    fn has(&self, id: &ObjectId) -> bool;
    fn keys(&self) -> Result<Vec<ObjectId>, RawError>;
}

/// Layered store: reads consult `front` first, writes always go to `back`.
pub struct OverlayStore<F, B> {
    front: F,
    back: B,
}

impl<F: ReadLayer, B: RawStore> OverlayStore<F, B> {
    pub fn new(front: F, back: B) -> Self {
        Self { front, back }
    }

    pub fn front(&self) -> &F {
        &self.front
    }

    pub fn back(&self) -> &B {
        &self.back
    }

    /// Whether the key is satisfied by the writable layer (as opposed to
    /// the read-only front).
    pub fn is_loose(&self, id: &ObjectId) -> bool {
        self.back.has(id)
    }
}

impl<F: ReadLayer, B: RawStore> RawStore for OverlayStore<F, B> {
    fn store(&self, id: &ObjectId, bytes: &[u8]) -> Result<(), RawError> {
        if self.front.has(id) {
            // Content-addressed: a packed copy satisfies the write.
            return Ok(());
        }
        self.back.store(id, bytes)
    }

    fn load(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, RawError> {
        if let Some(bytes) = self.front.load(id)? {
            return Ok(Some(bytes));
        }
        self.back.load(id)
    }

    fn has(&self, id: &ObjectId) -> bool {
        self.front.has(id) || self.back.has(id)
    }

    fn remove(&self, id: &ObjectId) -> Result<bool, RawError> {
        // Only the writable layer is mutable here; packed copies go away
        // when their pack is removed.
        self.back.remove(id)
    }

    fn keys(&self) -> Result<Vec<ObjectId>, RawError> {
        let mut keys = self.front.keys()?;
        keys.extend(self.back.keys()?);
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}
