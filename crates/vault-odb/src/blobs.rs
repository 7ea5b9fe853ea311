//! Blob store facade.

use std::io::Read;

use vault_hash::ObjectId;
use vault_object::ObjectType;

use crate::{load_typed, peek_header, store_object, typed_keys, OdbError, SharedStore};

pub struct Blobs {
    store: SharedStore,
}

impl Blobs {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Store raw bytes as a blob, returning the content address.
    pub fn store(&self, data: &[u8]) -> Result<ObjectId, OdbError> {
        store_object(&self.store, ObjectType::Blob, data)
    }

    /// Store from a reader with a declared size.
    pub fn store_stream(
        &self,
        size: usize,
        reader: &mut dyn Read,
    ) -> Result<ObjectId, OdbError> {
        let mut data = Vec::with_capacity(size);
        reader.read_to_end(&mut data).map_err(vault_raw::RawError::from)?;
        if data.len() != size {
            return Err(OdbError::Corrupt {
                id: ObjectId::NULL,
                reason: format!("stream declared {size} bytes, read {}", data.len()),
            });
        }
        self.store(&data)
    }

    /// Load blob bytes; `None` on absence or a non-blob object.
    pub fn load(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, OdbError> {
        load_typed(&self.store, id, ObjectType::Blob)
    }

    /// Load as a reader positioned at the payload.
    pub fn load_stream(&self, id: &ObjectId) -> Result<Option<impl Read>, OdbError> {
        Ok(self.load(id)?.map(std::io::Cursor::new))
    }

    /// Payload size from the header alone.
    pub fn size(&self, id: &ObjectId) -> Result<Option<usize>, OdbError> {
        match peek_header(&self.store, id)? {
            Some((ObjectType::Blob, size)) => Ok(Some(size)),
            _ => Ok(None),
        }
    }

    pub fn has(&self, id: &ObjectId) -> bool {
        matches!(
            peek_header(&self.store, id),
            Ok(Some((ObjectType::Blob, _)))
        )
    }

    pub fn remove(&self, id: &ObjectId) -> Result<bool, OdbError> {
        if !self.has(id) {
            return Ok(false);
        }
        Ok(self.store.remove(id)?)
    }

    /// All blob IDs, sorted.
    pub fn keys(&self) -> Result<Vec<ObjectId>, OdbError> {
        typed_keys(&self.store, ObjectType::Blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vault_raw::MemoryStore;

    fn blobs() -> Blobs {
        Blobs::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn store_load_roundtrip() {
        let blobs = blobs();
        let id = blobs.store(b"hello").unwrap();
        assert_eq!(id.to_hex(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
        assert_eq!(blobs.load(&id).unwrap().unwrap(), b"hello");
        assert_eq!(blobs.size(&id).unwrap(), Some(5));
        assert!(blobs.has(&id));
    }

    #[test]
    fn stream_roundtrip() {
        let blobs = blobs();
        let id = blobs
            .store_stream(5, &mut std::io::Cursor::new(b"12345"))
            .unwrap();
        let mut out = Vec::new();
        blobs
            .load_stream(&id)
            .unwrap()
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"12345");
    }

    #[test]
    fn stream_size_mismatch_fails() {
        let blobs = blobs();
        assert!(blobs
            .store_stream(10, &mut std::io::Cursor::new(b"short"))
            .is_err());
    }

    #[test]
    fn remove_and_keys() {
        let blobs = blobs();
        let a = blobs.store(b"aaa").unwrap();
        let b = blobs.store(b"bbb").unwrap();

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(blobs.keys().unwrap(), expected);

        assert!(blobs.remove(&a).unwrap());
        assert!(!blobs.remove(&a).unwrap());
        assert!(!blobs.has(&a));
    }

    #[test]
    fn missing_blob_is_none() {
        let blobs = blobs();
        assert!(blobs.load(&ObjectId::NULL).unwrap().is_none());
        assert_eq!(blobs.size(&ObjectId::NULL).unwrap(), None);
    }
}
