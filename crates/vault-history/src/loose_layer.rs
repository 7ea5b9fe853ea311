//! The writable storage layer: loose objects with delta-record fallback.
//!
//! The delta engine may replace a blob's loose content with a record under
//! `objects/vdelta` (base ID + compressed payload delta). Reads through
//! this layer resolve such records transparently, so a deltified blob is
//! indistinguishable from a full one at every point between the batch
//! publishing and the next repack folding the chain into a pack.

use std::io::Read;
use std::sync::Arc;

use vault_delta::DeltaRecord;
use vault_hash::ObjectId;
use vault_object::header;
use vault_pack::delta::apply::apply_delta;
use vault_raw::{FilesStore, RawError, RawStore};

/// Resolution depth ceiling, matching the delta engine's own cap.
const MAX_CHAIN: usize = 512;

pub struct LooseLayer {
    loose: Arc<FilesStore>,
    records: FilesStore,
}

impl LooseLayer {
    pub fn new(loose: Arc<FilesStore>, records: FilesStore) -> Self {
        Self { loose, records }
    }

    fn resolve(&self, id: &ObjectId, depth: usize) -> Result<Option<Vec<u8>>, RawError> {
        if let Some(bytes) = self.loose.load(id)? {
            return Ok(Some(bytes));
        }
        let Some(record_bytes) = self.records.load(id)? else {
            return Ok(None);
        };
        if depth >= MAX_CHAIN {
            return Err(RawError::Corrupt {
                id: *id,
                reason: format!("delta record chain exceeds {MAX_CHAIN} links"),
            });
        }

        let record = DeltaRecord::parse(&record_bytes).map_err(|reason| RawError::Corrupt {
            id: *id,
            reason,
        })?;
        let base = self
            .resolve(&record.base, depth + 1)?
            .ok_or_else(|| RawError::Corrupt {
                id: *id,
                reason: format!("delta base {} is missing", record.base),
            })?;

        let (obj_type, size, header_len) =
            header::parse_header(&base).map_err(|e| RawError::Corrupt {
                id: record.base,
                reason: e.to_string(),
            })?;
        let base_payload = &base[header_len..header_len + size];

        let delta = vault_util::zlib::inflate(&record.compressed_delta, false)?;
        let payload = apply_delta(base_payload, &delta).map_err(|e| RawError::Corrupt {
            id: *id,
            reason: e.to_string(),
        })?;

        let hdr = header::write_header(obj_type, payload.len());
        let mut out = Vec::with_capacity(hdr.len() + payload.len());
        out.extend_from_slice(&hdr);
        out.extend_from_slice(&payload);
        Ok(Some(out))
    }
}

impl RawStore for LooseLayer {
    fn store(&self, id: &ObjectId, bytes: &[u8]) -> Result<(), RawError> {
        self.loose.store(id, bytes)
    }

    fn load(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, RawError> {
        self.resolve(id, 0)
    }

    fn load_stream(&self, id: &ObjectId) -> Result<Option<Box<dyn Read + '_>>, RawError> {
        if self.loose.has(id) {
            return self.loose.load_stream(id);
        }
        Ok(self
            .load(id)?
            .map(|bytes| Box::new(std::io::Cursor::new(bytes)) as Box<dyn Read>))
    }

    fn has(&self, id: &ObjectId) -> bool {
        self.loose.has(id) || self.records.has(id)
    }

    fn remove(&self, id: &ObjectId) -> Result<bool, RawError> {
        let loose_removed = self.loose.remove(id)?;
        let record_removed = self.records.remove(id)?;
        Ok(loose_removed || record_removed)
    }

    fn keys(&self) -> Result<Vec<ObjectId>, RawError> {
        let mut keys = self.loose.keys()?;
        keys.extend(self.records.keys()?);
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_hash::hasher::Hasher;
    use vault_pack::delta::compute::compute_delta;
    use vault_util::zlib::deflate;

    fn layer(dir: &std::path::Path) -> LooseLayer {
        LooseLayer::new(
            Arc::new(FilesStore::open(dir.join("objects"))),
            FilesStore::open(dir.join("objects").join("vdelta")),
        )
    }

    fn canonical(payload: &[u8]) -> (ObjectId, Vec<u8>) {
        let id = Hasher::hash_object("blob", payload).unwrap();
        let mut bytes = format!("blob {}\0", payload.len()).into_bytes();
        bytes.extend_from_slice(payload);
        (id, bytes)
    }

    #[test]
    fn plain_loose_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let layer = layer(dir.path());
        let (id, bytes) = canonical(b"plain");
        layer.store(&id, &bytes).unwrap();
        assert_eq!(layer.load(&id).unwrap().unwrap(), bytes);
    }

    #[test]
    fn record_only_blob_resolves_through_base() {
        let dir = tempfile::tempdir().unwrap();
        let layer = layer(dir.path());

        let base_payload: Vec<u8> = (0..600u32).map(|i| (i % 251) as u8).collect();
        let mut target_payload = base_payload.clone();
        target_payload.extend_from_slice(b"tail bytes");

        let (base_id, base_bytes) = canonical(&base_payload);
        let (target_id, target_bytes) = canonical(&target_payload);
        layer.store(&base_id, &base_bytes).unwrap();

        // Deltify by hand: record under the target, no loose content.
        let delta = compute_delta(&base_payload, &target_payload);
        let record = DeltaRecord {
            base: base_id,
            compressed_delta: deflate(&delta, false).unwrap(),
        };
        layer.records.store(&target_id, &record.serialize()).unwrap();

        assert!(layer.has(&target_id));
        assert_eq!(layer.load(&target_id).unwrap().unwrap(), target_bytes);

        let mut keys = vec![base_id, target_id];
        keys.sort();
        assert_eq!(layer.keys().unwrap(), keys);
    }

    #[test]
    fn missing_base_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let layer = layer(dir.path());
        let (target_id, _) = canonical(b"unresolvable");
        let record = DeltaRecord {
            base: ObjectId::NULL,
            compressed_delta: deflate(b"junk", false).unwrap(),
        };
        layer.records.store(&target_id, &record.serialize()).unwrap();

        assert!(matches!(
            layer.load(&target_id),
            Err(RawError::Corrupt { .. })
        ));
    }
}
