//! Pack directory as a read-only raw-storage layer.
//!
//! Packed objects come back in canonical form (`"<type> <size>\0" +
//! payload`) so the overlay serves the same bytes regardless of where an
//! object lives. Thin REF_DELTA bases fall back to the loose store.

use std::sync::Arc;

use vault_hash::ObjectId;
use vault_object::{header, ObjectType};
use vault_pack::directory::PackDirectory;
use vault_raw::{RawError, RawStore, ReadLayer};

use crate::LooseLayer;

pub struct PackedLayer {
    packs: Arc<PackDirectory>,
    loose: Arc<LooseLayer>,
}

impl PackedLayer {
    pub fn new(packs: Arc<PackDirectory>, loose: Arc<LooseLayer>) -> Self {
        Self { packs, loose }
    }

    fn loose_resolver(&self) -> impl Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)> + '_ {
        |id: &ObjectId| {
            let bytes = self.loose.load(id).ok().flatten()?;
            let (obj_type, size, header_len) = header::parse_header(&bytes).ok()?;
            let payload = bytes.get(header_len..header_len + size)?;
            Some((obj_type, payload.to_vec()))
        }
    }
}

impl ReadLayer for PackedLayer {
    fn load(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, RawError> {
        let resolver = self.loose_resolver();
        let packed = self
            .packs
            .read_object(id, &resolver)
            .map_err(|e| RawError::Corrupt {
                id: *id,
                reason: e.to_string(),
            })?;

        Ok(packed.map(|obj| {
            let hdr = header::write_header(obj.obj_type, obj.data.len());
            let mut bytes = Vec::with_capacity(hdr.len() + obj.data.len());
            bytes.extend_from_slice(&hdr);
            bytes.extend_from_slice(&obj.data);
            bytes
        }))
    }

    fn has(&self, id: &ObjectId) -> bool {
        self.packs.has(id)
    }

    fn keys(&self) -> Result<Vec<ObjectId>, RawError> {
        self.packs.keys().map_err(|e| RawError::Corrupt {
            id: ObjectId::NULL,
            reason: e.to_string(),
        })
    }
}
