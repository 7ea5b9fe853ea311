//! Typed object stores: [`Blobs`], [`Trees`], [`Commits`], [`Tags`].
//!
//! Each facade wraps a shared raw store holding canonical object bytes and
//! exposes the operations natural to its kind. Asking a facade for an
//! object of a different kind is a miss (`None`), not an error.

mod blobs;
pub mod cache;
mod commits;
mod tags;
mod trees;

pub use blobs::Blobs;
pub use cache::CachingStore;
pub use commits::Commits;
pub use tags::Tags;
pub use trees::Trees;

use std::sync::Arc;

use vault_hash::{hasher::Hasher, ObjectId};
use vault_object::{header, ObjectType};
use vault_raw::{RawError, RawStore};

/// Shared handle to the underlying raw store.
pub type SharedStore = Arc<dyn RawStore + Send + Sync>;

/// Errors from the typed stores.
#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("corrupt object {id}: {reason}")]
    Corrupt { id: ObjectId, reason: String },

    #[error("tag chain at {id} exceeds {max} links")]
    TagChainTooDeep { id: ObjectId, max: usize },

    #[error(transparent)]
    Raw(#[from] RawError),

    #[error(transparent)]
    Object(#[from] vault_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] vault_hash::HashError),
}

/// The four facades over one store.
pub struct Odb {
    pub blobs: Blobs,
    pub trees: Trees,
    pub commits: Commits,
    pub tags: Tags,
}

impl Odb {
    pub fn new(store: SharedStore) -> Self {
        Self {
            blobs: Blobs::new(Arc::clone(&store)),
            trees: Trees::new(Arc::clone(&store)),
            commits: Commits::new(Arc::clone(&store)),
            tags: Tags::new(store),
        }
    }
}

/// Store a payload under its canonical form, returning the content address.
pub(crate) fn store_object(
    store: &SharedStore,
    obj_type: ObjectType,
    payload: &[u8],
) -> Result<ObjectId, OdbError> {
    let hdr = header::write_header(obj_type, payload.len());
    let id = {
        let mut hasher = Hasher::new();
        hasher.update(&hdr);
        hasher.update(payload);
        hasher.finalize()?
    };

    if !store.has(&id) {
        let mut bytes = Vec::with_capacity(hdr.len() + payload.len());
        bytes.extend_from_slice(&hdr);
        bytes.extend_from_slice(payload);
        store.store(&id, &bytes)?;
    }
    Ok(id)
}

/// Load a payload when the stored object has the expected type; `None` on
/// absence or type mismatch.
pub(crate) fn load_typed(
    store: &SharedStore,
    id: &ObjectId,
    expected: ObjectType,
) -> Result<Option<Vec<u8>>, OdbError> {
    let Some(bytes) = store.load(id)? else {
        return Ok(None);
    };
    let (obj_type, size, header_len) =
        header::parse_header(&bytes).map_err(|e| OdbError::Corrupt {
            id: *id,
            reason: e.to_string(),
        })?;
    if obj_type != expected {
        return Ok(None);
    }
    let payload = &bytes[header_len..];
    if payload.len() != size {
        return Err(OdbError::Corrupt {
            id: *id,
            reason: format!("declared {size} payload bytes, found {}", payload.len()),
        });
    }
    Ok(Some(payload.to_vec()))
}

/// Peek at an object's header without materializing the payload.
pub(crate) fn peek_header(
    store: &SharedStore,
    id: &ObjectId,
) -> Result<Option<(ObjectType, usize)>, OdbError> {
    use std::io::Read;

    let Some(mut reader) = store.load_stream(id)? else {
        return Ok(None);
    };

    let mut scanner = header::HeaderScanner::new();
    let mut chunk = [0u8; 64];
    loop {
        let n = reader.read(&mut chunk).map_err(|e| OdbError::Corrupt {
            id: *id,
            reason: e.to_string(),
        })?;
        if n == 0 {
            return Err(OdbError::Corrupt {
                id: *id,
                reason: "unterminated object header".into(),
            });
        }
        if let Some((obj_type, size, _leftover)) =
            scanner.push(&chunk[..n]).map_err(|e| OdbError::Corrupt {
                id: *id,
                reason: e.to_string(),
            })?
        {
            return Ok(Some((obj_type, size)));
        }
    }
}

/// Keys of the given type, in sorted order.
pub(crate) fn typed_keys(
    store: &SharedStore,
    expected: ObjectType,
) -> Result<Vec<ObjectId>, OdbError> {
    let mut out = Vec::new();
    for id in store.keys()? {
        if let Some((obj_type, _)) = peek_header(store, &id)? {
            if obj_type == expected {
                out.push(id);
            }
        }
    }
    Ok(out)
}
