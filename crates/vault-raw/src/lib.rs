//! Raw content-addressed storage.
//!
//! A [`RawStore`] maps object IDs to byte payloads. The engine always
//! passes canonical object bytes (`"<type> <size>\0<payload>"`) through
//! this layer; how a backend represents them at rest is its own business.
//! [`FilesStore`] compresses with zlib so its on-disk layout is
//! bit-compatible with git's loose objects, [`MemoryStore`] keeps values
//! verbatim, and [`OverlayStore`] layers a read-only source (packs) over a
//! writable one (loose).

mod files;
mod memory;
mod overlay;

pub use files::FilesStore;
pub use memory::MemoryStore;
pub use overlay::{OverlayStore, ReadLayer};

use std::io::Read;

use vault_hash::ObjectId;

/// Errors from raw storage backends.
#[derive(Debug, thiserror::Error)]
pub enum RawError {
    #[error("corrupt stored value {id}: {reason}")]
    Corrupt { id: ObjectId, reason: String },

    #[error("storage path error for {id}: {source}")]
    IoFor {
        id: ObjectId,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Util(#[from] vault_util::UtilError),
}

/// A keyed byte-stream store.
///
/// Reads are consistent within one call; a value reported by [`has`]
/// (`RawStore::has`) is durable.
pub trait RawStore {
    /// Store `bytes` under `id`. Idempotent: re-storing an existing key is
    /// a no-op.
    fn store(&self, id: &ObjectId, bytes: &[u8]) -> Result<(), RawError>;

    /// Load the full value, or `None` when absent.
    fn load(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, RawError>;

    /// Load as a reader, or `None` when absent. The default materializes
    /// through [`load`](RawStore::load); file backends stream instead.
    fn load_stream(&self, id: &ObjectId) -> Result<Option<Box<dyn Read + '_>>, RawError> {
        Ok(self
            .load(id)?
            .map(|bytes| Box::new(std::io::Cursor::new(bytes)) as Box<dyn Read>))
    }

    /// Whether `id` is present. Never raises.
    fn has(&self, id: &ObjectId) -> bool;

    /// Remove a value. Returns `false` when absent.
    fn remove(&self, id: &ObjectId) -> Result<bool, RawError>;

    /// Snapshot of all keys, sorted bytewise.
    fn keys(&self) -> Result<Vec<ObjectId>, RawError>;
}
