//! Wire protocol plumbing.
//!
//! Everything needed to move packs without buffering whole files: pkt-line
//! framing, a streaming pack parser driven by partial zlib decompression,
//! a spillable cache for resolved delta bases, and server session framing.

pub mod cache;
pub mod pack_stream;
pub mod pktline;
pub mod session;

pub use cache::PackObjectCache;
pub use pack_stream::{PackStreamEntry, PackStreamReader};
pub use pktline::{PktLine, PktLineReader, PktLineWriter};
pub use session::{advertise_refs, parse_request, serve, Service, ServiceRequest};

use vault_hash::ObjectId;

/// Errors from wire operations.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("truncated pack stream at entry {entry}")]
    TruncatedStream { entry: u32 },

    #[error("pack stream buffer exceeds {limit} bytes")]
    BufferExhausted { limit: usize },

    #[error("missing delta base {0} (thin pack without pre-seeded cache)")]
    MissingBase(ObjectId),

    #[error("pack checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: ObjectId, actual: ObjectId },

    #[error(transparent)]
    Pack(#[from] vault_pack::PackError),

    #[error(transparent)]
    Hash(#[from] vault_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
