//! Pack format support: reading, writing, indexing, and delta codecs.
//!
//! A pack is `"PACK" | u32 version (=2) | u32 count | entries | SHA-1`.
//! Entries are zlib streams prefixed with a type+size varint; deltified
//! entries reference their base by backward offset (OFS_DELTA) or by ID
//! (REF_DELTA). The sidecar index (v2) maps IDs to offsets via a fan-out
//! table and binary search.

pub mod delta;
pub mod directory;
pub mod entry;
pub mod index;
pub mod read;
pub mod write;

use vault_hash::ObjectId;
use vault_object::ObjectType;

/// Errors from pack operations.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("invalid pack header: {0}")]
    InvalidHeader(String),

    #[error("invalid pack index: {0}")]
    InvalidIndex(String),

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("corrupt pack entry at offset {0}")]
    CorruptEntry(u64),

    #[error("invalid delta at offset {offset}: {reason}")]
    InvalidDelta { offset: u64, reason: String },

    #[error("delta base not found: {0}")]
    MissingBase(ObjectId),

    #[error("delta chain cycle detected at offset {0}")]
    DeltaCycle(u64),

    #[error("delta chain too deep (>{max_depth}) at offset {offset}")]
    ChainTooDeep { offset: u64, max_depth: usize },

    #[error("pack checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: ObjectId, actual: ObjectId },

    #[error("pack not found in directory: {0}")]
    PackNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Object(#[from] vault_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] vault_hash::HashError),

    #[error(transparent)]
    Util(#[from] vault_util::UtilError),
}

/// Kind of a pack entry before delta resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackEntryKind {
    Commit,
    Tree,
    Blob,
    Tag,
    /// Delta whose base lives earlier in the same pack.
    OfsDelta { base_offset: u64 },
    /// Delta whose base is named by ID.
    RefDelta { base_id: ObjectId },
}

impl PackEntryKind {
    /// Object type for non-delta kinds.
    pub fn to_object_type(self) -> Option<ObjectType> {
        match self {
            Self::Commit => Some(ObjectType::Commit),
            Self::Tree => Some(ObjectType::Tree),
            Self::Blob => Some(ObjectType::Blob),
            Self::Tag => Some(ObjectType::Tag),
            Self::OfsDelta { .. } | Self::RefDelta { .. } => None,
        }
    }

    /// Wire type number (1-4, 6, 7).
    pub fn type_number(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
            Self::OfsDelta { .. } => 6,
            Self::RefDelta { .. } => 7,
        }
    }

    /// Wire type number for a plain object type.
    pub fn number_for(obj_type: ObjectType) -> u8 {
        match obj_type {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
            ObjectType::Tag => 4,
        }
    }
}

/// A fully resolved object read out of a pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedObject {
    pub obj_type: ObjectType,
    pub data: Vec<u8>,
}

/// Pack format constants.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;
pub const PACK_HEADER_SIZE: usize = 12;

/// Pack index v2 constants.
pub const IDX_SIGNATURE: [u8; 4] = [0xff, 0x74, 0x4f, 0x63]; // "\377tOc"
pub const IDX_VERSION: u32 = 2;

/// Hard ceiling on delta chain resolution.
pub const MAX_DELTA_CHAIN_DEPTH: usize = 512;
