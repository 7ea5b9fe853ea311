//! Reference storage: loose files under `refs/`, the `packed-refs` table,
//! and symbolic resolution.
//!
//! Reads prefer loose over packed. Updates only ever write loose files;
//! `packed-refs` is rewritten solely when a packed ref is deleted or on an
//! explicit [`RefStore::pack_refs`].

mod loose;
mod name;
mod packed;
mod store;

pub use name::RefName;
pub use packed::{PackedRef, PackedRefs};
pub use store::RefStore;

use std::path::PathBuf;

use vault_hash::ObjectId;

/// Errors from reference operations.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("invalid ref name: {0}")]
    InvalidName(String),

    #[error("malformed ref content: {0}")]
    Parse(String),

    #[error("symbolic ref cycle involving {0}")]
    SymbolicCycle(String),

    #[error("ref {name} conflicts with existing ref {conflict}")]
    DirectoryConflict { name: String, conflict: String },

    #[error("io error at {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Hash(#[from] vault_hash::HashError),

    #[error(transparent)]
    Util(#[from] vault_util::UtilError),
}

/// A reference: direct to an object, or symbolic to another ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Direct { name: RefName, id: ObjectId },
    Symbolic { name: RefName, target: RefName },
}

impl Reference {
    pub fn name(&self) -> &RefName {
        match self {
            Reference::Direct { name, .. } => name,
            Reference::Symbolic { name, .. } => name,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Reference::Symbolic { .. })
    }

    /// The target object for a direct ref.
    pub fn target_id(&self) -> Option<ObjectId> {
        match self {
            Reference::Direct { id, .. } => Some(*id),
            Reference::Symbolic { .. } => None,
        }
    }

    /// The target name for a symbolic ref.
    pub fn symbolic_target(&self) -> Option<&RefName> {
        match self {
            Reference::Symbolic { target, .. } => Some(target),
            Reference::Direct { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_accessors() {
        let name = RefName::new("refs/heads/main").unwrap();
        let direct = Reference::Direct {
            name: name.clone(),
            id: ObjectId::EMPTY_TREE,
        };
        assert!(!direct.is_symbolic());
        assert_eq!(direct.target_id(), Some(ObjectId::EMPTY_TREE));
        assert!(direct.symbolic_target().is_none());

        let head = Reference::Symbolic {
            name: RefName::new("HEAD").unwrap(),
            target: name.clone(),
        };
        assert!(head.is_symbolic());
        assert_eq!(head.symbolic_target(), Some(&name));
        assert!(head.target_id().is_none());
    }
}
