//! The staging area (index).
//!
//! In memory the staging area is a vector of entries sorted by
//! `(path bytes, stage)`. Stage 0 is a merged entry; stages 1/2/3 hold the
//! base/ours/theirs sides of an unresolved conflict and never coexist with
//! stage 0 for the same path. On disk it is git's index file, versions 2,
//! 3 (extended flags) and 4 (prefix-compressed paths).

mod builder;
mod editor;
mod entry;
pub mod extensions;
mod read;
mod tree;
mod write;

pub use builder::StagingBuilder;
pub use editor::{StagingEdit, StagingEditor};
pub use entry::{EntryFlags, StagingEntry, StatData};
pub use extensions::{CacheTree, CacheTreeNode, RawExtension, ResolveUndo, ResolveUndoEntry};

use std::path::Path;

use bstr::{BStr, BString, ByteSlice};
use vault_hash::ObjectId;
use vault_odb::Trees;

/// Errors from staging operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("invalid index header: {0}")]
    InvalidHeader(String),

    #[error("unsupported index version: {0}")]
    UnsupportedVersion(u32),

    #[error("index checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid index entry at offset {offset}: {reason}")]
    InvalidEntry { offset: usize, reason: String },

    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: BString, reason: &'static str },

    #[error("duplicate entry for {path} at stage {stage}")]
    DuplicateEntry { path: BString, stage: u8 },

    #[error("stage 0 and conflict stages coexist for {path}")]
    StageConflict { path: BString },

    #[error("cannot write a tree while conflicts remain (first: {path})")]
    UnresolvedConflicts { path: BString },

    #[error("invalid extension '{sig}': {reason}")]
    InvalidExtension { sig: String, reason: String },

    #[error("unknown mandatory extension '{0}'")]
    MandatoryExtension(String),

    #[error("tree not found: {0}")]
    TreeNotFound(ObjectId),

    #[error("index lock failed: {path}")]
    LockFailed { path: std::path::PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Odb(#[from] vault_odb::OdbError),

    #[error(transparent)]
    Object(#[from] vault_object::ObjectError),
}

/// Merge stage of a staging entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Merged / normal (stage 0).
    Normal,
    /// Common ancestor side (stage 1).
    Base,
    /// Our side (stage 2).
    Ours,
    /// Their side (stage 3).
    Theirs,
}

impl Stage {
    pub fn as_u8(&self) -> u8 {
        match self {
            Stage::Normal => 0,
            Stage::Base => 1,
            Stage::Ours => 2,
            Stage::Theirs => 3,
        }
    }

    pub fn from_u8(n: u8) -> Option<Self> {
        match n {
            0 => Some(Stage::Normal),
            1 => Some(Stage::Base),
            2 => Some(Stage::Ours),
            3 => Some(Stage::Theirs),
            _ => None,
        }
    }
}

/// Validate a staging path: non-empty, no leading/trailing or doubled
/// slashes, and no `.git` component.
pub fn validate_path(path: &BStr) -> Result<(), IndexError> {
    let reject = |reason: &'static str| {
        Err(IndexError::InvalidPath {
            path: BString::from(path.as_bytes()),
            reason,
        })
    };

    if path.is_empty() {
        return reject("empty path");
    }
    if path.starts_with(b"/") || path.ends_with(b"/") {
        return reject("leading or trailing slash");
    }
    if path.find(b"//").is_some() {
        return reject("doubled slash");
    }
    for component in path.split(|&b| b == b'/') {
        if component.is_empty() {
            return reject("empty component");
        }
        if component.eq_ignore_ascii_case(b".git") {
            return reject("'.git' component");
        }
    }
    Ok(())
}

/// The in-memory staging area.
pub struct Staging {
    version: u32,
    entries: Vec<StagingEntry>,
    cache_tree: Option<CacheTree>,
    resolve_undo: Option<ResolveUndo>,
    unknown_extensions: Vec<RawExtension>,
}

impl Staging {
    pub fn new() -> Self {
        Self {
            version: 2,
            entries: Vec::new(),
            cache_tree: None,
            resolve_undo: None,
            unknown_extensions: Vec::new(),
        }
    }

    /// Read from an index file, verifying the trailing checksum.
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let file = std::fs::File::open(path.as_ref())?;
        let data = unsafe { memmap2::Mmap::map(&file) }?;
        read::parse_index(&data)
    }

    /// Write atomically through a sibling lock file.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        write::write_index(self, path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// On-disk format version used for the next write (2, 3, or 4).
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn set_version(&mut self, version: u32) -> Result<(), IndexError> {
        if !(2..=4).contains(&version) {
            return Err(IndexError::UnsupportedVersion(version));
        }
        self.version = version;
        Ok(())
    }

    /// Entry at `(path, stage)`.
    pub fn get(&self, path: &BStr, stage: Stage) -> Option<&StagingEntry> {
        self.entries
            .binary_search_by(|e| {
                e.path
                    .as_bstr()
                    .cmp(path)
                    .then(e.stage.as_u8().cmp(&stage.as_u8()))
            })
            .ok()
            .map(|i| &self.entries[i])
    }

    /// All stages present for `path`, in stage order.
    pub fn entries_for(&self, path: &BStr) -> Vec<&StagingEntry> {
        self.entries
            .iter()
            .filter(|e| e.path.as_bstr() == path)
            .collect()
    }

    /// All entries in `(path, stage)` order.
    pub fn entries(&self) -> &[StagingEntry] {
        &self.entries
    }

    /// Whether any conflict stages exist.
    pub fn has_conflicts(&self) -> bool {
        self.entries.iter().any(|e| e.stage != Stage::Normal)
    }

    /// Paths with unresolved conflicts, deduplicated, in path order.
    pub fn conflict_paths(&self) -> Vec<&BStr> {
        let mut paths: Vec<&BStr> = self
            .entries
            .iter()
            .filter(|e| e.stage != Stage::Normal)
            .map(|e| e.path.as_bstr())
            .collect();
        paths.dedup();
        paths
    }

    pub fn cache_tree(&self) -> Option<&CacheTree> {
        self.cache_tree.as_ref()
    }

    pub fn set_cache_tree(&mut self, tree: Option<CacheTree>) {
        self.cache_tree = tree;
    }

    pub fn resolve_undo(&self) -> Option<&ResolveUndo> {
        self.resolve_undo.as_ref()
    }

    /// Extensions that were preserved but not interpreted.
    pub fn unknown_extensions(&self) -> &[RawExtension] {
        &self.unknown_extensions
    }

    /// Replace the store with stage-0 entries expanded from a tree.
    pub fn read_tree(&mut self, trees: &Trees, tree_id: &ObjectId) -> Result<(), IndexError> {
        tree::read_tree(self, trees, tree_id)
    }

    /// Fold stage-0 entries into trees bottom-up, returning the root.
    /// Refuses while conflicts remain.
    pub fn write_tree(&self, trees: &Trees) -> Result<ObjectId, IndexError> {
        tree::write_tree(self, trees)
    }

    /// Swap in a pre-validated, sorted entry set.
    pub(crate) fn replace_entries(&mut self, entries: Vec<StagingEntry>) {
        self.entries = entries;
        // The cached tree no longer matches the new contents.
        self.cache_tree = None;
    }

    pub(crate) fn set_state(
        &mut self,
        version: u32,
        entries: Vec<StagingEntry>,
        cache_tree: Option<CacheTree>,
        resolve_undo: Option<ResolveUndo>,
        unknown_extensions: Vec<RawExtension>,
    ) {
        self.version = version;
        self.entries = entries;
        self.cache_tree = cache_tree;
        self.resolve_undo = resolve_undo;
        self.unknown_extensions = unknown_extensions;
    }
}

impl Default for Staging {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry ordering: path bytes, then stage.
pub(crate) fn cmp_entries(a: &StagingEntry, b: &StagingEntry) -> std::cmp::Ordering {
    a.path
        .cmp(&b.path)
        .then(a.stage.as_u8().cmp(&b.stage.as_u8()))
}

/// Validate a sorted entry set: ordering, duplicates, stage exclusivity,
/// and path shape.
pub(crate) fn validate_entries(entries: &[StagingEntry]) -> Result<(), IndexError> {
    for entry in entries {
        validate_path(entry.path.as_bstr())?;
    }
    for pair in entries.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        match cmp_entries(a, b) {
            std::cmp::Ordering::Less => {}
            _ => {
                return Err(IndexError::DuplicateEntry {
                    path: b.path.clone(),
                    stage: b.stage.as_u8(),
                })
            }
        }
    }

    let mut i = 0;
    while i < entries.len() {
        let path = &entries[i].path;
        let mut has_zero = false;
        let mut has_conflict = false;
        let mut j = i;
        while j < entries.len() && entries[j].path == *path {
            match entries[j].stage {
                Stage::Normal => has_zero = true,
                _ => has_conflict = true,
            }
            j += 1;
        }
        if has_zero && has_conflict {
            return Err(IndexError::StageConflict { path: path.clone() });
        }
        i = j;
    }
    Ok(())
}
