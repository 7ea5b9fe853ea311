//! Targeted staging edits.
//!
//! The editor collects edits and applies them in one merged pass over the
//! sorted entry stream, so a batch of changes costs a single traversal
//! regardless of its size.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use bstr::{BString, ByteSlice};

use crate::entry::StagingEntry;
use crate::{cmp_entries, validate_entries, IndexError, Stage, Staging};

/// One queued edit.
#[derive(Debug, Clone)]
pub enum StagingEdit {
    /// Insert or replace the entry at `(entry.path, entry.stage)`.
    Upsert(StagingEntry),
    /// Remove the entry at `(path, stage)`.
    Remove { path: BString, stage: Stage },
    /// Remove `prefix` itself and every entry under `prefix + "/"`.
    DeleteSubtree { prefix: BString },
    /// Keep only `stage` for `path`, rewritten to stage 0.
    ResolveConflict { path: BString, stage: Stage },
}

#[derive(Default)]
pub struct StagingEditor {
    edits: Vec<StagingEdit>,
}

impl StagingEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edit: StagingEdit) -> &mut Self {
        self.edits.push(edit);
        self
    }

    pub fn upsert(&mut self, entry: StagingEntry) -> &mut Self {
        self.push(StagingEdit::Upsert(entry))
    }

    pub fn remove(&mut self, path: impl Into<BString>, stage: Stage) -> &mut Self {
        self.push(StagingEdit::Remove {
            path: path.into(),
            stage,
        })
    }

    pub fn delete_subtree(&mut self, prefix: impl Into<BString>) -> &mut Self {
        self.push(StagingEdit::DeleteSubtree {
            prefix: prefix.into(),
        })
    }

    pub fn resolve_conflict(&mut self, path: impl Into<BString>, stage: Stage) -> &mut Self {
        self.push(StagingEdit::ResolveConflict {
            path: path.into(),
            stage,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply all queued edits, validating the result before it replaces
    /// the store.
    pub fn apply(self, staging: &mut Staging) -> Result<(), IndexError> {
        let mut upserts: BTreeMap<(BString, u8), StagingEntry> = BTreeMap::new();
        let mut removes: BTreeSet<(BString, u8)> = BTreeSet::new();
        let mut subtrees: Vec<BString> = Vec::new();
        let mut resolves: HashMap<BString, Stage> = HashMap::new();

        for edit in self.edits {
            match edit {
                StagingEdit::Upsert(entry) => {
                    let key = (entry.path.clone(), entry.stage.as_u8());
                    removes.remove(&key);
                    upserts.insert(key, entry);
                }
                StagingEdit::Remove { path, stage } => {
                    let key = (path, stage.as_u8());
                    upserts.remove(&key);
                    removes.insert(key);
                }
                StagingEdit::DeleteSubtree { prefix } => subtrees.push(prefix),
                StagingEdit::ResolveConflict { path, stage } => {
                    resolves.insert(path, stage);
                }
            }
        }

        let in_deleted_subtree = |path: &BString| -> bool {
            subtrees.iter().any(|prefix| {
                path == prefix
                    || (path.len() > prefix.len()
                        && path.starts_with(prefix.as_bytes())
                        && path[prefix.len()] == b'/')
            })
        };

        let mut result: Vec<StagingEntry> = Vec::with_capacity(staging.len());
        for entry in staging.entries() {
            if in_deleted_subtree(&entry.path) {
                continue;
            }
            if removes.contains(&(entry.path.clone(), entry.stage.as_u8())) {
                continue;
            }
            if let Some(&chosen) = resolves.get(&entry.path) {
                if entry.stage == chosen {
                    result.push(entry.clone().at_stage(Stage::Normal));
                }
                // Other stages of the conflict are dropped.
                continue;
            }
            if upserts.contains_key(&(entry.path.clone(), entry.stage.as_u8())) {
                // Replaced below.
                continue;
            }
            result.push(entry.clone());
        }

        for (_, entry) in upserts {
            result.push(entry);
        }

        result.sort_by(cmp_entries);
        validate_entries(&result)?;
        staging.replace_entries(result);
        Ok(())
    }
}
