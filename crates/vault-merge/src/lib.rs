//! Three-way tree merge.
//!
//! The three trees are flattened to `path -> (id, mode)` maps and every
//! distinct path is classified into one of fourteen cases. Four of them
//! are conflicts; everything else resolves mechanically. Two sides are
//! "the same" only when both the object ID and the mode match. Conflicts
//! are part of the result, never an error.

mod flatten;
mod staging;

pub use flatten::{flatten_tree, FlatEntry};
pub use staging::stage_result;

use std::collections::BTreeSet;

use bstr::BString;
use vault_hash::ObjectId;
use vault_odb::Trees;

/// Errors from merge plumbing (lookup failures, not conflicts).
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("tree not found: {0}")]
    TreeNotFound(ObjectId),

    #[error(transparent)]
    Odb(#[from] vault_odb::OdbError),

    #[error(transparent)]
    Index(#[from] vault_index::IndexError),
}

/// How one path relates across base, ours, and theirs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeCase {
    Unchanged,
    AddedByUs,
    AddedByThem,
    AddedBothSame,
    AddedBothDiffer,
    DeletedByUs,
    DeletedByThem,
    DeletedBoth,
    ModifiedByUs,
    ModifiedByThem,
    ModifiedBothSame,
    ModifiedBothDiffer,
    /// Ours deleted, theirs modified.
    DeleteModify,
    /// Ours modified, theirs deleted.
    ModifyDelete,
}

impl MergeCase {
    /// Whether this case needs user resolution.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            MergeCase::AddedBothDiffer
                | MergeCase::ModifiedBothDiffer
                | MergeCase::DeleteModify
                | MergeCase::ModifyDelete
        )
    }
}

/// A cleanly merged path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEntry {
    pub path: BString,
    pub entry: FlatEntry,
    pub case: MergeCase,
}

/// An unresolved path with whichever sides exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub path: BString,
    pub case: MergeCase,
    pub base: Option<FlatEntry>,
    pub ours: Option<FlatEntry>,
    pub theirs: Option<FlatEntry>,
}

/// Outcome of a tree merge.
#[derive(Debug, Clone, Default)]
pub struct TreeMergeResult {
    /// Surviving paths in path order.
    pub merged: Vec<MergedEntry>,
    /// Conflicted paths in path order.
    pub conflicts: Vec<MergeConflict>,
}

impl TreeMergeResult {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Conflicted paths only.
    pub fn conflict_paths(&self) -> Vec<&BString> {
        self.conflicts.iter().map(|c| &c.path).collect()
    }
}

/// Merge `ours` and `theirs` against their common `base`.
pub fn merge_trees(
    trees: &Trees,
    base: &ObjectId,
    ours: &ObjectId,
    theirs: &ObjectId,
) -> Result<TreeMergeResult, MergeError> {
    let base_map = flatten_tree(trees, base)?;
    let ours_map = flatten_tree(trees, ours)?;
    let theirs_map = flatten_tree(trees, theirs)?;

    let mut paths: BTreeSet<&BString> = BTreeSet::new();
    paths.extend(base_map.keys());
    paths.extend(ours_map.keys());
    paths.extend(theirs_map.keys());

    let mut result = TreeMergeResult::default();

    for path in paths {
        let b = base_map.get(path);
        let o = ours_map.get(path);
        let t = theirs_map.get(path);

        let case = classify(b, o, t);
        if case.is_conflict() {
            result.conflicts.push(MergeConflict {
                path: path.clone(),
                case,
                base: b.cloned(),
                ours: o.cloned(),
                theirs: t.cloned(),
            });
            continue;
        }

        // The surviving side for clean cases.
        let survivor = match case {
            MergeCase::Unchanged | MergeCase::ModifiedByThem | MergeCase::AddedByThem => t,
            MergeCase::ModifiedByUs
            | MergeCase::AddedByUs
            | MergeCase::AddedBothSame
            | MergeCase::ModifiedBothSame => o,
            MergeCase::DeletedByUs
            | MergeCase::DeletedByThem
            | MergeCase::DeletedBoth => None,
            _ => unreachable!("conflict cases handled above"),
        };
        if let Some(entry) = survivor {
            result.merged.push(MergedEntry {
                path: path.clone(),
                entry: entry.clone(),
                case,
            });
        }
    }

    Ok(result)
}

/// Classify one path. `None` means the side lacks the path.
pub fn classify(
    base: Option<&FlatEntry>,
    ours: Option<&FlatEntry>,
    theirs: Option<&FlatEntry>,
) -> MergeCase {
    match (base, ours, theirs) {
        (None, Some(_), None) => MergeCase::AddedByUs,
        (None, None, Some(_)) => MergeCase::AddedByThem,
        (None, Some(o), Some(t)) => {
            if o == t {
                MergeCase::AddedBothSame
            } else {
                MergeCase::AddedBothDiffer
            }
        }
        (Some(_), None, None) => MergeCase::DeletedBoth,
        (Some(b), None, Some(t)) => {
            if t == b {
                MergeCase::DeletedByUs
            } else {
                MergeCase::DeleteModify
            }
        }
        (Some(b), Some(o), None) => {
            if o == b {
                MergeCase::DeletedByThem
            } else {
                MergeCase::ModifyDelete
            }
        }
        (Some(b), Some(o), Some(t)) => {
            let ours_changed = o != b;
            let theirs_changed = t != b;
            match (ours_changed, theirs_changed) {
                (false, false) => MergeCase::Unchanged,
                (true, false) => MergeCase::ModifiedByUs,
                (false, true) => MergeCase::ModifiedByThem,
                (true, true) => {
                    if o == t {
                        MergeCase::ModifiedBothSame
                    } else {
                        MergeCase::ModifiedBothDiffer
                    }
                }
            }
        }
        (None, None, None) => unreachable!("path absent from all three trees"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_object::FileMode;

    fn entry(n: u8, mode: FileMode) -> FlatEntry {
        let mut bytes = [0u8; 20];
        bytes[0] = n;
        FlatEntry {
            id: ObjectId::from(bytes),
            mode,
        }
    }

    #[test]
    fn all_fourteen_cases() {
        use MergeCase::*;
        let b = entry(1, FileMode::Regular);
        let x = entry(2, FileMode::Regular);
        let y = entry(3, FileMode::Regular);

        assert_eq!(classify(None, Some(&x), None), AddedByUs);
        assert_eq!(classify(None, None, Some(&x)), AddedByThem);
        assert_eq!(classify(None, Some(&x), Some(&x)), AddedBothSame);
        assert_eq!(classify(None, Some(&x), Some(&y)), AddedBothDiffer);
        assert_eq!(classify(Some(&b), None, Some(&b)), DeletedByUs);
        assert_eq!(classify(Some(&b), Some(&b), None), DeletedByThem);
        assert_eq!(classify(Some(&b), None, None), DeletedBoth);
        assert_eq!(classify(Some(&b), Some(&x), Some(&b)), ModifiedByUs);
        assert_eq!(classify(Some(&b), Some(&b), Some(&x)), ModifiedByThem);
        assert_eq!(classify(Some(&b), Some(&x), Some(&x)), ModifiedBothSame);
        assert_eq!(classify(Some(&b), Some(&x), Some(&y)), ModifiedBothDiffer);
        assert_eq!(classify(Some(&b), None, Some(&x)), DeleteModify);
        assert_eq!(classify(Some(&b), Some(&x), None), ModifyDelete);
        assert_eq!(classify(Some(&b), Some(&b), Some(&b)), Unchanged);
    }

    #[test]
    fn mode_change_alone_is_a_change() {
        let b = entry(1, FileMode::Regular);
        let exec = entry(1, FileMode::Executable);
        assert_eq!(
            classify(Some(&b), Some(&exec), Some(&b)),
            MergeCase::ModifiedByUs
        );
        // Same ID, different modes on both sides: still a conflict.
        let symlink = entry(1, FileMode::Symlink);
        assert_eq!(
            classify(Some(&b), Some(&exec), Some(&symlink)),
            MergeCase::ModifiedBothDiffer
        );
    }

    #[test]
    fn conflict_set_is_exactly_four() {
        use MergeCase::*;
        let conflicts: Vec<MergeCase> = [
            Unchanged,
            AddedByUs,
            AddedByThem,
            AddedBothSame,
            AddedBothDiffer,
            DeletedByUs,
            DeletedByThem,
            DeletedBoth,
            ModifiedByUs,
            ModifiedByThem,
            ModifiedBothSame,
            ModifiedBothDiffer,
            DeleteModify,
            ModifyDelete,
        ]
        .into_iter()
        .filter(MergeCase::is_conflict)
        .collect();
        assert_eq!(
            conflicts,
            vec![AddedBothDiffer, ModifiedBothDiffer, DeleteModify, ModifyDelete]
        );
    }
}
