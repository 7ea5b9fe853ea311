//! Checkout: materialize a tree into the worktree.
//!
//! The flow compares the flattened HEAD tree with the flattened target
//! tree, refuses when a differing path carries local changes (worktree vs
//! index, or index vs HEAD), then applies removals and writes, rebuilds
//! the staging area at stage 0, and moves `HEAD`.

use std::collections::BTreeMap;

use bstr::{BStr, BString, ByteSlice};
use vault_hash::ObjectId;
use vault_history::History;
use vault_index::{Stage, StagingBuilder, StatData};
use vault_merge::{flatten_tree, FlatEntry};
use vault_object::ObjectType;
use vault_ref::RefName;

use crate::{WorktreeError, WriteOptions, Worktree};

/// What to check out.
#[derive(Debug, Clone)]
pub enum CheckoutTarget {
    /// A branch: `HEAD` becomes symbolic to it.
    Branch(RefName),
    /// A commit (or annotated tag): `HEAD` detaches to it.
    Commit(ObjectId),
}

#[derive(Debug, Clone, Default)]
pub struct CheckoutOptions {
    /// Restrict the operation to these path prefixes.
    pub paths: Option<Vec<BString>>,
    /// Report what would change without touching anything.
    pub dry_run: bool,
    /// Overwrite local changes instead of refusing.
    pub force: bool,
}

/// Outcome of a checkout.
#[derive(Debug, Clone, Default)]
pub struct CheckoutResult {
    /// Paths written or updated.
    pub updated: Vec<BString>,
    /// Paths removed.
    pub removed: Vec<BString>,
    /// Paths that blocked the checkout; non-empty means nothing was
    /// touched.
    pub conflicts: Vec<BString>,
    /// Whether filesystem changes were applied.
    pub performed: bool,
}

/// Check out `target` into `worktree`.
pub fn checkout_tree(
    history: &History,
    worktree: &Worktree,
    target: CheckoutTarget,
    opts: &CheckoutOptions,
) -> Result<CheckoutResult, WorktreeError> {
    let commit_id = resolve_target(history, &target)?;
    let target_tree = history
        .commits
        .get_tree(&commit_id)?
        .ok_or(WorktreeError::TargetNotFound(commit_id))?;

    let head_flat = match history.head_commit()? {
        Some(head) => {
            let head_tree = history
                .commits
                .get_tree(&head)?
                .ok_or(WorktreeError::TargetNotFound(head))?;
            flatten_tree(&history.trees, &head_tree)?
        }
        None => BTreeMap::new(),
    };
    let target_flat = flatten_tree(&history.trees, &target_tree)?;

    let in_scope = |path: &BString| -> bool {
        match &opts.paths {
            None => true,
            Some(prefixes) => prefixes.iter().any(|p| {
                path == p
                    || (path.len() > p.len()
                        && path.starts_with(p.as_bytes())
                        && path[p.len()] == b'/')
            }),
        }
    };

    // Removals: in HEAD, not in target. Updates: new or differing.
    let mut removals: Vec<BString> = Vec::new();
    let mut updates: Vec<(BString, FlatEntry)> = Vec::new();

    for path in head_flat.keys() {
        if in_scope(path) && !target_flat.contains_key(path) {
            removals.push(path.clone());
        }
    }
    for (path, entry) in &target_flat {
        if in_scope(path) && head_flat.get(path) != Some(entry) {
            updates.push((path.clone(), entry.clone()));
        }
    }

    let mut result = CheckoutResult::default();

    if !opts.force {
        let staging = history.read_staging()?;
        let mut check = |path: &BString| -> Result<(), WorktreeError> {
            let index_id = staging
                .get(path.as_bstr(), Stage::Normal)
                .map(|e| e.id);
            let head_id = head_flat.get(path).map(|e| e.id);
            let worktree_id = worktree.compute_hash(path.as_bstr())?;

            let dirty_worktree = match (worktree_id, index_id) {
                (Some(w), Some(i)) => w != i,
                (None, None) => false,
                // Tracked but deleted locally, or present but untracked.
                _ => worktree_id.is_some() || index_id.is_some(),
            };
            let dirty_index = match (index_id, head_id) {
                (Some(i), Some(h)) => i != h,
                (None, None) => false,
                _ => true,
            };
            if dirty_worktree || dirty_index {
                result.conflicts.push(path.clone());
            }
            Ok(())
        };

        for path in &removals {
            check(path)?;
        }
        for (path, _) in &updates {
            check(path)?;
        }
        result.conflicts.sort();
        result.conflicts.dedup();
        if !result.conflicts.is_empty() {
            return Ok(result);
        }
    }

    result.removed = removals.clone();
    result.updated = updates.iter().map(|(p, _)| p.clone()).collect();

    if opts.dry_run {
        return Ok(result);
    }

    for path in &removals {
        worktree.remove(path.as_bstr(), false)?;
    }
    for (path, entry) in &updates {
        let content = history
            .blobs
            .load(&entry.id)?
            .ok_or(WorktreeError::TargetNotFound(entry.id))?;
        worktree.write_content(
            path.as_bstr(),
            &content,
            &WriteOptions {
                mode: entry.mode,
                create_parents: true,
                overwrite: true,
            },
        )?;
    }

    let mut staging = history.read_staging()?;
    if opts.paths.is_none() {
        // Full checkout: rebuild the staging area from the target tree.
        let mut builder = StagingBuilder::new();
        builder.add_tree(&history.trees, &target_tree, BStr::new(""), Stage::Normal)?;
        builder.finish(&mut staging)?;
    } else {
        // Path-limited checkout: touch only the affected entries.
        let mut editor = vault_index::StagingEditor::new();
        for path in &removals {
            editor.remove(path.clone(), Stage::Normal);
        }
        for (path, entry) in &updates {
            editor.upsert(vault_index::StagingEntry::new(
                path.clone(),
                entry.id,
                entry.mode,
            ));
        }
        editor.apply(&mut staging)?;
    }
    refresh_stat_data(worktree, &mut staging)?;
    history.write_staging(&staging)?;

    // A path-limited checkout restores files without moving HEAD.
    if opts.paths.is_none() {
        match &target {
            CheckoutTarget::Branch(branch) => {
                history.refs.set_symbolic(&RefName::new("HEAD")?, branch)?;
            }
            CheckoutTarget::Commit(_) => {
                history.refs.set(&RefName::new("HEAD")?, &commit_id)?;
            }
        }
    }

    result.performed = true;
    Ok(result)
}

fn resolve_target(
    history: &History,
    target: &CheckoutTarget,
) -> Result<ObjectId, WorktreeError> {
    match target {
        CheckoutTarget::Branch(branch) => history
            .refs
            .resolve(branch)?
            .ok_or_else(|| WorktreeError::UnbornBranch(branch.to_string())),
        CheckoutTarget::Commit(id) => {
            if history.commits.has(id) {
                return Ok(*id);
            }
            // An annotated tag peels to its commit.
            if let Some((peeled, ObjectType::Commit)) = history.tags.get_target(id, true)? {
                return Ok(peeled);
            }
            Err(WorktreeError::TargetNotFound(*id))
        }
    }
}

fn refresh_stat_data(
    worktree: &Worktree,
    staging: &mut vault_index::Staging,
) -> Result<(), WorktreeError> {
    let updated: Vec<vault_index::StagingEntry> = staging
        .entries()
        .iter()
        .map(|entry| {
            let mut entry = entry.clone();
            if let Ok(abs) = worktree.abs_path(entry.path.as_bstr()) {
                if let Ok(meta) = std::fs::symlink_metadata(abs) {
                    entry.stat = StatData::from_metadata(&meta);
                }
            }
            entry
        })
        .collect();

    let mut builder = StagingBuilder::new();
    for entry in updated {
        builder.add(entry);
    }
    builder.finish(staging)?;
    Ok(())
}
