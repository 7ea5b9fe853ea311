//! Reachability: every object transitively referenced from the refs.

use std::collections::{HashSet, VecDeque};

use vault_hash::ObjectId;
use vault_history::History;
use vault_object::ObjectType;

use crate::GcError;

/// The live object set, partitioned by kind. Each vector is sorted.
#[derive(Debug, Clone, Default)]
pub struct Reachable {
    pub commits: Vec<ObjectId>,
    pub trees: Vec<ObjectId>,
    pub blobs: Vec<ObjectId>,
    pub tags: Vec<ObjectId>,
}

impl Reachable {
    pub fn total(&self) -> usize {
        self.commits.len() + self.trees.len() + self.blobs.len() + self.tags.len()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.commits.binary_search(id).is_ok()
            || self.trees.binary_search(id).is_ok()
            || self.blobs.binary_search(id).is_ok()
            || self.tags.binary_search(id).is_ok()
    }
}

/// Walk all refs, then commits, trees, and blobs, cycle-safe.
pub fn collect_reachable(history: &History) -> Result<Reachable, GcError> {
    let mut commits: HashSet<ObjectId> = HashSet::new();
    let mut trees: HashSet<ObjectId> = HashSet::new();
    let mut blobs: HashSet<ObjectId> = HashSet::new();
    let mut tags: HashSet<ObjectId> = HashSet::new();

    let mut commit_queue: VecDeque<ObjectId> = VecDeque::new();

    for reference in history.refs.list(None)? {
        let Some(id) = history.refs.resolve(reference.name())? else {
            continue;
        };
        enqueue_object(history, id, &mut tags, &mut commit_queue, &mut trees, &mut blobs)?;
    }

    while let Some(commit_id) = commit_queue.pop_front() {
        if !commits.insert(commit_id) {
            continue;
        }
        let Some(commit) = history.commits.load(&commit_id)? else {
            continue;
        };
        walk_tree(history, commit.tree, &mut trees, &mut blobs)?;
        for parent in commit.parents {
            if !commits.contains(&parent) {
                commit_queue.push_back(parent);
            }
        }
    }

    let mut result = Reachable {
        commits: commits.into_iter().collect(),
        trees: trees.into_iter().collect(),
        blobs: blobs.into_iter().collect(),
        tags: tags.into_iter().collect(),
    };
    result.commits.sort();
    result.trees.sort();
    result.blobs.sort();
    result.tags.sort();
    Ok(result)
}

/// Classify a ref target: annotated tags are recorded and peeled, commits
/// queue for ancestry, bare trees/blobs walk directly.
fn enqueue_object(
    history: &History,
    id: ObjectId,
    tags: &mut HashSet<ObjectId>,
    commit_queue: &mut VecDeque<ObjectId>,
    trees: &mut HashSet<ObjectId>,
    blobs: &mut HashSet<ObjectId>,
) -> Result<(), GcError> {
    if history.commits.has(&id) {
        commit_queue.push_back(id);
        return Ok(());
    }
    if let Some(tag) = history.tags.load(&id)? {
        if tags.insert(id) {
            match tag.target_type {
                ObjectType::Commit => commit_queue.push_back(tag.target),
                ObjectType::Tag => {
                    enqueue_object(history, tag.target, tags, commit_queue, trees, blobs)?
                }
                ObjectType::Tree => walk_tree(history, tag.target, trees, blobs)?,
                ObjectType::Blob => {
                    blobs.insert(tag.target);
                }
            }
        }
        return Ok(());
    }
    if history.trees.has(&id) {
        walk_tree(history, id, trees, blobs)?;
        return Ok(());
    }
    if history.blobs.has(&id) {
        blobs.insert(id);
    }
    Ok(())
}

fn walk_tree(
    history: &History,
    root: ObjectId,
    trees: &mut HashSet<ObjectId>,
    blobs: &mut HashSet<ObjectId>,
) -> Result<(), GcError> {
    let mut queue = VecDeque::new();
    queue.push_back(root);

    while let Some(tree_id) = queue.pop_front() {
        if !trees.insert(tree_id) {
            continue;
        }
        let Some(tree) = history.trees.load(&tree_id)? else {
            continue;
        };
        for entry in tree.iter() {
            if entry.mode.is_tree() {
                if !trees.contains(&entry.id) {
                    queue.push_back(entry.id);
                }
            } else if !entry.mode.is_gitlink() {
                blobs.insert(entry.id);
            }
        }
    }
    Ok(())
}
