//! Ancestry walks and merge-base computation.

use std::collections::{HashMap, HashSet, VecDeque};

use vault_hash::ObjectId;
use vault_odb::Commits;

use crate::HistoryError;

/// Paint flags for the merge-base walk.
const FROM_A: u8 = 1;
const FROM_B: u8 = 2;

/// BFS from `start`: the start commit first, then parents level by level,
/// each commit yielded once. `limit` caps the yield count.
pub fn walk_ancestry(
    commits: &Commits,
    start: &ObjectId,
    limit: Option<usize>,
) -> Result<Vec<ObjectId>, HistoryError> {
    let mut out = Vec::new();
    let mut queue = VecDeque::new();
    let mut visited = HashSet::new();

    queue.push_back(*start);
    visited.insert(*start);

    while let Some(current) = queue.pop_front() {
        if let Some(cap) = limit {
            if out.len() >= cap {
                break;
            }
        }
        let parents = commits
            .get_parents(&current)?
            .ok_or(HistoryError::CommitNotFound(current))?;
        out.push(current);

        for parent in parents {
            if visited.insert(parent) {
                queue.push_back(parent);
            }
        }
    }
    Ok(out)
}

/// Whether `ancestor` is reachable from `descendant` (a commit is its own
/// ancestor).
pub fn is_ancestor(
    commits: &Commits,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> Result<bool, HistoryError> {
    if ancestor == descendant {
        return Ok(true);
    }

    let mut queue = VecDeque::new();
    let mut visited = HashSet::new();
    queue.push_back(*descendant);
    visited.insert(*descendant);

    while let Some(current) = queue.pop_front() {
        if current == *ancestor {
            return Ok(true);
        }
        let Some(parents) = commits.get_parents(&current)? else {
            continue;
        };
        for parent in parents {
            if visited.insert(parent) {
                queue.push_back(parent);
            }
        }
    }
    Ok(false)
}

/// Minimal common ancestors of `a` and `b`.
///
/// Commits reachable from `a` are painted with one color, from `b` with
/// the other; commits carrying both colors are common ancestors, and any
/// candidate that is an ancestor of another candidate is dropped.
pub fn find_merge_base(
    commits: &Commits,
    a: &ObjectId,
    b: &ObjectId,
) -> Result<Vec<ObjectId>, HistoryError> {
    if a == b {
        return Ok(vec![*a]);
    }

    let mut colors: HashMap<ObjectId, u8> = HashMap::new();
    paint(commits, a, FROM_A, &mut colors)?;
    paint(commits, b, FROM_B, &mut colors)?;

    let candidates: Vec<ObjectId> = colors
        .iter()
        .filter(|(_, &color)| color == FROM_A | FROM_B)
        .map(|(id, _)| *id)
        .collect();

    remove_redundant(commits, candidates)
}

fn paint(
    commits: &Commits,
    start: &ObjectId,
    color: u8,
    colors: &mut HashMap<ObjectId, u8>,
) -> Result<(), HistoryError> {
    let mut queue = VecDeque::new();
    queue.push_back(*start);

    while let Some(current) = queue.pop_front() {
        let entry = colors.entry(current).or_insert(0);
        if *entry & color != 0 {
            continue;
        }
        *entry |= color;

        if let Some(parents) = commits.get_parents(&current)? {
            queue.extend(parents);
        }
    }
    Ok(())
}

/// Drop any candidate that is an ancestor of another candidate.
fn remove_redundant(
    commits: &Commits,
    candidates: Vec<ObjectId>,
) -> Result<Vec<ObjectId>, HistoryError> {
    if candidates.len() <= 1 {
        return Ok(candidates);
    }

    let mut dropped: HashSet<ObjectId> = HashSet::new();
    for i in 0..candidates.len() {
        if dropped.contains(&candidates[i]) {
            continue;
        }
        for j in 0..candidates.len() {
            if i == j || dropped.contains(&candidates[j]) {
                continue;
            }
            // candidates[j] above candidates[i] makes i redundant.
            if candidates[i] != candidates[j]
                && is_ancestor(commits, &candidates[i], &candidates[j])?
            {
                dropped.insert(candidates[i]);
                break;
            }
        }
    }

    let mut result: Vec<ObjectId> = candidates
        .into_iter()
        .filter(|c| !dropped.contains(c))
        .collect();
    result.sort();
    Ok(result)
}
