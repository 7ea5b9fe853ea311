//! Tree <-> staging materialization.

use bstr::{BStr, ByteSlice};
use vault_hash::ObjectId;
use vault_object::{FileMode, Tree, TreeEntry};
use vault_odb::Trees;

use crate::entry::StagingEntry;
use crate::{IndexError, Stage, Staging, StagingBuilder};

/// Replace the staging contents with stage-0 entries expanded from
/// `tree_id`.
pub fn read_tree(
    staging: &mut Staging,
    trees: &Trees,
    tree_id: &ObjectId,
) -> Result<(), IndexError> {
    let mut builder = StagingBuilder::new();
    builder.add_tree(trees, tree_id, BStr::new(""), Stage::Normal)?;
    builder.finish(staging)
}

/// Fold stage-0 entries into nested trees, leaves first, and return the
/// root tree ID. Conflict stages abort the write.
pub fn write_tree(staging: &Staging, trees: &Trees) -> Result<ObjectId, IndexError> {
    if let Some(path) = staging.conflict_paths().first() {
        return Err(IndexError::UnresolvedConflicts {
            path: (*path).to_owned(),
        });
    }

    let entries: Vec<&StagingEntry> = staging.entries().iter().collect();
    build_tree(&entries, b"", trees)
}

fn build_tree(
    entries: &[&StagingEntry],
    prefix: &[u8],
    trees: &Trees,
) -> Result<ObjectId, IndexError> {
    let mut tree_entries: Vec<TreeEntry> = Vec::new();
    let mut i = 0;

    while i < entries.len() {
        let rel = &entries[i].path[prefix.len()..];

        if let Some(slash) = rel.find_byte(b'/') {
            let dir_name = &rel[..slash];

            // The span of entries under this directory: paths are sorted,
            // so it is contiguous.
            let span_end = entries[i..]
                .iter()
                .position(|e| {
                    let p = &e.path[prefix.len()..];
                    !(p.len() > slash && p[..slash] == *dir_name && p[slash] == b'/')
                })
                .map(|pos| i + pos)
                .unwrap_or(entries.len());

            let mut sub_prefix = prefix.to_vec();
            sub_prefix.extend_from_slice(dir_name);
            sub_prefix.push(b'/');

            let subtree_id = build_tree(&entries[i..span_end], &sub_prefix, trees)?;
            tree_entries.push(TreeEntry {
                mode: FileMode::Tree,
                name: dir_name.into(),
                id: subtree_id,
            });
            i = span_end;
        } else {
            tree_entries.push(TreeEntry {
                mode: entries[i].mode,
                name: rel.into(),
                id: entries[i].id,
            });
            i += 1;
        }
    }

    let mut tree = Tree {
        entries: tree_entries,
    };
    tree.sort();
    Ok(trees.store(&tree)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vault_raw::MemoryStore;

    fn trees() -> Trees {
        Trees::new(Arc::new(MemoryStore::new()))
    }

    fn oid(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[0] = n;
        ObjectId::from(bytes)
    }

    fn stage_paths(staging: &mut Staging, paths: &[&str]) {
        let mut builder = StagingBuilder::new();
        for path in paths {
            builder.add(StagingEntry::new(*path, oid(7), FileMode::Regular));
        }
        builder.finish(staging).unwrap();
    }

    #[test]
    fn empty_staging_writes_empty_tree() {
        let trees = trees();
        let staging = Staging::new();
        assert_eq!(staging.write_tree(&trees).unwrap(), ObjectId::EMPTY_TREE);
    }

    #[test]
    fn nested_fold_and_expand_roundtrip() {
        let trees = trees();
        let mut staging = Staging::new();
        stage_paths(
            &mut staging,
            &["README.md", "src/lib.rs", "src/sub/deep.rs", "tests/t.rs"],
        );

        let root = staging.write_tree(&trees).unwrap();

        let mut restored = Staging::new();
        restored.read_tree(&trees, &root).unwrap();

        let paths: Vec<String> = restored
            .entries()
            .iter()
            .map(|e| e.path.to_string())
            .collect();
        assert_eq!(
            paths,
            vec!["README.md", "src/lib.rs", "src/sub/deep.rs", "tests/t.rs"]
        );
        assert!(restored.entries().iter().all(|e| e.stage == Stage::Normal));
        assert!(restored.entries().iter().all(|e| e.id == oid(7)));

        // The fold is deterministic.
        assert_eq!(restored.write_tree(&trees).unwrap(), root);
    }

    #[test]
    fn write_tree_refuses_conflicts() {
        let trees = trees();
        let mut staging = Staging::new();
        let mut builder = StagingBuilder::new();
        builder.add(StagingEntry::new("f.txt", oid(1), FileMode::Regular).at_stage(Stage::Ours));
        builder.add(StagingEntry::new("f.txt", oid(2), FileMode::Regular).at_stage(Stage::Theirs));
        builder.finish(&mut staging).unwrap();

        assert!(matches!(
            staging.write_tree(&trees),
            Err(IndexError::UnresolvedConflicts { .. })
        ));
    }

    #[test]
    fn sibling_dirs_with_shared_prefix() {
        let trees = trees();
        let mut staging = Staging::new();
        stage_paths(&mut staging, &["ab/x.txt", "abc/y.txt", "abd.txt"]);

        let root = staging.write_tree(&trees).unwrap();
        let entries = trees.entries(&root).unwrap().unwrap();
        let names: Vec<String> = entries.iter().map(|e| e.name.to_string()).collect();
        assert_eq!(names, vec!["ab", "abc", "abd.txt"]);
    }
}
