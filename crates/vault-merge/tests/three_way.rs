//! Three-way merges over stored trees, including the conflict-to-staging
//! flow.

use std::sync::Arc;

use bstr::BStr;
use vault_hash::ObjectId;
use vault_index::{Stage, Staging};
use vault_merge::{merge_trees, stage_result, MergeCase};
use vault_object::{FileMode, Tree, TreeEntry};
use vault_odb::{Blobs, Trees};
use vault_raw::MemoryStore;

fn stores() -> (Blobs, Trees) {
    let store: vault_odb::SharedStore = Arc::new(MemoryStore::new());
    (Blobs::new(Arc::clone(&store)), Trees::new(store))
}

fn tree_of(trees: &Trees, entries: &[(&str, ObjectId)]) -> ObjectId {
    let tree = Tree {
        entries: entries
            .iter()
            .map(|(name, id)| TreeEntry::new(FileMode::Regular, *name, *id).unwrap())
            .collect(),
    };
    trees.store(&tree).unwrap()
}

#[test]
fn both_modified_same_file_conflicts_into_three_stages() {
    let (blobs, trees) = stores();

    let blob_b = blobs.store(b"base content\n").unwrap();
    let blob_o = blobs.store(b"our content\n").unwrap();
    let blob_t = blobs.store(b"their content\n").unwrap();

    let base = tree_of(&trees, &[("file.txt", blob_b)]);
    let ours = tree_of(&trees, &[("file.txt", blob_o)]);
    let theirs = tree_of(&trees, &[("file.txt", blob_t)]);

    let result = merge_trees(&trees, &base, &ours, &theirs).unwrap();

    assert!(result.merged.is_empty());
    assert!(!result.is_clean());
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].path, "file.txt");
    assert_eq!(result.conflicts[0].case, MergeCase::ModifiedBothDiffer);

    let mut staging = Staging::new();
    stage_result(&mut staging, &result).unwrap();

    let entries = staging.entries_for(BStr::new("file.txt"));
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].stage, Stage::Base);
    assert_eq!(entries[0].id, blob_b);
    assert_eq!(entries[1].stage, Stage::Ours);
    assert_eq!(entries[1].id, blob_o);
    assert_eq!(entries[2].stage, Stage::Theirs);
    assert_eq!(entries[2].id, blob_t);

    // A conflicted staging area refuses to fold into a tree.
    assert!(staging.write_tree(&trees).is_err());
}

#[test]
fn disjoint_edits_merge_cleanly() {
    let (blobs, trees) = stores();

    let shared = blobs.store(b"shared\n").unwrap();
    let ours_new = blobs.store(b"ours added\n").unwrap();
    let theirs_edit = blobs.store(b"theirs edited\n").unwrap();

    let base = tree_of(&trees, &[("keep.txt", shared), ("edit.txt", shared)]);
    let ours = tree_of(
        &trees,
        &[
            ("keep.txt", shared),
            ("edit.txt", shared),
            ("new.txt", ours_new),
        ],
    );
    let theirs = tree_of(&trees, &[("keep.txt", shared), ("edit.txt", theirs_edit)]);

    let result = merge_trees(&trees, &base, &ours, &theirs).unwrap();
    assert!(result.is_clean());

    let paths: Vec<String> = result.merged.iter().map(|m| m.path.to_string()).collect();
    assert_eq!(paths, vec!["edit.txt", "keep.txt", "new.txt"]);

    let edited = result
        .merged
        .iter()
        .find(|m| m.path == "edit.txt")
        .unwrap();
    assert_eq!(edited.entry.id, theirs_edit);
    assert_eq!(edited.case, MergeCase::ModifiedByThem);
}

#[test]
fn deletions_and_delete_modify() {
    let (blobs, trees) = stores();

    let old = blobs.store(b"old\n").unwrap();
    let changed = blobs.store(b"changed\n").unwrap();

    let base = tree_of(&trees, &[("both-del.txt", old), ("del-mod.txt", old)]);
    let ours = tree_of(&trees, &[] as &[(&str, ObjectId)]);
    let theirs = tree_of(&trees, &[("del-mod.txt", changed)]);

    let result = merge_trees(&trees, &base, &ours, &theirs).unwrap();

    // both-del disappears cleanly; del-mod conflicts.
    assert!(result.merged.is_empty());
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].path, "del-mod.txt");
    assert_eq!(result.conflicts[0].case, MergeCase::DeleteModify);
    assert!(result.conflicts[0].ours.is_none());

    let mut staging = Staging::new();
    stage_result(&mut staging, &result).unwrap();
    let stages: Vec<u8> = staging
        .entries_for(BStr::new("del-mod.txt"))
        .iter()
        .map(|e| e.stage.as_u8())
        .collect();
    assert_eq!(stages, vec![1, 3]);
}

#[test]
fn nested_paths_compare_by_full_path() {
    let (blobs, trees) = stores();

    let v1 = blobs.store(b"v1\n").unwrap();
    let v2 = blobs.store(b"v2\n").unwrap();

    let sub_base = tree_of(&trees, &[("inner.txt", v1)]);
    let sub_ours = tree_of(&trees, &[("inner.txt", v2)]);

    let base = trees
        .store(&Tree {
            entries: vec![TreeEntry::new(FileMode::Tree, "dir", sub_base).unwrap()],
        })
        .unwrap();
    let ours = trees
        .store(&Tree {
            entries: vec![TreeEntry::new(FileMode::Tree, "dir", sub_ours).unwrap()],
        })
        .unwrap();

    let result = merge_trees(&trees, &base, &ours, &base).unwrap();
    assert!(result.is_clean());
    let changed = result
        .merged
        .iter()
        .find(|m| m.path == "dir/inner.txt")
        .unwrap();
    assert_eq!(changed.entry.id, v2);
    assert_eq!(changed.case, MergeCase::ModifiedByUs);
}
