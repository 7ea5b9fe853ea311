//! Property tests over object serialization: byte-exact round-trips and
//! canonicalization idempotence.

use bstr::BString;
use proptest::prelude::*;
use vault_hash::ObjectId;
use vault_object::{Commit, FileMode, Tag, Tree, TreeEntry};
use vault_util::date::{GitDate, Signature};

fn arb_id() -> impl Strategy<Value = ObjectId> {
    any::<[u8; 20]>().prop_map(ObjectId::from)
}

fn arb_name() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_][a-zA-Z0-9._-]{0,24}"
        .prop_filter("entry names must not be dot names", |s| s != "." && s != "..")
}

fn arb_mode() -> impl Strategy<Value = FileMode> {
    prop::sample::select(vec![
        FileMode::Regular,
        FileMode::Executable,
        FileMode::Symlink,
        FileMode::Gitlink,
        FileMode::Tree,
    ])
}

fn arb_signature() -> impl Strategy<Value = Signature> {
    (
        "[A-Za-z][A-Za-z ]{0,20}[A-Za-z]",
        "[a-z0-9.]{1,12}@[a-z0-9.]{1,12}",
        0i64..=2_000_000_000,
        prop::sample::select(vec![0i32, 60, -300, 330, 780]),
    )
        .prop_map(|(name, email, ts, tz)| {
            Signature::new(name, email, GitDate::new(ts, tz)).expect("generated identity is clean")
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn tree_serialization_is_canonical_and_idempotent(
        entries in proptest::collection::btree_map(arb_name(), (arb_mode(), arb_id()), 0..12),
    ) {
        let tree = Tree {
            entries: entries
                .into_iter()
                .map(|(name, (mode, id))| TreeEntry::new(mode, name, id).unwrap())
                .collect(),
        };

        let once = tree.serialize_payload();
        let parsed = Tree::parse(&once).unwrap();
        // Parse∘serialize is the identity on canonical bytes.
        prop_assert_eq!(parsed.serialize_payload(), once);

        // Entries come out in tree order.
        for pair in parsed.entries.windows(2) {
            prop_assert!(TreeEntry::cmp_entries(&pair[0], &pair[1]).is_lt());
        }
    }

    #[test]
    fn commit_roundtrips_byte_for_byte(
        tree in arb_id(),
        parents in proptest::collection::vec(arb_id(), 0..3),
        author in arb_signature(),
        committer in arb_signature(),
        message in "[ -~\n]{0,200}",
    ) {
        let commit = Commit {
            tree,
            parents,
            author,
            committer,
            encoding: None,
            gpgsig: None,
            message: BString::from(message),
        };
        let bytes = commit.serialize_payload();
        let parsed = Commit::parse(&bytes).unwrap();
        prop_assert_eq!(&parsed, &commit);
        prop_assert_eq!(parsed.serialize_payload(), bytes);
    }

    #[test]
    fn tag_roundtrips_byte_for_byte(
        target in arb_id(),
        tag_name in "[a-zA-Z0-9._/-]{1,30}",
        tagger in arb_signature(),
        message in "[ -~\n]{0,120}",
    ) {
        let tag = Tag {
            target,
            target_type: vault_object::ObjectType::Commit,
            tag_name: BString::from(tag_name),
            tagger: Some(tagger),
            message: BString::from(message),
            gpgsig: None,
        };
        let bytes = tag.serialize_payload();
        let parsed = Tag::parse(&bytes).unwrap();
        prop_assert_eq!(&parsed, &tag);
        prop_assert_eq!(parsed.serialize_payload(), bytes);
    }
}
