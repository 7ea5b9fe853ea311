//! Pack index lookup semantics: fan-out bounds, offsets, and CRC
//! agreement with the pack bytes.

use vault_hash::{hasher::Hasher, ObjectId};
use vault_object::ObjectType;
use vault_pack::index::{write_index, PackIndex};
use vault_pack::read::PackFile;
use vault_pack::write::create_pack;

fn synthetic_id(byte: u8) -> ObjectId {
    ObjectId::from([byte; 20])
}

#[test]
fn fanout_counts_are_cumulative_over_first_bytes() {
    // Three IDs with first bytes 0x11, 0x22, 0x33.
    let dir = tempfile::tempdir().unwrap();
    let idx_path = dir.path().join("synthetic.idx");
    let mut entries = vec![
        (synthetic_id(0x11), 100u64, 0xaaaa_0001u32),
        (synthetic_id(0x22), 200, 0xaaaa_0002),
        (synthetic_id(0x33), 300, 0xaaaa_0003),
    ];
    write_index(&idx_path, &mut entries, &ObjectId::NULL).unwrap();

    let idx = PackIndex::open(&idx_path).unwrap();
    idx.verify_checksum().unwrap();

    assert_eq!(idx.fanout_at(0x10), 0);
    assert_eq!(idx.fanout_at(0x11), 1);
    assert_eq!(idx.fanout_at(0x22), 2);
    assert_eq!(idx.fanout_at(0x33), 3);
    assert_eq!(idx.fanout_at(0xff), 3);

    assert_eq!(idx.lookup(&synthetic_id(0x22)), Some(200));
    assert_eq!(idx.lookup(&synthetic_id(0x44)), None);
}

#[test]
fn index_offsets_point_at_decompressable_entries() {
    let dir = tempfile::tempdir().unwrap();
    let objects = vec![
        (ObjectType::Blob, b"first payload".to_vec()),
        (ObjectType::Blob, b"second payload".to_vec()),
        (ObjectType::Blob, b"third payload".to_vec()),
    ];
    let (pack_path, idx_path, _) = create_pack(dir.path(), "lookup", &objects).unwrap();

    let pack = PackFile::open(&pack_path).unwrap();
    let idx = PackIndex::open(&idx_path).unwrap();

    for i in 0..idx.num_objects() {
        let id = idx.oid_at(i);
        let offset = idx.offset_at(i);

        // The entry at the stored offset resolves back to content whose
        // hash is the stored ID.
        let obj = pack.read_at_offset(offset).unwrap();
        let rehashed = Hasher::hash_object(obj.obj_type.as_str(), &obj.data).unwrap();
        assert_eq!(rehashed, id);

        // And the raw entry bytes hash to the stored CRC.
        let entry_bytes = pack.entry_bytes(offset).unwrap();
        assert_eq!(vault_util::crc32(entry_bytes), idx.crc32_at(i));
    }
}

#[test]
fn pack_checksum_recorded_in_index_trailer() {
    let dir = tempfile::tempdir().unwrap();
    let (pack_path, idx_path, checksum) = create_pack(
        dir.path(),
        "trailer",
        &[(ObjectType::Blob, b"x".to_vec())],
    )
    .unwrap();

    let idx = PackIndex::open(&idx_path).unwrap();
    assert_eq!(idx.pack_checksum(), checksum);

    let pack_bytes = std::fs::read(&pack_path).unwrap();
    assert_eq!(&pack_bytes[pack_bytes.len() - 20..], checksum.as_bytes());
}
