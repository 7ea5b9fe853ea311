//! Property tests over the delta codec: compute∘apply identity and wire
//! round-trips.

use proptest::prelude::*;
use vault_pack::delta::apply::apply_delta;
use vault_pack::delta::compute::{compute_delta, compute_ranges};
use vault_pack::delta::Delta;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn apply_after_compute_is_identity(
        base in proptest::collection::vec(any::<u8>(), 0..4096),
        target in proptest::collection::vec(any::<u8>(), 0..4096),
    ) {
        let delta = compute_delta(&base, &target);
        prop_assert_eq!(apply_delta(&base, &delta).unwrap(), target);
    }

    #[test]
    fn edited_copy_roundtrips(
        base in proptest::collection::vec(any::<u8>(), 64..4096),
        edits in proptest::collection::vec((any::<prop::sample::Index>(), any::<u8>()), 0..16),
    ) {
        let mut target = base.clone();
        for (index, byte) in edits {
            let i = index.index(target.len());
            target[i] = byte;
        }
        let delta = compute_delta(&base, &target);
        prop_assert_eq!(apply_delta(&base, &delta).unwrap(), target);
    }

    #[test]
    fn ranges_cover_target_exactly(
        base in proptest::collection::vec(any::<u8>(), 0..2048),
        target in proptest::collection::vec(any::<u8>(), 0..2048),
    ) {
        let ranges = compute_ranges(&base, &target);
        let covered: usize = ranges.iter().map(|r| r.len).sum();
        prop_assert_eq!(covered, target.len());
    }

    #[test]
    fn wire_parse_encode_roundtrips(
        base in proptest::collection::vec(any::<u8>(), 0..2048),
        target in proptest::collection::vec(any::<u8>(), 0..2048),
    ) {
        let wire = compute_delta(&base, &target);
        let parsed = Delta::parse(&wire).unwrap();
        prop_assert_eq!(parsed.base_size, base.len());
        prop_assert_eq!(parsed.target_size, target.len());
        prop_assert_eq!(parsed.encode(), wire);
    }
}
