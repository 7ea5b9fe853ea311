//! Delta computation: hashed block matching with greedy extension.
//!
//! The base is indexed by fixed-size blocks; the target is scanned for
//! matching blocks, each extended forward as far as the buffers agree.
//! Matched runs become copy ranges, everything else becomes insert ranges.
//! Copies at or below the literal threshold are folded into the
//! surrounding inserts, since their instruction overhead is not worth it.

use std::collections::HashMap;

use super::{ranges_to_ops, Delta, DeltaRange, RangeOrigin};

/// Block size for the match index.
const BLOCK_SIZE: usize = 16;

/// Copies no longer than this collapse into literal inserts.
const LITERAL_THRESHOLD: usize = 15;

/// Compute wire-format delta bytes transforming `base` into `target`.
pub fn compute_delta(base: &[u8], target: &[u8]) -> Vec<u8> {
    let ranges = compute_ranges(base, target);
    Delta {
        base_size: base.len(),
        target_size: target.len(),
        ops: ranges_to_ops(&ranges, target),
    }
    .encode()
}

/// Compute the range decomposition of `target` against `base`.
///
/// Every target byte is covered exactly once; ranges alternate between
/// source copies and target literals (consecutive literals are merged).
pub fn compute_ranges(base: &[u8], target: &[u8]) -> Vec<DeltaRange> {
    let mut ranges: Vec<DeltaRange> = Vec::new();
    if target.is_empty() {
        return ranges;
    }

    let index = build_block_index(base);

    let mut tpos = 0;
    let mut literal_start = 0;

    while tpos < target.len() {
        let remaining = target.len() - tpos;
        if remaining >= BLOCK_SIZE {
            if let Some(&src_offset) = index.get(&target[tpos..tpos + BLOCK_SIZE]) {
                let match_len = extend_match(base, src_offset, target, tpos);
                if match_len > LITERAL_THRESHOLD {
                    if literal_start < tpos {
                        push_literal(&mut ranges, literal_start, tpos);
                    }
                    ranges.push(DeltaRange {
                        origin: RangeOrigin::Source,
                        start: src_offset,
                        len: match_len,
                    });
                    tpos += match_len;
                    literal_start = tpos;
                    continue;
                }
            }
        }
        tpos += 1;
    }

    if literal_start < target.len() {
        push_literal(&mut ranges, literal_start, target.len());
    }

    ranges
}

fn push_literal(ranges: &mut Vec<DeltaRange>, start: usize, end: usize) {
    if let Some(last) = ranges.last_mut() {
        if last.origin == RangeOrigin::Target && last.start + last.len == start {
            last.len = end - last.start;
            return;
        }
    }
    ranges.push(DeltaRange {
        origin: RangeOrigin::Target,
        start,
        len: end - start,
    });
}

/// Index non-overlapping blocks of the base; first occurrence wins so
/// copies prefer earlier (cheaper) offsets.
fn build_block_index(base: &[u8]) -> HashMap<&[u8], usize> {
    let mut index = HashMap::new();
    if base.len() < BLOCK_SIZE {
        return index;
    }
    for offset in (0..=base.len() - BLOCK_SIZE).step_by(BLOCK_SIZE) {
        index.entry(&base[offset..offset + BLOCK_SIZE]).or_insert(offset);
    }
    index
}

/// Extend a block match forward while the buffers agree.
fn extend_match(base: &[u8], src_off: usize, target: &[u8], tgt_off: usize) -> usize {
    let max_len = (base.len() - src_off).min(target.len() - tgt_off);
    let mut len = BLOCK_SIZE;
    while len < max_len && base[src_off + len] == target[tgt_off + len] {
        len += 1;
    }
    len
}
