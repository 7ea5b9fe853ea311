//! Apply a delta to a base buffer, reconstructing the target.

use crate::PackError;

use super::Delta;

/// Apply wire-format delta bytes to `base`.
///
/// Both declared sizes are validated; every copy is bounds-checked against
/// the base.
pub fn apply_delta(base: &[u8], delta_bytes: &[u8]) -> Result<Vec<u8>, PackError> {
    let delta = Delta::parse(delta_bytes)?;
    apply_parsed(base, &delta)
}

/// Apply an already-parsed delta to `base`.
pub fn apply_parsed(base: &[u8], delta: &Delta) -> Result<Vec<u8>, PackError> {
    if delta.base_size != base.len() {
        return Err(PackError::InvalidDelta {
            offset: 0,
            reason: format!(
                "base size mismatch: delta says {}, base is {}",
                delta.base_size,
                base.len()
            ),
        });
    }

    let mut output = Vec::with_capacity(delta.target_size);
    for op in &delta.ops {
        match op {
            super::DeltaOp::Copy { offset, len } => {
                let start = *offset as usize;
                let end = start.checked_add(*len).filter(|&e| e <= base.len()).ok_or(
                    PackError::InvalidDelta {
                        offset: *offset,
                        reason: format!(
                            "copy out of bounds: offset={offset}, len={len}, base_len={}",
                            base.len()
                        ),
                    },
                )?;
                output.extend_from_slice(&base[start..end]);
            }
            super::DeltaOp::Insert(data) => output.extend_from_slice(data),
        }
    }

    if output.len() != delta.target_size {
        return Err(PackError::InvalidDelta {
            offset: 0,
            reason: format!(
                "target size mismatch: delta says {}, got {}",
                delta.target_size,
                output.len()
            ),
        });
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{DeltaOp, Delta};

    fn wire(base_size: usize, target_size: usize, ops: Vec<DeltaOp>) -> Vec<u8> {
        Delta {
            base_size,
            target_size,
            ops,
        }
        .encode()
    }

    #[test]
    fn copy_only() {
        let base = b"Hello, World!";
        let delta = wire(
            base.len(),
            10,
            vec![
                DeltaOp::Copy { offset: 0, len: 5 },
                DeltaOp::Copy { offset: 7, len: 5 },
            ],
        );
        assert_eq!(apply_delta(base, &delta).unwrap(), b"HelloWorld");
    }

    #[test]
    fn insert_only() {
        let base = b"unused";
        let delta = wire(base.len(), 3, vec![DeltaOp::Insert(b"NEW".to_vec())]);
        assert_eq!(apply_delta(base, &delta).unwrap(), b"NEW");
    }

    #[test]
    fn mixed_instructions() {
        let base = b"ABCDEFGHIJ";
        let delta = wire(
            base.len(),
            9,
            vec![
                DeltaOp::Copy { offset: 0, len: 3 },
                DeltaOp::Insert(b"xyz".to_vec()),
                DeltaOp::Copy { offset: 7, len: 3 },
            ],
        );
        assert_eq!(apply_delta(base, &delta).unwrap(), b"ABCxyzHIJ");
    }

    #[test]
    fn copy_out_of_bounds_fails() {
        let base = b"short";
        let delta = wire(base.len(), 100, vec![DeltaOp::Copy { offset: 0, len: 100 }]);
        assert!(apply_delta(base, &delta).is_err());
    }

    #[test]
    fn base_size_mismatch_fails() {
        let base = b"Hello";
        let delta = wire(100, 5, vec![DeltaOp::Copy { offset: 0, len: 5 }]);
        assert!(apply_delta(base, &delta).is_err());
    }

    #[test]
    fn target_size_mismatch_fails() {
        let base = b"Hello";
        let delta = wire(base.len(), 10, vec![DeltaOp::Copy { offset: 0, len: 5 }]);
        assert!(apply_delta(base, &delta).is_err());
    }

    #[test]
    fn empty_target() {
        let base = b"anything";
        let delta = wire(base.len(), 0, vec![]);
        assert!(apply_delta(base, &delta).unwrap().is_empty());
    }
}
