//! On-disk delta record: `[20-byte base id][zlib-compressed delta]`.

use vault_hash::ObjectId;

/// One stored delta relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaRecord {
    /// Immediate base of the target.
    pub base: ObjectId,
    /// Zlib-compressed git binary delta transforming base into target.
    pub compressed_delta: Vec<u8>,
}

impl DeltaRecord {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(20 + self.compressed_delta.len());
        out.extend_from_slice(self.base.as_bytes());
        out.extend_from_slice(&self.compressed_delta);
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < 20 {
            return Err(format!("record too short: {} bytes", bytes.len()));
        }
        let base = ObjectId::from_bytes(&bytes[..20]).map_err(|e| e.to_string())?;
        Ok(Self {
            base,
            compressed_delta: bytes[20..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let record = DeltaRecord {
            base: ObjectId::EMPTY_TREE,
            compressed_delta: vec![1, 2, 3, 4],
        };
        let parsed = DeltaRecord::parse(&record.serialize()).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn short_record_rejected() {
        assert!(DeltaRecord::parse(&[0u8; 10]).is_err());
    }

    #[test]
    fn empty_delta_is_legal() {
        let record = DeltaRecord {
            base: ObjectId::NULL,
            compressed_delta: Vec::new(),
        };
        assert_eq!(DeltaRecord::parse(&record.serialize()).unwrap(), record);
    }
}
