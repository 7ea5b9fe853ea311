//! Object header codec: `"<type> <ascii-size>\0"`.

use crate::{ObjectError, ObjectType};

/// Headers longer than this are treated as corruption.
pub const MAX_HEADER_LEN: usize = 1024;

/// Parse an object header from the front of `data`.
///
/// Returns `(type, payload_size, header_length)` where `header_length`
/// includes the NUL terminator.
pub fn parse_header(data: &[u8]) -> Result<(ObjectType, usize, usize), ObjectError> {
    let scan_limit = data.len().min(MAX_HEADER_LEN);
    let null_pos = match data[..scan_limit].iter().position(|&b| b == 0) {
        Some(pos) => pos,
        None if data.len() >= MAX_HEADER_LEN => {
            return Err(ObjectError::HeaderTooLong {
                limit: MAX_HEADER_LEN,
            })
        }
        None => {
            return Err(ObjectError::InvalidHeader(
                "missing null terminator".into(),
            ))
        }
    };

    let header = &data[..null_pos];
    let space_pos = header
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ObjectError::InvalidHeader("missing space in header".into()))?;

    let obj_type = ObjectType::from_bytes(&header[..space_pos])?;

    let size_str = std::str::from_utf8(&header[space_pos + 1..])
        .map_err(|_| ObjectError::InvalidHeader("non-ASCII size".into()))?;
    if size_str.is_empty() || size_str.starts_with('+') {
        return Err(ObjectError::InvalidHeader(format!(
            "invalid size: {size_str:?}"
        )));
    }
    let payload_size: usize = size_str
        .parse()
        .map_err(|_| ObjectError::InvalidHeader(format!("invalid size: {size_str}")))?;

    Ok((obj_type, payload_size, null_pos + 1))
}

/// Write an object header.
pub fn write_header(obj_type: ObjectType, payload_size: usize) -> Vec<u8> {
    format!("{} {}\0", obj_type, payload_size).into_bytes()
}

/// Incremental header parser for streamed inputs where the header may span
/// chunk boundaries.
#[derive(Debug, Default)]
pub struct HeaderScanner {
    buf: Vec<u8>,
}

impl HeaderScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk.
    ///
    /// Returns `Some((type, payload_size, leftover))` once the header is
    /// complete, where `leftover` is the tail of `chunk` past the header.
    /// Returns `None` while more input is needed.
    pub fn push(
        &mut self,
        chunk: &[u8],
    ) -> Result<Option<(ObjectType, usize, Vec<u8>)>, ObjectError> {
        let already = self.buf.len();
        self.buf.extend_from_slice(chunk);

        if let Some(null_pos) = self.buf.iter().position(|&b| b == 0) {
            let (obj_type, size, header_len) = parse_header(&self.buf[..=null_pos])?;
            debug_assert_eq!(header_len, null_pos + 1);
            let leftover = self.buf[header_len..].to_vec();
            self.buf.clear();
            let _ = already;
            return Ok(Some((obj_type, size, leftover)));
        }

        if self.buf.len() >= MAX_HEADER_LEN {
            return Err(ObjectError::HeaderTooLong {
                limit: MAX_HEADER_LEN,
            });
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_blob_header() {
        let data = b"blob 12\0hello world!";
        let (ty, size, hdr_len) = parse_header(data).unwrap();
        assert_eq!(ty, ObjectType::Blob);
        assert_eq!(size, 12);
        assert_eq!(hdr_len, 8);
        assert_eq!(&data[hdr_len..], b"hello world!");
    }

    #[test]
    fn write_parse_roundtrip() {
        let hdr = write_header(ObjectType::Tree, 42);
        let (ty, size, len) = parse_header(&hdr).unwrap();
        assert_eq!(ty, ObjectType::Tree);
        assert_eq!(size, 42);
        assert_eq!(len, hdr.len());
    }

    #[test]
    fn missing_null() {
        assert!(parse_header(b"blob 12").is_err());
    }

    #[test]
    fn missing_space() {
        assert!(parse_header(b"blob12\0").is_err());
    }

    #[test]
    fn unknown_type() {
        assert!(parse_header(b"wobble 12\0").is_err());
    }

    #[test]
    fn bad_size() {
        assert!(parse_header(b"blob abc\0").is_err());
        assert!(parse_header(b"blob \0").is_err());
        assert!(parse_header(b"blob +3\0").is_err());
    }

    #[test]
    fn oversized_header_is_resource_error() {
        let data = vec![b'a'; MAX_HEADER_LEN + 10];
        assert!(matches!(
            parse_header(&data),
            Err(ObjectError::HeaderTooLong { .. })
        ));
    }

    #[test]
    fn scanner_spanning_chunks() {
        let mut scanner = HeaderScanner::new();
        assert!(scanner.push(b"blo").unwrap().is_none());
        assert!(scanner.push(b"b 1").unwrap().is_none());
        let (ty, size, leftover) = scanner.push(b"1\0hello again").unwrap().unwrap();
        assert_eq!(ty, ObjectType::Blob);
        assert_eq!(size, 11);
        assert_eq!(leftover, b"hello again");
    }

    #[test]
    fn scanner_single_chunk() {
        let mut scanner = HeaderScanner::new();
        let (ty, size, leftover) = scanner.push(b"tree 0\0").unwrap().unwrap();
        assert_eq!(ty, ObjectType::Tree);
        assert_eq!(size, 0);
        assert!(leftover.is_empty());
    }

    #[test]
    fn scanner_caps_header_length() {
        let mut scanner = HeaderScanner::new();
        let big = vec![b'x'; MAX_HEADER_LEN];
        assert!(matches!(
            scanner.push(&big),
            Err(ObjectError::HeaderTooLong { .. })
        ));
    }
}
