use bstr::{BStr, BString, ByteSlice};
use vault_hash::ObjectId;
use vault_util::date::Signature;

use crate::{ObjectError, ObjectType};

/// An annotated tag object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// ID of the tagged object.
    pub target: ObjectId,
    /// Kind of the tagged object.
    pub target_type: ObjectType,
    /// Tag name.
    pub tag_name: BString,
    /// Tagger identity; absent in some historical tags.
    pub tagger: Option<Signature>,
    /// Tag message.
    pub message: BString,
    /// Trailing GPG/SSH signature block, kept verbatim.
    pub gpgsig: Option<BString>,
}

impl Tag {
    /// Parse a tag payload (no object header).
    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        let mut target: Option<ObjectId> = None;
        let mut target_type: Option<ObjectType> = None;
        let mut tag_name: Option<BString> = None;
        let mut tagger: Option<Signature> = None;

        let data = payload;
        let mut pos = 0;

        loop {
            if pos >= data.len() {
                break;
            }
            if data[pos] == b'\n' {
                pos += 1;
                break;
            }

            let line_end = data[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| p + pos)
                .unwrap_or(data.len());
            let line = &data[pos..line_end];

            if let Some(space_pos) = line.iter().position(|&b| b == b' ') {
                let key = &line[..space_pos];
                let value = &line[space_pos + 1..];
                match key {
                    b"object" => {
                        let hex = std::str::from_utf8(value).map_err(|_| {
                            ObjectError::InvalidHeader("non-UTF-8 target id".into())
                        })?;
                        target = Some(ObjectId::from_hex(hex)?);
                    }
                    b"type" => {
                        target_type = Some(ObjectType::from_bytes(value)?);
                    }
                    b"tag" => {
                        tag_name = Some(BString::from(value));
                    }
                    b"tagger" => {
                        tagger = Some(
                            Signature::parse(BStr::new(value))
                                .map_err(|e| ObjectError::InvalidSignature(e.to_string()))?,
                        );
                    }
                    _ => {}
                }
            }

            pos = line_end + 1;
        }

        // The signature, if present, trails the message verbatim.
        let remaining = &data[pos.min(data.len())..];
        let (message, gpgsig) = match remaining
            .find(b"-----BEGIN PGP SIGNATURE-----")
            .or_else(|| remaining.find(b"-----BEGIN SSH SIGNATURE-----"))
        {
            Some(sig_start) => (
                BString::from(&remaining[..sig_start]),
                Some(BString::from(&remaining[sig_start..])),
            ),
            None => (BString::from(remaining), None),
        };

        Ok(Self {
            target: target.ok_or(ObjectError::MissingTagField { field: "object" })?,
            target_type: target_type.ok_or(ObjectError::MissingTagField { field: "type" })?,
            tag_name: tag_name.ok_or(ObjectError::MissingTagField { field: "tag" })?,
            tagger,
            message,
            gpgsig,
        })
    }

    /// Serialize to the canonical payload.
    pub fn serialize_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();

        push_header(&mut out, b"object", self.target.to_hex().as_bytes());
        push_header(&mut out, b"type", self.target_type.as_bytes());
        push_header(&mut out, b"tag", &self.tag_name);
        if let Some(ref tagger) = self.tagger {
            push_header(&mut out, b"tagger", &tagger.to_bytes());
        }

        out.push(b'\n');
        out.extend_from_slice(&self.message);

        if let Some(ref sig) = self.gpgsig {
            out.extend_from_slice(sig);
        }

        out
    }
}

/// Append one `key value\n` header line.
fn push_header(out: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    out.extend_from_slice(key);
    out.push(b' ');
    out.extend_from_slice(value);
    out.push(b'\n');
}
