//! Server session framing.
//!
//! A session opens with one pkt-line request,
//! `"<service> <path>\0host=<h>\0"` (optionally followed by
//! `"version=<v>\0"`), answers with a ref advertisement whose first record
//! carries the capability list after a NUL, then hands off to the service
//! handler. Any failure ends the session.

use std::io::{Read, Write};

use bstr::ByteSlice;
use vault_hash::ObjectId;

use crate::pktline::{PktLineReader, PktLineWriter};
use crate::WireError;

/// The two pack services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    UploadPack,
    ReceivePack,
}

impl Service {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "git-upload-pack" => Some(Self::UploadPack),
            "git-receive-pack" => Some(Self::ReceivePack),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }
}

/// A parsed session request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    pub service: Service,
    pub path: String,
    pub host: Option<String>,
    pub version: Option<u32>,
}

/// Parse the request line `"<service> <path>\0host=<h>\0[version=<v>\0]"`.
pub fn parse_request(line: &[u8]) -> Result<ServiceRequest, WireError> {
    let mut fields = line.split(|&b| b == 0);

    let head = fields
        .next()
        .ok_or_else(|| WireError::Protocol("empty request".into()))?;
    let space = head
        .find_byte(b' ')
        .ok_or_else(|| WireError::Protocol("missing path in request".into()))?;

    let service_name = std::str::from_utf8(&head[..space])
        .map_err(|_| WireError::Protocol("non-UTF-8 service name".into()))?;
    let service = Service::from_name(service_name)
        .ok_or_else(|| WireError::UnknownService(service_name.to_string()))?;

    let path = std::str::from_utf8(&head[space + 1..])
        .map_err(|_| WireError::Protocol("non-UTF-8 repository path".into()))?
        .to_string();
    if path.is_empty() {
        return Err(WireError::Protocol("empty repository path".into()));
    }

    let mut host = None;
    let mut version = None;
    for field in fields {
        if field.is_empty() {
            continue;
        }
        let field = std::str::from_utf8(field)
            .map_err(|_| WireError::Protocol("non-UTF-8 request field".into()))?;
        if let Some(value) = field.strip_prefix("host=") {
            host = Some(value.to_string());
        } else if let Some(value) = field.strip_prefix("version=") {
            version = Some(
                value
                    .parse()
                    .map_err(|_| WireError::Protocol(format!("bad version: {value}")))?,
            );
        }
        // Unknown fields are tolerated for forward compatibility.
    }

    Ok(ServiceRequest {
        service,
        path,
        host,
        version,
    })
}

/// Write the ref advertisement: the first record carries the capability
/// list after a NUL, the rest are plain `<id> <name>` records, then a
/// flush. An empty repository advertises capabilities on a zero-id record.
pub fn advertise_refs<W: Write>(
    writer: &mut PktLineWriter<W>,
    refs: &[(ObjectId, String)],
    capabilities: &[&str],
) -> Result<(), WireError> {
    let caps = capabilities.join(" ");

    match refs.split_first() {
        Some(((first_id, first_name), rest)) => {
            let mut line = Vec::new();
            line.extend_from_slice(first_id.to_hex().as_bytes());
            line.push(b' ');
            line.extend_from_slice(first_name.as_bytes());
            line.push(0);
            line.extend_from_slice(caps.as_bytes());
            line.push(b'\n');
            writer.write_line(&line)?;

            for (id, name) in rest {
                writer.write_text(&format!("{} {}", id.to_hex(), name))?;
            }
        }
        None => {
            let mut line = Vec::new();
            line.extend_from_slice(ObjectId::NULL.to_hex().as_bytes());
            line.extend_from_slice(b" capabilities^{}");
            line.push(0);
            line.extend_from_slice(caps.as_bytes());
            line.push(b'\n');
            writer.write_line(&line)?;
        }
    }

    writer.write_flush()?;
    writer.flush()?;
    Ok(())
}

/// Run one server session: read the request, validate the service,
/// advertise `refs`, and dispatch to `handler`. The handler receives the
/// parsed request plus the still-open reader and writer.
pub fn serve<R: Read, W: Write>(
    input: R,
    output: W,
    refs: &[(ObjectId, String)],
    capabilities: &[&str],
    handler: impl FnOnce(
        &ServiceRequest,
        &mut PktLineReader<R>,
        &mut PktLineWriter<W>,
    ) -> Result<(), WireError>,
) -> Result<ServiceRequest, WireError> {
    let mut reader = PktLineReader::new(input);
    let mut writer = PktLineWriter::new(output);

    let line = reader
        .read_line()?
        .ok_or_else(|| WireError::Protocol("flush before request".into()))?;
    let request = parse_request(&line)?;

    advertise_refs(&mut writer, refs, capabilities)?;
    handler(&request, &mut reader, &mut writer)?;
    Ok(request)
}
