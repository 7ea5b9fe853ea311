//! Pkt-line framing.
//!
//! Every packet opens with a 4-hex-digit length that includes the length
//! field itself. `0000` is a flush (section end), `0001` a delimiter
//! (protocol v2 section separator).

use std::io::{Read, Write};

use crate::WireError;

/// Maximum data bytes per packet (65520 minus the 4-byte header).
pub const MAX_PKT_DATA_LEN: usize = 65516;

/// One parsed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    Data(Vec<u8>),
    /// `0000` — end of section.
    Flush,
    /// `0001` — v2 section separator.
    Delimiter,
}

/// Reads pkt-lines from any byte stream.
pub struct PktLineReader<R> {
    reader: R,
}

impl<R: Read> PktLineReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Read one packet.
    pub fn read_pkt(&mut self) -> Result<PktLine, WireError> {
        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                WireError::Protocol("unexpected EOF reading pkt-line length".into())
            } else {
                WireError::Io(e)
            }
        })?;

        let len_str = std::str::from_utf8(&len_buf)
            .map_err(|_| WireError::InvalidPktLine(format!("non-hex length: {len_buf:?}")))?;
        let len = u16::from_str_radix(len_str, 16)
            .map_err(|_| WireError::InvalidPktLine(format!("bad length: {len_str:?}")))?;

        match len {
            0 => Ok(PktLine::Flush),
            1 => Ok(PktLine::Delimiter),
            2 | 3 => Err(WireError::InvalidPktLine(format!(
                "reserved pkt-line length {len}"
            ))),
            _ => {
                let data_len = usize::from(len) - 4;
                if data_len > MAX_PKT_DATA_LEN {
                    return Err(WireError::InvalidPktLine(format!(
                        "pkt-line too long: {data_len} bytes"
                    )));
                }
                let mut data = vec![0u8; data_len];
                self.reader.read_exact(&mut data)?;
                Ok(PktLine::Data(data))
            }
        }
    }

    /// Read one data packet; `None` at a flush or delimiter.
    pub fn read_line(&mut self) -> Result<Option<Vec<u8>>, WireError> {
        match self.read_pkt()? {
            PktLine::Data(data) => Ok(Some(data)),
            PktLine::Flush | PktLine::Delimiter => Ok(None),
        }
    }

    /// Collect data packets up to the next flush.
    pub fn read_until_flush(&mut self) -> Result<Vec<Vec<u8>>, WireError> {
        let mut lines = Vec::new();
        while let PktLine::Data(data) = self.read_pkt()? {
            lines.push(data);
        }
        Ok(lines)
    }
}

/// Writes pkt-lines to any byte sink.
pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: Write> PktLineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Write one data packet.
    pub fn write_line(&mut self, data: &[u8]) -> Result<(), WireError> {
        if data.len() > MAX_PKT_DATA_LEN {
            return Err(WireError::InvalidPktLine(format!(
                "data too long for one pkt-line: {} bytes",
                data.len()
            )));
        }
        write!(self.writer, "{:04x}", data.len() + 4)?;
        self.writer.write_all(data)?;
        Ok(())
    }

    /// Write a text line, appending the newline when missing.
    pub fn write_text(&mut self, text: &str) -> Result<(), WireError> {
        if text.ends_with('\n') {
            self.write_line(text.as_bytes())
        } else {
            let mut data = Vec::with_capacity(text.len() + 1);
            data.extend_from_slice(text.as_bytes());
            data.push(b'\n');
            self.write_line(&data)
        }
    }

    pub fn write_flush(&mut self) -> Result<(), WireError> {
        self.writer.write_all(b"0000")?;
        Ok(())
    }

    pub fn write_delimiter(&mut self) -> Result<(), WireError> {
        self.writer.write_all(b"0001")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), WireError> {
        self.writer.flush()?;
        Ok(())
    }
}
