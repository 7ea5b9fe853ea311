//! Git dates and author/committer signatures.
//!
//! The on-disk form is `<name> <<email>> <unix-seconds> <±HHMM>`. Timezone
//! offsets are carried as minutes internally and rendered in git's decimal
//! notation (`-0500` for five hours west).

use bstr::{BStr, BString, ByteSlice, ByteVec};
use chrono::{Local, Offset};

use crate::{Result, UtilError};

/// A timestamp with timezone, as git stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GitDate {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Timezone offset in minutes east of UTC.
    pub tz_offset: i32,
}

fn tz_decimal_to_minutes(tz: i32) -> i32 {
    let sign = if tz < 0 { -1 } else { 1 };
    let abs = tz.abs();
    sign * ((abs / 100) * 60 + abs % 100)
}

fn minutes_to_tz_decimal(minutes: i32) -> i32 {
    let sign = if minutes < 0 { -1 } else { 1 };
    let abs = minutes.abs();
    sign * ((abs / 60) * 100 + abs % 60)
}

impl GitDate {
    /// Create from a Unix timestamp and an offset in minutes.
    pub fn new(timestamp: i64, tz_offset_minutes: i32) -> Self {
        Self {
            timestamp,
            tz_offset: tz_offset_minutes,
        }
    }

    /// The current time in the local timezone.
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            timestamp: now.timestamp(),
            tz_offset: now.offset().fix().local_minus_utc() / 60,
        }
    }

    /// Parse git's raw form: `"<seconds> ±HHMM"` (offset optional).
    pub fn parse_raw(input: &str) -> Result<Self> {
        let input = input.trim();
        let mut parts = input.splitn(2, ' ');

        let ts_str = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| UtilError::DateParse("empty date string".into()))?;
        let timestamp: i64 = ts_str
            .parse()
            .map_err(|_| UtilError::DateParse(format!("invalid timestamp: '{ts_str}'")))?;

        let tz_offset = match parts.next() {
            Some(tz_str) => {
                let tz_str = tz_str.trim();
                if !tz_str.starts_with('+') && !tz_str.starts_with('-') {
                    return Err(UtilError::DateParse(format!(
                        "invalid timezone offset: '{tz_str}'"
                    )));
                }
                let tz: i32 = tz_str
                    .parse()
                    .map_err(|_| UtilError::DateParse(format!("invalid timezone: '{tz_str}'")))?;
                tz_decimal_to_minutes(tz)
            }
            None => 0,
        };

        Ok(Self {
            timestamp,
            tz_offset,
        })
    }

    /// Format in git's raw form: `"<seconds> ±HHMM"`.
    pub fn format_raw(&self) -> String {
        format!(
            "{} {:+05}",
            self.timestamp,
            minutes_to_tz_decimal(self.tz_offset)
        )
    }
}

/// An author or committer identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    pub date: GitDate,
}

impl Signature {
    /// Create a validated signature. Names and emails must not contain the
    /// angle brackets that delimit them on disk, or newlines.
    pub fn new(name: impl Into<BString>, email: impl Into<BString>, date: GitDate) -> Result<Self> {
        let name = name.into();
        let email = email.into();
        for (label, value) in [("name", &name), ("email", &email)] {
            if value.find_byteset(b"<>\n").is_some() {
                return Err(UtilError::InvalidIdentity(format!(
                    "{label} must not contain '<', '>' or newline: {value}"
                )));
            }
        }
        Ok(Self { name, email, date })
    }

    /// Parse the serialized form `"Name <email> seconds ±HHMM"`.
    pub fn parse(input: &BStr) -> Result<Self> {
        let gt = input
            .rfind_byte(b'>')
            .ok_or_else(|| UtilError::SignatureParse("missing '>'".into()))?;
        let lt = input[..gt]
            .rfind_byte(b'<')
            .ok_or_else(|| UtilError::SignatureParse("missing '<'".into()))?;

        let name = input[..lt].trim();
        let email = &input[lt + 1..gt];
        let date_str = std::str::from_utf8(input[gt + 1..].trim())
            .map_err(|_| UtilError::SignatureParse("non-UTF-8 date".into()))?;

        Ok(Self {
            name: BString::from(name),
            email: BString::from(email),
            date: GitDate::parse_raw(date_str)?,
        })
    }

    /// Serialize to git's canonical byte form.
    pub fn to_bytes(&self) -> BString {
        let mut out = BString::new(Vec::new());
        out.push_str(&self.name);
        out.push_str(b" <");
        out.push_str(&self.email);
        out.push_str(b"> ");
        out.push_str(self.date.format_raw().as_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_raw_with_offset() {
        let d = GitDate::parse_raw("1234567890 -0500").unwrap();
        assert_eq!(d.timestamp, 1234567890);
        assert_eq!(d.tz_offset, -300);
    }

    #[test]
    fn parse_raw_half_hour_offset() {
        let d = GitDate::parse_raw("1234567890 +0530").unwrap();
        assert_eq!(d.tz_offset, 330);
    }

    #[test]
    fn format_raw_roundtrip() {
        for (ts, minutes) in [(0i64, 0i32), (1234567890, -300), (1700000000, 330)] {
            let d = GitDate::new(ts, minutes);
            let parsed = GitDate::parse_raw(&d.format_raw()).unwrap();
            assert_eq!(parsed, d);
        }
    }

    #[test]
    fn format_raw_zero_offset() {
        assert_eq!(GitDate::new(1234567890, 0).format_raw(), "1234567890 +0000");
    }

    #[test]
    fn signature_roundtrip() {
        let sig = Signature::new("Ada Lovelace", "ada@example.com", GitDate::new(1234567890, 60))
            .unwrap();
        let bytes = sig.to_bytes();
        assert_eq!(bytes, "Ada Lovelace <ada@example.com> 1234567890 +0100");
        let parsed = Signature::parse(bytes.as_bstr()).unwrap();
        assert_eq!(parsed, sig);
    }

    #[test]
    fn signature_rejects_brackets() {
        assert!(Signature::new("Bad <Name", "ok@example.com", GitDate::new(0, 0)).is_err());
        assert!(Signature::new("Ok Name", "bad>@example.com", GitDate::new(0, 0)).is_err());
    }

    #[test]
    fn parse_signature_with_angle_email() {
        let sig = Signature::parse(b"A Committer <c@example.org> 1000000000 +0000".as_bstr())
            .unwrap();
        assert_eq!(sig.name, "A Committer");
        assert_eq!(sig.email, "c@example.org");
        assert_eq!(sig.date.timestamp, 1_000_000_000);
    }

    #[test]
    fn parse_signature_missing_brackets() {
        assert!(Signature::parse(b"no brackets here 1 +0000".as_bstr()).is_err());
    }

    #[test]
    fn now_is_recent() {
        let d = GitDate::now();
        assert!(d.timestamp > 1_600_000_000);
    }
}
