//! Validated reference names.

use std::fmt;

use bstr::{BStr, BString, ByteSlice};

use crate::RefError;

/// Characters forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[u8] = b" ~^:?*[\\";

/// Ref names valid without a `refs/` prefix.
const SPECIAL_REFS: &[&str] = &[
    "HEAD",
    "MERGE_HEAD",
    "CHERRY_PICK_HEAD",
    "REVERT_HEAD",
    "ORIG_HEAD",
    "FETCH_HEAD",
];

/// A reference name validated against the `git-check-ref-format` rules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefName(BString);

impl RefName {
    /// Create a validated ref name.
    pub fn new(name: impl Into<BString>) -> Result<Self, RefError> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    /// Short form: `main` for `refs/heads/main`.
    pub fn short_name(&self) -> &BStr {
        let s = self.0.as_bstr();
        for prefix in [b"refs/heads/".as_ref(), b"refs/tags/", b"refs/remotes/"] {
            if let Some(rest) = s.strip_prefix(prefix) {
                return rest.as_bstr();
            }
        }
        s
    }

    pub fn is_branch(&self) -> bool {
        self.0.starts_with(b"refs/heads/")
    }

    pub fn is_tag(&self) -> bool {
        self.0.starts_with(b"refs/tags/")
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("<invalid-utf8>")
    }

    pub fn as_bstr(&self) -> &BStr {
        self.0.as_bstr()
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn validate(name: &[u8]) -> Result<(), RefError> {
    let shown = || String::from_utf8_lossy(name).into_owned();

    if name.is_empty() {
        return Err(RefError::InvalidName("ref name is empty".into()));
    }
    if name.contains(&0) || name.iter().any(|&b| b < 0x20 || b == 0x7f) {
        return Err(RefError::InvalidName(format!(
            "'{}': contains control characters",
            shown()
        )));
    }
    if name.iter().any(|b| FORBIDDEN_CHARS.contains(b)) {
        return Err(RefError::InvalidName(format!(
            "'{}': contains a forbidden character",
            shown()
        )));
    }
    if name.starts_with(b"/") || name.ends_with(b"/") || name.find(b"//").is_some() {
        return Err(RefError::InvalidName(format!(
            "'{}': bad slash placement",
            shown()
        )));
    }
    if name.find(b"..").is_some() || name.find(b"@{").is_some() {
        return Err(RefError::InvalidName(format!(
            "'{}': contains '..' or '@{{'",
            shown()
        )));
    }
    if name == b"@" {
        return Err(RefError::InvalidName("'@' alone is not a ref name".into()));
    }
    for component in name.split(|&b| b == b'/') {
        if component.starts_with(b".") || component.ends_with(b".") {
            return Err(RefError::InvalidName(format!(
                "'{}': component starts or ends with '.'",
                shown()
            )));
        }
        if component.ends_with(b".lock") {
            return Err(RefError::InvalidName(format!(
                "'{}': component ends with '.lock'",
                shown()
            )));
        }
    }

    // One-level names are reserved for the well-known pseudo refs.
    if !name.contains(&b'/') {
        let s = String::from_utf8_lossy(name);
        if !SPECIAL_REFS.contains(&s.as_ref()) {
            return Err(RefError::InvalidName(format!(
                "'{}': one-level names are reserved",
                shown()
            )));
        }
    }

    Ok(())
}
