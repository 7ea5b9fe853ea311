//! Minimal repository configuration.
//!
//! An ini-style parser covering what the engine actually reads:
//! `core.repositoryformatversion`, `core.bare`, and `user.*`. Unknown
//! sections and keys parse fine and are queryable; nothing is written
//! back.

use std::collections::HashMap;
use std::path::Path;

use crate::HistoryError;

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// `(lowercased section, lowercased key)` -> last value seen.
    values: HashMap<(String, String), String>,
}

impl Config {
    /// Load from a file; an absent file yields an empty config.
    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(HistoryError::Io(e)),
        };
        Self::parse(&text)
    }

    /// Parse ini-style text.
    pub fn parse(text: &str) -> Result<Self, HistoryError> {
        let mut values = HashMap::new();
        let mut section = String::new();

        for (line_no, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(inner) = line.strip_prefix('[') {
                let inner = inner.strip_suffix(']').ok_or_else(|| {
                    HistoryError::Config(format!("line {}: unterminated section", line_no + 1))
                })?;
                // Subsections (`[branch "main"]`) join with a dot.
                section = match inner.split_once(' ') {
                    Some((name, sub)) => {
                        let sub = sub.trim().trim_matches('"');
                        format!("{}.{}", name.to_ascii_lowercase(), sub)
                    }
                    None => inner.to_ascii_lowercase(),
                };
                continue;
            }

            let (key, value) = match line.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                // A bare key means boolean true.
                None => (line, "true"),
            };
            if section.is_empty() {
                return Err(HistoryError::Config(format!(
                    "line {}: key outside any section",
                    line_no + 1
                )));
            }
            values.insert(
                (section.clone(), key.to_ascii_lowercase()),
                value.to_string(),
            );
        }

        Ok(Self { values })
    }

    /// Raw string value.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.values
            .get(&(section.to_ascii_lowercase(), key.to_ascii_lowercase()))
            .map(String::as_str)
    }

    /// Boolean value with git's spellings.
    pub fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        match self.get(section, key)?.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" | "" => Some(false),
            _ => None,
        }
    }

    pub fn get_int(&self, section: &str, key: &str) -> Option<i64> {
        self.get(section, key)?.parse().ok()
    }

    /// `core.bare`, defaulting to false.
    pub fn is_bare(&self) -> bool {
        self.get_bool("core", "bare").unwrap_or(false)
    }

    /// `core.repositoryformatversion`, defaulting to 0.
    pub fn repository_format_version(&self) -> i64 {
        self.get_int("core", "repositoryformatversion").unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_core_section() {
        let config = Config::parse(
            "[core]\n\trepositoryformatversion = 0\n\tbare = false\n\tfilemode = true\n",
        )
        .unwrap();
        assert_eq!(config.repository_format_version(), 0);
        assert!(!config.is_bare());
        assert_eq!(config.get_bool("core", "filemode"), Some(true));
    }

    #[test]
    fn user_identity_keys() {
        let config =
            Config::parse("[user]\n\tname = Ada Lovelace\n\temail = ada@example.com\n").unwrap();
        assert_eq!(config.get("user", "name"), Some("Ada Lovelace"));
        assert_eq!(config.get("user", "email"), Some("ada@example.com"));
    }

    #[test]
    fn sections_and_keys_are_case_insensitive() {
        let config = Config::parse("[Core]\n\tBare = TRUE\n").unwrap();
        assert!(config.is_bare());
    }

    #[test]
    fn subsections_join_with_dot() {
        let config = Config::parse("[branch \"main\"]\n\tremote = origin\n").unwrap();
        assert_eq!(config.get("branch.main", "remote"), Some("origin"));
    }

    #[test]
    fn bare_key_is_true() {
        let config = Config::parse("[core]\n\tbare\n").unwrap();
        assert_eq!(config.get_bool("core", "bare"), Some(true));
    }

    #[test]
    fn comments_and_blanks_skipped() {
        let config = Config::parse("# leading\n\n[core]\n; note\n\tbare = false\n").unwrap();
        assert_eq!(config.get_bool("core", "bare"), Some(false));
    }

    #[test]
    fn key_outside_section_is_an_error() {
        assert!(Config::parse("bare = true\n").is_err());
    }

    #[test]
    fn unterminated_section_is_an_error() {
        assert!(Config::parse("[core\nbare = true\n").is_err());
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope")).unwrap();
        assert!(config.get("core", "bare").is_none());
    }
}
