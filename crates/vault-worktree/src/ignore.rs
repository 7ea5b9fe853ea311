//! Ignore handling: the root `.gitignore`, literal and simple glob
//! patterns. Nested ignore files and negations are not supported here.

use std::path::Path;

/// Parsed ignore patterns from the worktree root.
#[derive(Debug, Default)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
}

#[derive(Debug)]
struct Pattern {
    text: String,
    dir_only: bool,
    anchored: bool,
}

impl IgnoreRules {
    /// Load `.gitignore` from `root`; missing file means no rules.
    pub fn load(root: &Path) -> Self {
        match std::fs::read_to_string(root.join(".gitignore")) {
            Ok(text) => Self::parse(&text),
            Err(_) => Self::default(),
        }
    }

    pub fn parse(text: &str) -> Self {
        let mut patterns = Vec::new();
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (line, dir_only) = match line.strip_suffix('/') {
                Some(rest) => (rest, true),
                None => (line, false),
            };
            let (line, anchored) = match line.strip_prefix('/') {
                Some(rest) => (rest, true),
                None => (line, line.contains('/')),
            };
            patterns.push(Pattern {
                text: line.to_string(),
                dir_only,
                anchored,
            });
        }
        Self { patterns }
    }

    /// Whether `rel_path` (slash-separated) is ignored.
    pub fn matches(&self, rel_path: &str, is_dir: bool) -> bool {
        self.patterns.iter().any(|p| p.matches(rel_path, is_dir))
    }
}

impl Pattern {
    fn matches(&self, rel_path: &str, is_dir: bool) -> bool {
        if self.anchored {
            if self.dir_only {
                // The directory itself, or anything inside it.
                rel_path == self.text
                    || rel_path.starts_with(&format!("{}/", self.text))
            } else {
                (rel_path == self.text && (!self.dir_only || is_dir))
                    || rel_path.starts_with(&format!("{}/", self.text))
            }
        } else {
            // Unanchored: match any path component.
            rel_path.split('/').enumerate().any(|(i, component)| {
                if !glob_component(&self.text, component) {
                    return false;
                }
                let is_last = i == rel_path.matches('/').count();
                // A dir-only pattern matched mid-path is inside the dir.
                !self.dir_only || !is_last || is_dir
            })
        }
    }
}

/// Single-component glob: `*` matches any run of non-slash characters.
fn glob_component(pattern: &str, component: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == component,
        Some((prefix, suffix)) if !suffix.contains('*') => {
            component.len() >= prefix.len() + suffix.len()
                && component.starts_with(prefix)
                && component.ends_with(suffix)
        }
        // Multiple stars: fall back to a coarse contains check.
        Some(_) => {
            let parts: Vec<&str> = pattern.split('*').collect();
            let mut rest = component;
            for (i, part) in parts.iter().enumerate() {
                if part.is_empty() {
                    continue;
                }
                match rest.find(part) {
                    Some(pos) if i > 0 || pos == 0 => rest = &rest[pos + part.len()..],
                    _ => return false,
                }
            }
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_name_matches_any_component() {
        let rules = IgnoreRules::parse("target\n");
        assert!(rules.matches("target", true));
        assert!(rules.matches("target/debug/app", false));
        assert!(rules.matches("crates/sub/target", true));
        assert!(!rules.matches("targets", true));
    }

    #[test]
    fn dir_only_pattern() {
        let rules = IgnoreRules::parse("build/\n");
        assert!(rules.matches("build", true));
        assert!(!rules.matches("build", false));
        assert!(rules.matches("build/out.o", false));
    }

    #[test]
    fn anchored_pattern() {
        let rules = IgnoreRules::parse("/node_modules\n");
        assert!(rules.matches("node_modules", true));
        assert!(rules.matches("node_modules/pkg", false));
        assert!(!rules.matches("sub/node_modules", true));
    }

    #[test]
    fn star_glob() {
        let rules = IgnoreRules::parse("*.log\n");
        assert!(rules.matches("debug.log", false));
        assert!(rules.matches("logs/app.log", false));
        assert!(!rules.matches("log.txt", false));
    }

    #[test]
    fn comments_and_blanks_skipped() {
        let rules = IgnoreRules::parse("# comment\n\n*.tmp\n");
        assert!(rules.matches("x.tmp", false));
        assert!(!rules.matches("# comment", false));
    }

    #[test]
    fn missing_file_means_no_rules() {
        let dir = tempfile::tempdir().unwrap();
        let rules = IgnoreRules::load(dir.path());
        assert!(!rules.matches("anything", false));
    }
}
