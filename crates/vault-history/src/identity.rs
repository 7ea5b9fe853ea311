//! Author and committer identity resolution.
//!
//! Precedence per role: `GIT_AUTHOR_*` / `GIT_COMMITTER_*` environment
//! variables, then `user.name` / `user.email` from config. Dates default
//! to "now" when not pinned by the environment.

use vault_util::date::{GitDate, Signature};

use crate::{Config, HistoryError};

/// Which identity is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Author,
    Committer,
}

impl Role {
    fn env_prefix(&self) -> &'static str {
        match self {
            Role::Author => "GIT_AUTHOR",
            Role::Committer => "GIT_COMMITTER",
        }
    }
}

/// Resolve one identity, or fail when neither environment nor config
/// provides a name and email.
pub fn resolve(role: Role, config: &Config) -> Result<Signature, HistoryError> {
    let prefix = role.env_prefix();

    let name = std::env::var(format!("{prefix}_NAME"))
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| config.get("user", "name").map(str::to_owned))
        .ok_or(HistoryError::NoIdentity)?;
    let email = std::env::var(format!("{prefix}_EMAIL"))
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| config.get("user", "email").map(str::to_owned))
        .ok_or(HistoryError::NoIdentity)?;

    let date = match std::env::var(format!("{prefix}_DATE")) {
        Ok(raw) if !raw.is_empty() => GitDate::parse_raw(&raw)?,
        _ => GitDate::now(),
    };

    Signature::new(name, email, date).map_err(HistoryError::Util)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment-variable tests mutate process state; keep them together
    // and restore what they touch.
    struct EnvGuard(&'static str);

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            std::env::set_var(key, value);
            Self(key)
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            std::env::remove_var(self.0);
        }
    }

    #[test]
    fn config_identity_used_without_env() {
        let config =
            Config::parse("[user]\n\tname = Config Name\n\temail = cfg@example.com\n").unwrap();
        let sig = resolve(Role::Committer, &config).unwrap();
        assert_eq!(sig.name, "Config Name");
        assert_eq!(sig.email, "cfg@example.com");
    }

    #[test]
    fn env_overrides_config() {
        let _n = EnvGuard::set("GIT_AUTHOR_NAME", "Env Name");
        let _e = EnvGuard::set("GIT_AUTHOR_EMAIL", "env@example.com");
        let _d = EnvGuard::set("GIT_AUTHOR_DATE", "1234567890 +0100");

        let config =
            Config::parse("[user]\n\tname = Config Name\n\temail = cfg@example.com\n").unwrap();
        let sig = resolve(Role::Author, &config).unwrap();
        assert_eq!(sig.name, "Env Name");
        assert_eq!(sig.email, "env@example.com");
        assert_eq!(sig.date.timestamp, 1234567890);
        assert_eq!(sig.date.tz_offset, 60);
    }

    #[test]
    fn missing_identity_is_an_error() {
        let config = Config::default();
        assert!(matches!(
            resolve(Role::Author, &config),
            Err(HistoryError::NoIdentity)
        ));
    }
}
