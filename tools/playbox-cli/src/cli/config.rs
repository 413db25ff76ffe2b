use std::env;
use std::fmt::Display;
use std::str::FromStr;

use super::diag::build_diag;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8788";
pub const DEFAULT_MAX_SESSIONS: usize = 32;

/// Values given on the command line; anything left `None` falls back to
/// the environment and then to a default.
#[derive(Clone, Debug, Default)]
pub struct ServeFlags {
    pub listen: Option<String>,
    pub api_base: Option<String>,
    pub public_base: Option<String>,
    pub max_sessions: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServeConfig {
    pub listen: String,
    /// Catalog and play-counter backend. Only `serve` needs it.
    pub api_base: Option<String>,
    /// Origin prefixed to handle URLs. Empty keeps them root-relative.
    pub public_base: String,
    pub max_sessions: usize,
}

impl ServeConfig {
    pub fn from_flags(flags: ServeFlags) -> Result<Self, String> {
        Self::resolve(flags, |key| env::var(key).ok())
    }

    pub fn resolve<F>(flags: ServeFlags, lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen = pick(flags.listen, "PLAYBOX_LISTEN", &lookup)
            .unwrap_or_else(|| default_for("PLAYBOX_LISTEN", DEFAULT_LISTEN));
        let api_base = pick(flags.api_base, "PLAYBOX_API_BASE", &lookup)
            .map(|base| base.trim_end_matches('/').to_string());
        let public_base = pick(flags.public_base, "PLAYBOX_PUBLIC_BASE", &lookup)
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or_default();
        let max_sessions = match pick(
            flags.max_sessions.map(|n| n.to_string()),
            "PLAYBOX_MAX_SESSIONS",
            &lookup,
        ) {
            Some(raw) => parse_positive::<usize>("PLAYBOX_MAX_SESSIONS", &raw)?,
            None => DEFAULT_MAX_SESSIONS,
        };
        Ok(Self {
            listen,
            api_base,
            public_base,
            max_sessions,
        })
    }
}

fn pick<F>(flag: Option<String>, key: &str, lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = flag.filter(|v| !v.trim().is_empty()) {
        return Some(value.trim().to_string());
    }
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => {
            log::info!("{key} taken from environment: {}", value.trim());
            Some(value.trim().to_string())
        }
        _ => None,
    }
}

fn default_for(key: &str, default: &str) -> String {
    log::info!("{key} not set, using default: {default}");
    default.to_string()
}

fn parse_positive<T>(key: &str, raw: &str) -> Result<T, String>
where
    T: FromStr + PartialOrd + Default,
    T::Err: Display,
{
    let value: T = raw.trim().parse().map_err(|e: T::Err| {
        log::warn!("Invalid {key} value: {e}");
        build_diag("E_PLAYBOX_CONFIG", &format!("{}={}", key, raw), Some(e.to_string()), None)
    })?;
    if value <= T::default() {
        return Err(build_diag(
            "E_PLAYBOX_CONFIG",
            &format!("{}={}", key, raw),
            Some("must be at least 1".to_string()),
            None,
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = ServeConfig::resolve(ServeFlags::default(), env_of(&[])).expect("config");
        assert_eq!(config.listen, DEFAULT_LISTEN);
        assert_eq!(config.api_base, None);
        assert_eq!(config.public_base, "");
        assert_eq!(config.max_sessions, DEFAULT_MAX_SESSIONS);
    }

    #[test]
    fn flags_win_over_environment() {
        let flags = ServeFlags {
            listen: Some("0.0.0.0:9000".to_string()),
            max_sessions: Some(4),
            ..ServeFlags::default()
        };
        let env = env_of(&[
            ("PLAYBOX_LISTEN", "127.0.0.1:1"),
            ("PLAYBOX_API_BASE", "https://games.example/"),
            ("PLAYBOX_MAX_SESSIONS", "99"),
        ]);
        let config = ServeConfig::resolve(flags, env).expect("config");
        assert_eq!(config.listen, "0.0.0.0:9000");
        assert_eq!(config.api_base.as_deref(), Some("https://games.example"));
        assert_eq!(config.max_sessions, 4);
    }

    #[test]
    fn rejects_zero_or_garbage_session_cap() {
        let zero = ServeConfig::resolve(ServeFlags::default(), env_of(&[("PLAYBOX_MAX_SESSIONS", "0")]));
        assert!(zero.expect_err("zero").starts_with("E_PLAYBOX_CONFIG PLAYBOX_MAX_SESSIONS=0"));
        let junk = ServeConfig::resolve(ServeFlags::default(), env_of(&[("PLAYBOX_MAX_SESSIONS", "lots")]));
        assert!(junk.is_err());
    }

    #[test]
    fn blank_values_count_as_unset() {
        let flags = ServeFlags {
            public_base: Some("  ".to_string()),
            ..ServeFlags::default()
        };
        let config = ServeConfig::resolve(flags, env_of(&[("PLAYBOX_PUBLIC_BASE", "http://play.local/")]))
            .expect("config");
        assert_eq!(config.public_base, "http://play.local");
    }
}
