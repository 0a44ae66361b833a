//! Server configuration
//!
//! Values come from positional arguments (`lobby_chat [ADDR] [USERS_FILE]`),
//! then `CHAT_*` environment variables, then defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8189";

/// Default user file
pub const DEFAULT_USERS_FILE: &str = "users.json";

/// Time a connection has to log in
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Listen address
    pub addr: String,
    /// JSON file with `{login, password, nick}` records
    pub users_file: PathBuf,
    /// Authentication window
    pub auth_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            users_file: PathBuf::from(DEFAULT_USERS_FILE),
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }
}

impl Config {
    /// Build from the process arguments and environment
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_sources(env::args().skip(1), |key| env::var(key).ok())
    }

    /// Build from explicit arguments and a variable lookup
    pub fn from_sources<I, F>(args: I, var: F) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let mut args = args.into_iter();
        let defaults = Self::default();

        let addr = args
            .next()
            .or_else(|| var("CHAT_ADDR"))
            .unwrap_or(defaults.addr);

        let users_file = args
            .next()
            .or_else(|| var("CHAT_USERS_FILE"))
            .map(PathBuf::from)
            .unwrap_or(defaults.users_file);

        let auth_timeout = match var("CHAT_AUTH_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    AppError::Config(format!("CHAT_AUTH_TIMEOUT_SECS must be a positive integer, got {raw:?}"))
                })?,
            None => defaults.auth_timeout,
        };

        Ok(Self {
            addr,
            users_file,
            auth_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn build(args: &[&str], vars: &[(&str, &str)]) -> Result<Config, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_sources(args.iter().map(|a| a.to_string()), |key| {
            vars.get(key).cloned()
        })
    }

    #[test]
    fn test_defaults() {
        let config = build(&[], &[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.auth_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_args_override_env() {
        let config = build(
            &["0.0.0.0:9000"],
            &[("CHAT_ADDR", "10.0.0.1:1"), ("CHAT_USERS_FILE", "/etc/chat/users.json")],
        )
        .unwrap();
        assert_eq!(config.addr, "0.0.0.0:9000");
        assert_eq!(config.users_file, PathBuf::from("/etc/chat/users.json"));
    }

    #[test]
    fn test_auth_timeout_from_env() {
        let config = build(&[], &[("CHAT_AUTH_TIMEOUT_SECS", "30")]).unwrap();
        assert_eq!(config.auth_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_auth_timeout() {
        assert!(matches!(
            build(&[], &[("CHAT_AUTH_TIMEOUT_SECS", "soon")]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            build(&[], &[("CHAT_AUTH_TIMEOUT_SECS", "0")]),
            Err(AppError::Config(_))
        ));
    }
}
