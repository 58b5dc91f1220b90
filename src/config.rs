//! Agent configuration, resolved once at startup from the environment.
//!
//! | Variable              | Default             |
//! |-----------------------|---------------------|
//! | `MC_USERNAME`         | required            |
//! | `MC_HOST`             | required            |
//! | `MC_PORT`             | `25565`             |
//! | `MC_VERSION`          | auto-detect         |
//! | `PORT`                | `3000`              |
//! | `VIEWER_ENABLED`      | `true`              |
//! | `VIEWER_FIRST_PERSON` | `false`             |
//! | `VIEWER_COMMAND`      | `prismarine-viewer` |
//! | `RECONNECT_DELAY_MS`  | `5000`              |
//! | `VIEWER_SETTLE_MS`    | `1500`              |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{LookoutError, Result};
use crate::transport::Credentials;
use crate::viewer::{ViewMode, ViewerOptions, DEFAULT_SETTLE_DELAY, VIEWER_BIND};

/// Default game port.
pub const DEFAULT_GAME_PORT: u16 = 25565;

/// Default HTTP listen port.
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Default pause between a session ending and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default sidecar executable.
pub const DEFAULT_VIEWER_COMMAND: &str = "prismarine-viewer";

/// Everything the binary needs to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub credentials: Credentials,
    pub http_port: u16,
    pub viewer_enabled: bool,
    pub viewer: ViewerOptions,
    pub viewer_command: String,
    pub reconnect_delay: Duration,
    pub settle_delay: Duration,
}

impl AgentConfig {
    /// Configuration with defaults for everything but the credentials.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            http_port: DEFAULT_HTTP_PORT,
            viewer_enabled: true,
            viewer: ViewerOptions::default(),
            viewer_command: DEFAULT_VIEWER_COMMAND.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Read the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`LookoutError::Config`] if a required variable is missing or
    /// a value does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| LookoutError::Config(format!("{key} must be set")))
        };

        let mut credentials = Credentials::new(
            require("MC_USERNAME")?,
            require("MC_HOST")?,
            parse_or(get("MC_PORT"), "MC_PORT", DEFAULT_GAME_PORT)?,
        );
        credentials.version = get("MC_VERSION");

        let view_mode = if parse_or(get("VIEWER_FIRST_PERSON"), "VIEWER_FIRST_PERSON", false)? {
            ViewMode::FirstPerson
        } else {
            ViewMode::ThirdPerson
        };

        Ok(Self {
            credentials,
            http_port: parse_or(get("PORT"), "PORT", DEFAULT_HTTP_PORT)?,
            viewer_enabled: parse_or(get("VIEWER_ENABLED"), "VIEWER_ENABLED", true)?,
            viewer: ViewerOptions {
                bind: VIEWER_BIND,
                view_mode,
            },
            viewer_command: get("VIEWER_COMMAND")
                .unwrap_or_else(|| DEFAULT_VIEWER_COMMAND.to_string()),
            reconnect_delay: millis_or(get("RECONNECT_DELAY_MS"), "RECONNECT_DELAY_MS", DEFAULT_RECONNECT_DELAY)?,
            settle_delay: millis_or(get("VIEWER_SETTLE_MS"), "VIEWER_SETTLE_MS", DEFAULT_SETTLE_DELAY)?,
        })
    }

    #[must_use]
    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    #[must_use]
    pub fn with_viewer_enabled(mut self, enabled: bool) -> Self {
        self.viewer_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Public HTTP listen address (all interfaces).
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.http_port))
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| LookoutError::Config(format!("{key} has invalid value {raw:?}"))),
    }
}

fn millis_or(raw: Option<String>, key: &str, default: Duration) -> Result<Duration> {
    match raw {
        None => Ok(default),
        Some(_) => parse_or::<u64>(raw, key, 0).map(Duration::from_millis),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_with_only_required_values() {
        let config =
            AgentConfig::from_lookup(lookup(&[("MC_USERNAME", "Scout"), ("MC_HOST", "mc.local")]))
                .unwrap();

        assert_eq!(config.credentials.username, "Scout");
        assert_eq!(config.credentials.port, 25565);
        assert_eq!(config.credentials.version, None);
        assert_eq!(config.http_port, 3000);
        assert!(config.viewer_enabled);
        assert_eq!(config.viewer.bind, VIEWER_BIND);
        assert_eq!(config.viewer.view_mode, ViewMode::ThirdPerson);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.settle_delay, Duration::from_millis(1500));
        assert_eq!(config, AgentConfig::new(config.credentials.clone()));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("MC_USERNAME", "Scout"),
            ("MC_HOST", "mc.local"),
            ("MC_PORT", "25570"),
            ("MC_VERSION", "1.20.4"),
            ("PORT", "8080"),
            ("VIEWER_ENABLED", "false"),
            ("VIEWER_FIRST_PERSON", "true"),
            ("RECONNECT_DELAY_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.credentials.port, 25570);
        assert_eq!(config.credentials.version.as_deref(), Some("1.20.4"));
        assert_eq!(config.http_addr().port(), 8080);
        assert!(!config.viewer_enabled);
        assert_eq!(config.viewer.view_mode, ViewMode::FirstPerson);
        assert_eq!(config.reconnect_delay, Duration::from_millis(250));
    }

    #[test]
    fn missing_username_is_an_error() {
        let err = AgentConfig::from_lookup(lookup(&[("MC_HOST", "mc.local")])).unwrap_err();
        assert!(matches!(err, LookoutError::Config(ref msg) if msg.contains("MC_USERNAME")));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("MC_USERNAME", "Scout"),
            ("MC_HOST", "mc.local"),
            ("MC_VERSION", ""),
        ]))
        .unwrap();
        assert_eq!(config.credentials.version, None);
    }

    #[test]
    fn malformed_port_is_an_error() {
        let err = AgentConfig::from_lookup(lookup(&[
            ("MC_USERNAME", "Scout"),
            ("MC_HOST", "mc.local"),
            ("MC_PORT", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, LookoutError::Config(_)));
    }
}
