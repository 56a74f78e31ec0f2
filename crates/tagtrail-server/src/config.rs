//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development. Without `UPSTREAM_URL` the server
//! still serves its status API but never fetches.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./tagtrail.db`
    pub database_path: PathBuf,

    /// Socket address for the HTTP (axum) status server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Report network endpoint queried with `{"ids": [...]}`.
    /// Env: `UPSTREAM_URL`
    /// Default: unset (fetcher disabled).
    pub upstream_url: Option<String>,

    /// Maximum number of trackers sent in one upstream query.
    /// Env: `MAX_TRACKERS_PER_QUERY`
    /// Default: `64`
    pub max_trackers_per_query: usize,

    /// A tracker is due for a fetch once its last fetch is older than this.
    /// Env: `FETCH_STALE_AFTER_SECS`
    /// Default: 6 days.
    pub fetch_stale_after: Duration,

    /// Period of the fetch scheduler.
    /// Env: `FETCH_INTERVAL_SECS`
    /// Default: 1 hour.
    pub fetch_interval: Duration,

    /// Timeout applied to each upstream request.
    /// Env: `UPSTREAM_TIMEOUT_SECS`
    /// Default: 30 seconds.
    pub upstream_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./tagtrail.db"),
            http_addr: ([0, 0, 0, 0], 8080).into(),
            upstream_url: None,
            max_trackers_per_query: 64,
            fetch_stale_after: Duration::from_secs(6 * 24 * 60 * 60),
            fetch_interval: Duration::from_secs(60 * 60),
            upstream_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ServerConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(url) = lookup("UPSTREAM_URL") {
            let url = url.trim();
            if !url.is_empty() {
                config.upstream_url = Some(url.to_string());
            }
        }

        if let Some(val) = lookup("MAX_TRACKERS_PER_QUERY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_trackers_per_query = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_TRACKERS_PER_QUERY, using default"),
            }
        }

        if let Some(d) = parse_secs(&lookup, "FETCH_STALE_AFTER_SECS") {
            config.fetch_stale_after = d;
        }
        if let Some(d) = parse_secs(&lookup, "FETCH_INTERVAL_SECS") {
            config.fetch_interval = d;
        }
        if let Some(d) = parse_secs(&lookup, "UPSTREAM_TIMEOUT_SECS") {
            config.upstream_timeout = d;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

/// Positive number of seconds, or `None` (with a warning when set but invalid).
fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<Duration> {
    let val = lookup(name)?;
    match val.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            tracing::warn!(variable = name, value = %val, "Invalid duration, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.max_trackers_per_query, 64);
        assert_eq!(config.fetch_stale_after, Duration::from_secs(518_400));
        assert!(config.upstream_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DATABASE_PATH", "/var/lib/tagtrail/db.sqlite"),
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("UPSTREAM_URL", "http://anisette:6176/reports"),
            ("MAX_TRACKERS_PER_QUERY", "10"),
            ("FETCH_STALE_AFTER_SECS", "60"),
            ("FETCH_INTERVAL_SECS", "5"),
            ("UPSTREAM_TIMEOUT_SECS", "2"),
        ]);
        assert_eq!(config.database_path, PathBuf::from("/var/lib/tagtrail/db.sqlite"));
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.upstream_url.as_deref(), Some("http://anisette:6176/reports"));
        assert_eq!(config.max_trackers_per_query, 10);
        assert_eq!(config.fetch_stale_after, Duration::from_secs(60));
        assert_eq!(config.fetch_interval, Duration::from_secs(5));
        assert_eq!(config.upstream_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("UPSTREAM_URL", "   "),
            ("MAX_TRACKERS_PER_QUERY", "0"),
            ("FETCH_INTERVAL_SECS", "soon"),
        ]);
        let default = ServerConfig::default();
        assert_eq!(config.http_addr, default.http_addr);
        assert!(config.upstream_url.is_none());
        assert_eq!(config.max_trackers_per_query, 64);
        assert_eq!(config.fetch_interval, default.fetch_interval);
    }
}
