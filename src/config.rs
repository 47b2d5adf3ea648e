//! Subscriber configuration.
//!
//! This module provides `SubscriberConfig` plus the `HostAndPort` tuple used
//! for the server list. Construct manually with the builder methods or load
//! from environment variables with `from_env`.

use crate::error::SubscriberError;

/// A single `host:port` Redis server address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAndPort {
    pub host: String,
    pub port: u16,
}

impl HostAndPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `host:port` string.
    pub fn parse(s: &str) -> Result<Self, SubscriberError> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| {
            SubscriberError::Config(format!("invalid server address '{}', expected host:port", s))
        })?;

        if host.is_empty() {
            return Err(SubscriberError::Config(format!(
                "invalid server address '{}', empty host",
                s
            )));
        }

        let port = port.parse().map_err(|_| {
            SubscriberError::Config(format!("invalid port in server address '{}'", s))
        })?;

        Ok(Self::new(host, port))
    }

    /// Render as a `redis://` connection URL.
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for HostAndPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Configuration for the subscriber runtime.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Redis servers. Only the first entry is used for connections today;
    /// the rest are carried for forward compatibility.
    pub servers: Vec<HostAndPort>,

    /// TTL applied to written assignment documents, in milliseconds.
    pub assignment_ttl_ms: u64,

    /// Poll period of the assignment listener, in milliseconds.
    pub assignment_listener_interval_ms: u64,

    /// How long a channel processor sleeps between group-create retries
    /// while the stream key does not exist yet, in milliseconds.
    pub sleep_when_stream_missing_ms: u64,

    /// `XREADGROUP BLOCK` timeout, in milliseconds. Also the upper bound on
    /// `stop()` latency while a processor is blocked in a read.
    pub block_stream_time_ms: u64,

    /// When `true`, the assignment listener reports an expired/deleted
    /// assignment key to the callback as the empty assignment, so a
    /// coordinator tears its processors down. When `false` (the default)
    /// the last-known processors keep running through coordinator downtime.
    pub treat_missing_as_empty: bool,
}

impl SubscriberConfig {
    pub fn new(servers: Vec<HostAndPort>) -> Self {
        Self {
            servers,
            ..Self::default()
        }
    }

    /// Set the assignment TTL.
    pub fn with_assignment_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.assignment_ttl_ms = ttl_ms;
        self
    }

    /// Set the assignment listener poll interval.
    pub fn with_listener_interval_ms(mut self, interval_ms: u64) -> Self {
        self.assignment_listener_interval_ms = interval_ms;
        self
    }

    /// Set the group-create retry sleep used while a stream is absent.
    pub fn with_sleep_when_stream_missing_ms(mut self, sleep_ms: u64) -> Self {
        self.sleep_when_stream_missing_ms = sleep_ms;
        self
    }

    /// Set the blocking read timeout.
    pub fn with_block_stream_time_ms(mut self, block_ms: u64) -> Self {
        self.block_stream_time_ms = block_ms;
        self
    }

    /// Report an expired assignment key as the empty assignment.
    pub fn with_treat_missing_as_empty(mut self, enabled: bool) -> Self {
        self.treat_missing_as_empty = enabled;
        self
    }

    /// Connection URL for the first configured server.
    pub fn url(&self) -> Result<String, SubscriberError> {
        self.servers
            .first()
            .map(HostAndPort::url)
            .ok_or_else(|| SubscriberError::Config("no Redis servers configured".to_string()))
    }

    /// Load configuration from environment variables.
    ///
    /// - `REDIS_MESSAGING_SERVERS` - comma-separated `host:port` list
    /// - `REDIS_MESSAGING_ASSIGNMENT_TTL_MS`
    /// - `REDIS_MESSAGING_LISTENER_INTERVAL_MS`
    /// - `REDIS_MESSAGING_SLEEP_WHEN_STREAM_MISSING_MS`
    /// - `REDIS_MESSAGING_BLOCK_STREAM_TIME_MS`
    /// - `REDIS_MESSAGING_TREAT_MISSING_AS_EMPTY` - `true`/`false`
    ///
    /// Unset variables fall back to the defaults; present-but-invalid values
    /// are configuration errors.
    pub fn from_env() -> Result<Self, SubscriberError> {
        let mut config = Self::default();

        if let Ok(servers) = std::env::var("REDIS_MESSAGING_SERVERS") {
            config.servers = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(HostAndPort::parse)
                .collect::<Result<Vec<_>, _>>()?;
            if config.servers.is_empty() {
                return Err(SubscriberError::Config(
                    "REDIS_MESSAGING_SERVERS is set but empty".to_string(),
                ));
            }
        }

        config.assignment_ttl_ms =
            env_u64("REDIS_MESSAGING_ASSIGNMENT_TTL_MS", config.assignment_ttl_ms)?;
        config.assignment_listener_interval_ms = env_u64(
            "REDIS_MESSAGING_LISTENER_INTERVAL_MS",
            config.assignment_listener_interval_ms,
        )?;
        config.sleep_when_stream_missing_ms = env_u64(
            "REDIS_MESSAGING_SLEEP_WHEN_STREAM_MISSING_MS",
            config.sleep_when_stream_missing_ms,
        )?;
        config.block_stream_time_ms = env_u64(
            "REDIS_MESSAGING_BLOCK_STREAM_TIME_MS",
            config.block_stream_time_ms,
        )?;

        if let Ok(flag) = std::env::var("REDIS_MESSAGING_TREAT_MISSING_AS_EMPTY") {
            config.treat_missing_as_empty = flag.parse().map_err(|_| {
                SubscriberError::Config(format!(
                    "invalid REDIS_MESSAGING_TREAT_MISSING_AS_EMPTY value '{}'",
                    flag
                ))
            })?;
        }

        Ok(config)
    }
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            servers: vec![HostAndPort::new("127.0.0.1", 6379)],
            assignment_ttl_ms: 36_000,
            assignment_listener_interval_ms: 10_000,
            sleep_when_stream_missing_ms: 100,
            block_stream_time_ms: 100,
            treat_missing_as_empty: false,
        }
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64, SubscriberError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| SubscriberError::Config(format!("invalid {} value '{}'", name, value))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_and_port_parse() {
        let hp = HostAndPort::parse("redis.internal:6380").unwrap();
        assert_eq!(hp.host, "redis.internal");
        assert_eq!(hp.port, 6380);
        assert_eq!(hp.url(), "redis://redis.internal:6380");
        assert_eq!(hp.to_string(), "redis.internal:6380");
    }

    #[test]
    fn test_host_and_port_parse_invalid() {
        assert!(HostAndPort::parse("no-port").is_err());
        assert!(HostAndPort::parse(":6379").is_err());
        assert!(HostAndPort::parse("host:notaport").is_err());
    }

    #[test]
    fn test_builder_pattern() {
        let config = SubscriberConfig::new(vec![HostAndPort::new("localhost", 6379)])
            .with_assignment_ttl_ms(5_000)
            .with_listener_interval_ms(250)
            .with_sleep_when_stream_missing_ms(50)
            .with_block_stream_time_ms(1_000)
            .with_treat_missing_as_empty(true);

        assert_eq!(config.assignment_ttl_ms, 5_000);
        assert_eq!(config.assignment_listener_interval_ms, 250);
        assert_eq!(config.sleep_when_stream_missing_ms, 50);
        assert_eq!(config.block_stream_time_ms, 1_000);
        assert!(config.treat_missing_as_empty);
    }

    #[test]
    fn test_url_uses_first_server() {
        let config = SubscriberConfig::new(vec![
            HostAndPort::new("primary", 6379),
            HostAndPort::new("secondary", 6380),
        ]);
        assert_eq!(config.url().unwrap(), "redis://primary:6379");
    }

    #[test]
    fn test_url_requires_a_server() {
        let config = SubscriberConfig::new(vec![]);
        assert!(config.url().is_err());
    }

    #[test]
    fn test_from_env_defaults() {
        temp_env::with_vars(
            [
                ("REDIS_MESSAGING_SERVERS", None::<&str>),
                ("REDIS_MESSAGING_ASSIGNMENT_TTL_MS", None),
                ("REDIS_MESSAGING_LISTENER_INTERVAL_MS", None),
            ],
            || {
                let config = SubscriberConfig::from_env().unwrap();
                assert_eq!(config.servers, vec![HostAndPort::new("127.0.0.1", 6379)]);
                assert_eq!(config.assignment_ttl_ms, 36_000);
                assert!(!config.treat_missing_as_empty);
            },
        );
    }

    #[test]
    fn test_from_env_overrides() {
        temp_env::with_vars(
            [
                (
                    "REDIS_MESSAGING_SERVERS",
                    Some("redis-a:6379, redis-b:6380"),
                ),
                ("REDIS_MESSAGING_BLOCK_STREAM_TIME_MS", Some("2500")),
                ("REDIS_MESSAGING_TREAT_MISSING_AS_EMPTY", Some("true")),
            ],
            || {
                let config = SubscriberConfig::from_env().unwrap();
                assert_eq!(
                    config.servers,
                    vec![
                        HostAndPort::new("redis-a", 6379),
                        HostAndPort::new("redis-b", 6380),
                    ]
                );
                assert_eq!(config.block_stream_time_ms, 2500);
                assert!(config.treat_missing_as_empty);
            },
        );
    }

    #[test]
    fn test_from_env_invalid_number() {
        temp_env::with_var("REDIS_MESSAGING_ASSIGNMENT_TTL_MS", Some("soon"), || {
            let err = SubscriberConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("REDIS_MESSAGING_ASSIGNMENT_TTL_MS"));
        });
    }
}
