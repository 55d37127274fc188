//! Client configuration.

use quay_infra::{DEFAULT_BATCH_TTL, DEFAULT_MAX_ID_ATTEMPTS};

use crate::error::{ClientError, ClientResult};

pub const DEFAULT_SERVER: &str = "redis://localhost:6379";
pub const DEFAULT_PORT: u16 = 6379;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Redis URL (normalized, see [`normalize_server`]).
    pub server: String,
    /// Upper bound for batch-id and plan-id collision retries.
    pub max_id_attempts: u32,
    /// Expiry of an uncommitted batch, in seconds.
    pub default_batch_ttl: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            max_id_attempts: DEFAULT_MAX_ID_ATTEMPTS,
            default_batch_ttl: DEFAULT_BATCH_TTL,
        }
    }
}

impl ClientConfig {
    /// Read `QUAY_REDIS_URL` (or `REDIS_URL`), `QUAY_MAX_ID_ATTEMPTS` and
    /// `QUAY_BATCH_TTL`, falling back to defaults.
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`ClientConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ClientResult<Self> {
        let mut config = Self::default();

        if let Some(server) = lookup("QUAY_REDIS_URL").or_else(|| lookup("REDIS_URL")) {
            config = config.with_server(server);
        }
        if let Some(raw) = lookup("QUAY_MAX_ID_ATTEMPTS") {
            let attempts: u32 = parse_number("QUAY_MAX_ID_ATTEMPTS", &raw)?;
            config = config.with_max_id_attempts(attempts);
        }
        if let Some(raw) = lookup("QUAY_BATCH_TTL") {
            config = config.with_default_batch_ttl(parse_number("QUAY_BATCH_TTL", &raw)?);
        }

        Ok(config)
    }

    pub fn with_server(mut self, server: impl AsRef<str>) -> Self {
        self.server = normalize_server(server.as_ref());
        self
    }

    pub fn with_max_id_attempts(mut self, attempts: u32) -> Self {
        self.max_id_attempts = attempts.max(1);
        self
    }

    pub fn with_default_batch_ttl(mut self, ttl_seconds: u64) -> Self {
        self.default_batch_ttl = ttl_seconds.max(1);
        self
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> ClientResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| ClientError::Config(format!("{name} must be a positive integer, got `{raw}`")))
}

/// Turn a `host[:port]` or URL server address into a Redis URL.
///
/// `host:port` and bare `host` become `redis://` URLs (default port 6379);
/// anything with a scheme is kept as is. IPv6 hosts take a port only in
/// brackets (`[::1]:6380`); an unbracketed literal is all host.
pub fn normalize_server(address: &str) -> String {
    let address = address.trim();
    if address.is_empty() {
        return DEFAULT_SERVER.to_string();
    }
    if address.contains("://") {
        return address.to_string();
    }
    if !address.starts_with('[') && address.matches(':').count() > 1 {
        return format!("redis://[{address}]:{DEFAULT_PORT}");
    }

    let has_port = address.rsplit_once(':').is_some_and(|(host, port)| {
        !host.is_empty()
            && port.parse::<u16>().is_ok()
            && (!host.starts_with('[') || host.ends_with(']'))
    });
    if has_port {
        format!("redis://{address}")
    } else {
        format!("redis://{address}:{DEFAULT_PORT}")
    }
}
