use std::path::PathBuf;
use std::time::Duration;

/// Knobs for a single tenant's scheduling core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Longest a booking waits for its resource before failing with a
    /// retryable `ConcurrencyFailure`.
    pub lock_timeout: Duration,
    /// How many times the coordinator retries a `ConcurrencyFailure`.
    pub max_retries: u32,
    /// Base delay between retries; grows linearly with the attempt number.
    pub retry_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(2_000),
            max_retries: 3,
            retry_backoff: Duration::from_millis(10),
        }
    }
}

/// Server configuration, read from `BOOKD_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub metrics_port: Option<u16>,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable numbers fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let defaults = EngineConfig::default();

        Self {
            bind: lookup("BOOKD_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: lookup("BOOKD_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(5433),
            data_dir: PathBuf::from(lookup("BOOKD_DATA_DIR").unwrap_or_else(|| "./data".into())),
            password: lookup("BOOKD_PASSWORD").unwrap_or_else(|| "bookd".into()),
            max_connections: parsed("BOOKD_MAX_CONNECTIONS").map_or(256, |n| n as usize),
            compact_threshold: parsed("BOOKD_COMPACT_THRESHOLD").unwrap_or(1000),
            tls_cert: lookup("BOOKD_TLS_CERT"),
            tls_key: lookup("BOOKD_TLS_KEY"),
            metrics_port: lookup("BOOKD_METRICS_PORT").and_then(|s| s.parse().ok()),
            engine: EngineConfig {
                lock_timeout: parsed("BOOKD_LOCK_TIMEOUT_MS")
                    .map_or(defaults.lock_timeout, Duration::from_millis),
                max_retries: parsed("BOOKD_MAX_RETRIES")
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or(defaults.max_retries),
                retry_backoff: parsed("BOOKD_RETRY_BACKOFF_MS")
                    .map_or(defaults.retry_backoff, Duration::from_millis),
            },
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
