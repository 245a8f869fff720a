use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Process settings, read from `SLOTBOOK_*` environment variables.
/// Unparseable numbers fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    /// WAL appends between compactions.
    pub compact_threshold: u64,
    /// Per-request deadline on the wire. Waiting for a booking lock counts against it.
    pub request_timeout: Duration,
    pub metrics_port: Option<u16>,
    /// Load the default service catalog on startup.
    pub seed: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 7070,
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            request_timeout: Duration::from_millis(5000),
            metrics_port: None,
            seed: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind: lookup("SLOTBOOK_BIND").unwrap_or(defaults.bind),
            port: parsed(&lookup, "SLOTBOOK_PORT").unwrap_or(defaults.port),
            data_dir: lookup("SLOTBOOK_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            max_connections: parsed(&lookup, "SLOTBOOK_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            compact_threshold: parsed(&lookup, "SLOTBOOK_COMPACT_THRESHOLD").unwrap_or(defaults.compact_threshold),
            request_timeout: parsed(&lookup, "SLOTBOOK_REQUEST_TIMEOUT_MS")
                .map_or(defaults.request_timeout, Duration::from_millis),
            metrics_port: parsed(&lookup, "SLOTBOOK_METRICS_PORT"),
            seed: lookup("SLOTBOOK_SEED").is_some_and(|v| matches!(v.trim(), "1" | "true" | "yes")),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("slotbook.wal")
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}
