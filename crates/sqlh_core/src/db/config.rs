//! Connection parameters and helper options.
//!
//! # Invariants
//! - Every pooled connection runs with `journal_mode=WAL`, a 5000 ms busy
//!   timeout and `foreign_keys=ON`. Changing these breaks compatibility with
//!   databases created by earlier versions.

use crate::logging::LogSink;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const JOURNAL_MODE: &str = "WAL";
pub const BUSY_TIMEOUT_MS: u32 = 5000;
pub const FOREIGN_KEYS: bool = true;

pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Renders the connection target for `path` with the fixed parameter set.
pub fn connection_target(path: &Path) -> String {
    format!(
        "{}?_journal={JOURNAL_MODE}&_timeout={BUSY_TIMEOUT_MS}&_fk={FOREIGN_KEYS}",
        path.display()
    )
}

/// Options for [`Helper::new`](crate::db::Helper::new).
///
/// The logger is not part of the serialized form; it defaults to a discarding
/// sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelperOptions {
    pub path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(skip)]
    pub log: LogSink,
}

impl HelperOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool_size: DEFAULT_POOL_SIZE,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            log: LogSink::discard(),
        }
    }

    pub fn with_log(mut self, log: LogSink) -> Self {
        self.log = log;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::{connection_target, HelperOptions, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_POOL_SIZE};
    use std::path::Path;
    use std::time::Duration;

    #[test]
    fn target_carries_all_connection_parameters() {
        let target = connection_target(Path::new("app.db"));
        assert_eq!(target, "app.db?_journal=WAL&_timeout=5000&_fk=true");
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: HelperOptions =
            serde_json::from_str(r#"{ "path": "/var/lib/app/app.db" }"#).unwrap();
        assert_eq!(options.path, Path::new("/var/lib/app/app.db"));
        assert_eq!(options.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(options.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        assert!(!options.log.is_enabled());
    }

    #[test]
    fn connect_timeout_defaults_to_ten_seconds() {
        let options = HelperOptions::new("app.db");
        assert_eq!(options.connect_timeout(), Duration::from_secs(10));

        let options = options.with_connect_timeout(Duration::from_millis(250));
        assert_eq!(options.connect_timeout_ms, 250);
    }
}
