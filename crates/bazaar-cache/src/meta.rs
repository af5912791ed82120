use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sidecar metadata stored next to every cached index and archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub cached_at: DateTime<Utc>,

    /// Hex SHA-256 of the cached bytes.
    pub checksum: String,

    /// URL the bytes were fetched from.
    #[serde(default)]
    pub source: String,
}

impl CacheMeta {
    pub fn new(checksum: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            cached_at: Utc::now(),
            checksum: checksum.into(),
            source: source.into(),
        }
    }

    /// Time elapsed since the entry was written. Entries stamped in the future are age zero.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.cached_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }
}
