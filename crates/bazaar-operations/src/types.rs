use bazaar_registry::PackageId;
use chrono::{DateTime, Utc};

// ---- Update ----

/// A newer version available for an installed package.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateInfo {
    pub id: PackageId,
    pub current_version: String,
    pub new_version: String,
    pub changelog: Option<String>,
    pub released_at: DateTime<Utc>,
    /// Whether the new version supports the running tool version.
    pub compatible: bool,
}

/// Info about a package that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedInfo {
    pub id: String,
    pub error: String,
}

/// Outcome of a batch update.
#[derive(Debug, Default)]
pub struct UpdateReport {
    pub updated: Vec<UpdateInfo>,
    /// Ids that were already current or skipped because auto-update is off.
    pub unchanged: Vec<String>,
    pub failed: Vec<FailedInfo>,
}

impl UpdateReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}
