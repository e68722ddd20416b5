//! Last known license status, kept on disk between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tablepos_license::{LicenseError, LicenseResult, LicenseStatusResponse};
use tablepos_types::MachineId;

const CACHE_FILE: &str = "license-status.json";

/// A status response and when it was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedStatus {
    pub status: LicenseStatusResponse,
    pub fetched_at: DateTime<Utc>,
}

/// JSON file holding the most recent [`CachedStatus`].
#[derive(Debug, Clone)]
pub struct StatusCache {
    path: PathBuf,
}

impl StatusCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache file in the user's data directory.
    pub fn default_location() -> Option<Self> {
        dirs::data_dir().map(|d| Self::new(d.join("tablepos").join(CACHE_FILE)))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cached status for `machine_id`.
    ///
    /// Returns `None` when nothing is cached or the cache belongs to a
    /// different machine.
    pub async fn load(&self, machine_id: &MachineId) -> LicenseResult<Option<CachedStatus>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LicenseError::Storage(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        let cached: CachedStatus = serde_json::from_str(&content)?;
        if &cached.status.machine_id != machine_id {
            return Ok(None);
        }
        Ok(Some(cached))
    }

    /// Replaces the cached status. Writes to a temporary file first so a
    /// crash never leaves a half-written cache.
    pub async fn store(&self, cached: &CachedStatus) -> LicenseResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                LicenseError::Storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_vec_pretty(cached)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| LicenseError::Storage(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            LicenseError::Storage(format!("failed to replace {}: {e}", self.path.display()))
        })?;
        Ok(())
    }
}
