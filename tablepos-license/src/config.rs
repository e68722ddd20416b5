//! Secrets and policy constants, injected once at process start.

use crate::error::{LicenseError, LicenseResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Validity window of a one-time reset code, in hours.
pub const RESET_CODE_TTL_HOURS: i64 = 24;

/// A long-lived HMAC key for one code family.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CodeSecret {
    bytes: Vec<u8>,
}

impl CodeSecret {
    /// Wraps raw secret bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Returns the key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns true if the secret has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for CodeSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeSecret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Trial and connectivity policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicensePolicy {
    /// Length of a freshly started trial.
    pub trial_period_days: u32,
    /// Length granted by `reactivate`.
    pub reactivation_period_days: u32,
    /// How long the client may stay unlocked without reaching the authority.
    pub offline_grace_secs: u64,
    /// Interval between status polls on the client.
    pub poll_interval_secs: u64,
    /// Per-request timeout on the client.
    pub request_timeout_secs: u64,
}

impl Default for LicensePolicy {
    fn default() -> Self {
        Self {
            trial_period_days: 7,
            reactivation_period_days: 7,
            offline_grace_secs: 5 * 60,
            poll_interval_secs: 3 * 60,
            request_timeout_secs: 10,
        }
    }
}

impl LicensePolicy {
    /// Loads a policy from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> LicenseResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LicenseError::Storage(format!("failed to read policy {}: {e}", path.display()))
        })?;
        let policy: Self = serde_json::from_str(&content)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Rejects zero-length periods.
    pub fn validate(&self) -> LicenseResult<()> {
        let checks = [
            ("trial_period_days", u64::from(self.trial_period_days)),
            ("reactivation_period_days", u64::from(self.reactivation_period_days)),
            ("offline_grace_secs", self.offline_grace_secs),
            ("poll_interval_secs", self.poll_interval_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(LicenseError::InvalidArgument(format!(
                    "{name} must be at least 1"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn trial_period(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.trial_period_days))
    }

    #[must_use]
    pub fn reactivation_period(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.reactivation_period_days))
    }

    #[must_use]
    pub fn offline_grace(&self) -> Duration {
        Duration::from_secs(self.offline_grace_secs)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Everything the authority needs: both secrets plus policy.
#[derive(Debug, Clone)]
pub struct LicenseConfig {
    serial_secret: CodeSecret,
    unlock_secret: CodeSecret,
    policy: LicensePolicy,
}

impl LicenseConfig {
    /// Builds a config, rejecting empty or shared secrets.
    ///
    /// The serial and unlock families must use different keys so that one
    /// leaking does not compromise the other.
    pub fn new(
        serial_secret: CodeSecret,
        unlock_secret: CodeSecret,
        policy: LicensePolicy,
    ) -> LicenseResult<Self> {
        if serial_secret.is_empty() || unlock_secret.is_empty() {
            return Err(LicenseError::InvalidArgument(
                "code secrets must not be empty".to_string(),
            ));
        }
        if serial_secret.as_bytes() == unlock_secret.as_bytes() {
            return Err(LicenseError::InvalidArgument(
                "serial and unlock secrets must differ".to_string(),
            ));
        }
        policy.validate()?;
        Ok(Self {
            serial_secret,
            unlock_secret,
            policy,
        })
    }

    #[must_use]
    pub fn serial_secret(&self) -> &CodeSecret {
        &self.serial_secret
    }

    #[must_use]
    pub fn unlock_secret(&self) -> &CodeSecret {
        &self.unlock_secret
    }

    #[must_use]
    pub fn policy(&self) -> &LicensePolicy {
        &self.policy
    }
}
