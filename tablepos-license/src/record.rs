//! Persisted licensing records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tablepos_types::MachineId;

use crate::error::LicenseError;

/// Proof that a serial code was redeemed. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationRecord {
    pub machine_id: MachineId,
    pub activated_at: DateTime<Utc>,
}

/// Persisted trial status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    /// Clock is running toward `expires_at`.
    Active,
    /// Clock is stopped; time left is held in `paused_remaining_ms`.
    Paused,
    /// No time left. Only `reactivate`, `extend` or `set_expiry` leave it.
    Expired,
}

impl TrialStatus {
    /// Returns the lowercase wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrialStatus {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "expired" => Ok(Self::Expired),
            other => Err(LicenseError::Storage(format!("unknown trial status: {other}"))),
        }
    }
}

/// The single time-accounting record of an installation.
///
/// While `Active`, `paused_remaining_ms` is `None`. While `Paused`,
/// `expires_at` is the pause moment and `paused_remaining_ms` holds the
/// time that was left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRecord {
    pub machine_id: MachineId,
    pub status: TrialStatus,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub paused_remaining_ms: Option<i64>,
}

impl TrialRecord {
    /// Status as observed at `now`: an active trial past its expiry reads
    /// as expired even before anything rewrites the record.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> TrialStatus {
        match self.status {
            TrialStatus::Active if self.expires_at <= now => TrialStatus::Expired,
            status => status,
        }
    }

    /// Milliseconds of trial time left at `now`.
    #[must_use]
    pub fn remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        match self.status {
            TrialStatus::Active => (self.expires_at - now).num_milliseconds().max(0),
            TrialStatus::Paused => self.paused_remaining_ms.unwrap_or(0).max(0),
            TrialStatus::Expired => 0,
        }
    }
}

/// Client-facing snapshot of a trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialView {
    pub machine_id: MachineId,
    pub status: TrialStatus,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remaining_ms: i64,
    pub paused_remaining_ms: Option<i64>,
}

impl TrialView {
    /// Snapshots `record` as seen at `now`.
    #[must_use]
    pub fn at(record: &TrialRecord, now: DateTime<Utc>) -> Self {
        Self {
            machine_id: record.machine_id.clone(),
            status: record.effective_status(now),
            started_at: record.started_at,
            expires_at: record.expires_at,
            remaining_ms: record.remaining_ms(now),
            paused_remaining_ms: record.paused_remaining_ms,
        }
    }
}

/// A single-use password-reset code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetCode {
    pub machine_id: MachineId,
    pub code: String,
    pub used: bool,
    pub expires_at: DateTime<Utc>,
}

impl ResetCode {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
