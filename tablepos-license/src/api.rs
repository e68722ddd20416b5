//! JSON bodies exchanged between the authority and its clients.

use crate::record::TrialView;
use serde::{Deserialize, Serialize};
use tablepos_types::MachineId;

/// Activation and trial state of one installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseStatusResponse {
    pub machine_id: MachineId,
    /// True once a serial code has been redeemed.
    pub activated: bool,
    /// Absent until a trial has been started.
    pub trial: Option<TrialView>,
}

/// Error payload for every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTrialRequest {
    pub machine_id: MachineId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateRequest {
    pub machine_id: MachineId,
    pub serial: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueResetCodeRequest {
    pub machine_id: MachineId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResetCodeRequest {
    pub machine_id: MachineId,
    pub code: String,
}

/// Deterministic codes for a machine, for support staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportCodes {
    pub machine_id: MachineId,
    pub serial_code: String,
    pub unlock_code: String,
}
