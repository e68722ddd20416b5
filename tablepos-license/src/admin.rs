//! Operator-facing trial mutation boundary.
//!
//! Accepts the loosely typed request body, validates it into a
//! [`TrialAction`], and runs it through the [`TrialEngine`]. Failures are
//! returned as-is for the operator to read; nothing is retried.

use crate::error::{LicenseError, LicenseResult};
use crate::record::TrialView;
use crate::trial::{parse_expiry, TrialAction, TrialEngine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tablepos_types::{Clock, MachineId};
use tracing::warn;

/// Raw admin mutation body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRequest {
    pub machine_id: Option<String>,
    pub action: Option<String>,
    pub days: Option<f64>,
    pub expires_at: Option<String>,
}

/// Successful mutation: the action taken and the resulting trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminResponse {
    pub ok: bool,
    pub action: String,
    pub trial: TrialView,
}

fn whole_days(days: Option<f64>) -> LicenseResult<i64> {
    let days = days.ok_or_else(|| LicenseError::InvalidArgument("days is required".to_string()))?;
    if !days.is_finite() || days.fract() != 0.0 || days < 1.0 {
        return Err(LicenseError::InvalidArgument(format!(
            "days must be a whole number of at least 1, got {days}"
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    Ok(days as i64)
}

impl AdminRequest {
    /// Validates the body into a machine id and a concrete action.
    pub fn parse(&self) -> LicenseResult<(MachineId, TrialAction)> {
        let machine_id = self
            .machine_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| LicenseError::InvalidArgument("machineId is required".to_string()))?;
        let machine_id = MachineId::parse(machine_id)?;

        let action = self
            .action
            .as_deref()
            .ok_or_else(|| LicenseError::InvalidArgument("action is required".to_string()))?;

        let action = match action {
            "extend" => TrialAction::Extend {
                days: whole_days(self.days)?,
            },
            "reduce" => TrialAction::Reduce {
                days: whole_days(self.days)?,
            },
            "pause" => TrialAction::Pause,
            "resume" => TrialAction::Resume,
            "terminate" => TrialAction::Terminate,
            "reactivate" => TrialAction::Reactivate,
            "setExpiry" => {
                let raw = self.expires_at.as_deref().ok_or_else(|| {
                    LicenseError::InvalidArgument("expiresAt is required".to_string())
                })?;
                TrialAction::SetExpiry {
                    expires_at: parse_expiry(raw)?,
                }
            }
            other => {
                return Err(LicenseError::InvalidArgument(format!(
                    "unknown action: {other}"
                )));
            }
        };
        Ok((machine_id, action))
    }
}

/// Drives trial mutations on behalf of an operator.
#[derive(Clone)]
pub struct AdminMutationApi {
    engine: TrialEngine,
    clock: Arc<dyn Clock>,
}

impl AdminMutationApi {
    pub fn new(engine: TrialEngine, clock: Arc<dyn Clock>) -> Self {
        Self { engine, clock }
    }

    /// Validates and applies one mutation request.
    pub fn handle(&self, request: &AdminRequest) -> LicenseResult<AdminResponse> {
        let (machine_id, action) = request.parse()?;
        let updated = self.engine.apply(&machine_id, &action).map_err(|e| {
            warn!(machine_id = %machine_id, action = %action, error = %e, "admin mutation rejected");
            e
        })?;
        Ok(AdminResponse {
            ok: true,
            action: action.name().to_string(),
            trial: TrialView::at(&updated, self.clock.now()),
        })
    }
}
