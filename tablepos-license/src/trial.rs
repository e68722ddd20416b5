//! Trial time-accounting state machine.
//!
//! States are `active`, `paused` and `expired`. Transitions are pure
//! functions of the current record and "now"; [`TrialEngine`] runs them as
//! a single read-modify-write against a [`LicenseStore`].
//!
//! ```text
//!            pause                 terminate / reduce past zero
//!  active ─────────▶ paused ─────────────────────────────▶ expired
//!    ▲  ◀───────────                                          │
//!    │     resume                                             │
//!    └──── extend / reactivate / set_expiry(future) ──────────┘
//! ```

use crate::api::LicenseStatusResponse;
use crate::config::LicensePolicy;
use crate::error::{LicenseError, LicenseResult};
use crate::record::{TrialRecord, TrialStatus, TrialView};
use crate::store::LicenseStore;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;
use tablepos_types::{Clock, MachineId};
use tracing::info;

/// An operator-driven trial mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrialAction {
    Extend { days: i64 },
    Reduce { days: i64 },
    Pause,
    Resume,
    Terminate,
    Reactivate,
    SetExpiry { expires_at: DateTime<Utc> },
}

impl TrialAction {
    /// Returns the wire name of the action.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Extend { .. } => "extend",
            Self::Reduce { .. } => "reduce",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Terminate => "terminate",
            Self::Reactivate => "reactivate",
            Self::SetExpiry { .. } => "setExpiry",
        }
    }
}

impl fmt::Display for TrialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn day_span(days: i64) -> LicenseResult<Duration> {
    if days < 1 {
        return Err(LicenseError::InvalidArgument(format!(
            "days must be at least 1, got {days}"
        )));
    }
    Duration::try_days(days)
        .ok_or_else(|| LicenseError::InvalidArgument(format!("days out of range: {days}")))
}

fn shift(at: DateTime<Utc>, by: Duration) -> LicenseResult<DateTime<Utc>> {
    at.checked_add_signed(by)
        .ok_or_else(|| LicenseError::InvalidArgument("resulting expiry out of range".to_string()))
}

impl TrialRecord {
    /// A fresh active trial starting at `now`.
    pub fn started(machine_id: MachineId, now: DateTime<Utc>, period: Duration) -> LicenseResult<Self> {
        Ok(Self {
            machine_id,
            status: TrialStatus::Active,
            started_at: now,
            expires_at: shift(now, period)?,
            paused_remaining_ms: None,
        })
    }

    /// Adds `days` to the later of the current expiry and `now`.
    ///
    /// Always leaves the trial active, so an expired trial is never
    /// shortened by the time that passed since it lapsed.
    pub fn extended(&self, days: i64, now: DateTime<Utc>) -> LicenseResult<Self> {
        let span = day_span(days)?;
        let base = self.expires_at.max(now);
        Ok(Self {
            status: TrialStatus::Active,
            expires_at: shift(base, span)?,
            paused_remaining_ms: None,
            ..self.clone()
        })
    }

    /// Removes `days` of trial time. Crossing zero expires the trial at `now`.
    pub fn reduced(&self, days: i64, now: DateTime<Utc>) -> LicenseResult<Self> {
        let span = day_span(days)?;
        match self.effective_status(now) {
            TrialStatus::Expired => Err(LicenseError::AlreadyExpired),
            TrialStatus::Paused => {
                let left = self
                    .paused_remaining_ms
                    .unwrap_or(0)
                    .saturating_sub(span.num_milliseconds());
                if left <= 0 {
                    Ok(Self {
                        status: TrialStatus::Expired,
                        expires_at: now,
                        paused_remaining_ms: Some(0),
                        ..self.clone()
                    })
                } else {
                    Ok(Self {
                        paused_remaining_ms: Some(left),
                        ..self.clone()
                    })
                }
            }
            TrialStatus::Active => {
                let new_expiry = shift(self.expires_at, -span)?;
                if new_expiry <= now {
                    Ok(Self {
                        status: TrialStatus::Expired,
                        expires_at: now,
                        paused_remaining_ms: None,
                        ..self.clone()
                    })
                } else {
                    Ok(Self {
                        expires_at: new_expiry,
                        ..self.clone()
                    })
                }
            }
        }
    }

    /// Stops the clock, banking the remaining time.
    pub fn paused(&self, now: DateTime<Utc>) -> LicenseResult<Self> {
        if self.status != TrialStatus::Active {
            return Err(LicenseError::InvalidState(format!(
                "cannot pause a {} trial",
                self.status
            )));
        }
        let remaining = (self.expires_at - now).num_milliseconds();
        if remaining <= 0 {
            return Err(LicenseError::AlreadyExpired);
        }
        Ok(Self {
            status: TrialStatus::Paused,
            expires_at: now,
            paused_remaining_ms: Some(remaining.max(0)),
            ..self.clone()
        })
    }

    /// Restarts the clock with the banked time.
    pub fn resumed(&self, now: DateTime<Utc>) -> LicenseResult<Self> {
        if self.status != TrialStatus::Paused {
            return Err(LicenseError::InvalidState(format!(
                "cannot resume a {} trial",
                self.status
            )));
        }
        let banked = Duration::milliseconds(self.paused_remaining_ms.unwrap_or(0).max(0));
        Ok(Self {
            status: TrialStatus::Active,
            expires_at: shift(now, banked)?,
            paused_remaining_ms: None,
            ..self.clone()
        })
    }

    /// Ends the trial immediately, whatever its state.
    #[must_use]
    pub fn terminated(&self, now: DateTime<Utc>) -> Self {
        Self {
            status: TrialStatus::Expired,
            expires_at: now,
            paused_remaining_ms: None,
            ..self.clone()
        }
    }

    /// Grants a fresh `period` from `now`, whatever the state.
    pub fn reactivated(&self, now: DateTime<Utc>, period: Duration) -> LicenseResult<Self> {
        Ok(Self {
            status: TrialStatus::Active,
            expires_at: shift(now, period)?,
            paused_remaining_ms: None,
            ..self.clone()
        })
    }

    /// Sets an absolute expiry; the status follows from whether it is in
    /// the future.
    #[must_use]
    pub fn with_expiry(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let status = if expires_at > now {
            TrialStatus::Active
        } else {
            TrialStatus::Expired
        };
        Self {
            status,
            expires_at,
            paused_remaining_ms: None,
            ..self.clone()
        }
    }

    /// Applies an operator action.
    pub fn apply(
        &self,
        action: &TrialAction,
        now: DateTime<Utc>,
        policy: &LicensePolicy,
    ) -> LicenseResult<Self> {
        match action {
            TrialAction::Extend { days } => self.extended(*days, now),
            TrialAction::Reduce { days } => self.reduced(*days, now),
            TrialAction::Pause => self.paused(now),
            TrialAction::Resume => self.resumed(now),
            TrialAction::Terminate => Ok(self.terminated(now)),
            TrialAction::Reactivate => self.reactivated(now, policy.reactivation_period()),
            TrialAction::SetExpiry { expires_at } => Ok(self.with_expiry(*expires_at, now)),
        }
    }
}

/// Parses an ISO-8601 / RFC 3339 expiry timestamp.
pub fn parse_expiry(raw: &str) -> LicenseResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LicenseError::InvalidArgument(format!("unparseable expiresAt {raw:?}: {e}")))
}

/// Runs trial transitions against a store.
#[derive(Clone)]
pub struct TrialEngine {
    store: Arc<dyn LicenseStore>,
    clock: Arc<dyn Clock>,
    policy: LicensePolicy,
}

impl TrialEngine {
    pub fn new(store: Arc<dyn LicenseStore>, clock: Arc<dyn Clock>, policy: LicensePolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &LicensePolicy {
        &self.policy
    }

    /// Starts the trial for a machine that has none.
    pub fn start(&self, machine_id: &MachineId) -> LicenseResult<TrialRecord> {
        let record =
            TrialRecord::started(machine_id.clone(), self.clock.now(), self.policy.trial_period())?;
        self.store.insert_trial(&record)?;
        info!(machine_id = %machine_id, expires_at = %record.expires_at, "trial started");
        Ok(record)
    }

    /// Returns the stored trial as seen now.
    pub fn view(&self, machine_id: &MachineId) -> LicenseResult<TrialView> {
        let record = self
            .store
            .get_trial(machine_id)?
            .ok_or_else(|| LicenseError::NotFound(format!("no trial for {machine_id}")))?;
        Ok(TrialView::at(&record, self.clock.now()))
    }

    /// Returns activation and trial state for a machine.
    ///
    /// Unknown machines are not an error: both parts are simply absent.
    pub fn license_status(&self, machine_id: &MachineId) -> LicenseResult<LicenseStatusResponse> {
        let now = self.clock.now();
        let activated = self.store.get_activation(machine_id)?.is_some();
        let trial = self
            .store
            .get_trial(machine_id)?
            .map(|record| TrialView::at(&record, now));
        Ok(LicenseStatusResponse {
            machine_id: machine_id.clone(),
            activated,
            trial,
        })
    }

    /// Applies an operator action as one serialized read-modify-write.
    pub fn apply(&self, machine_id: &MachineId, action: &TrialAction) -> LicenseResult<TrialRecord> {
        let updated = self.store.update_trial(machine_id, &|current: &TrialRecord| {
            current.apply(action, self.clock.now(), &self.policy)
        })?;
        info!(
            machine_id = %machine_id,
            action = %action,
            status = %updated.status,
            expires_at = %updated.expires_at,
            "trial updated"
        );
        Ok(updated)
    }

    pub fn extend(&self, machine_id: &MachineId, days: i64) -> LicenseResult<TrialRecord> {
        self.apply(machine_id, &TrialAction::Extend { days })
    }

    pub fn reduce(&self, machine_id: &MachineId, days: i64) -> LicenseResult<TrialRecord> {
        self.apply(machine_id, &TrialAction::Reduce { days })
    }

    pub fn pause(&self, machine_id: &MachineId) -> LicenseResult<TrialRecord> {
        self.apply(machine_id, &TrialAction::Pause)
    }

    pub fn resume(&self, machine_id: &MachineId) -> LicenseResult<TrialRecord> {
        self.apply(machine_id, &TrialAction::Resume)
    }

    pub fn terminate(&self, machine_id: &MachineId) -> LicenseResult<TrialRecord> {
        self.apply(machine_id, &TrialAction::Terminate)
    }

    pub fn reactivate(&self, machine_id: &MachineId) -> LicenseResult<TrialRecord> {
        self.apply(machine_id, &TrialAction::Reactivate)
    }

    pub fn set_expiry(
        &self,
        machine_id: &MachineId,
        expires_at: DateTime<Utc>,
    ) -> LicenseResult<TrialRecord> {
        self.apply(machine_id, &TrialAction::SetExpiry { expires_at })
    }
}
