//! In-process store, used by tests and single-node deployments.

use super::{LicenseStore, TrialMutation};
use crate::codec::constant_time_eq;
use crate::error::{LicenseError, LicenseResult};
use crate::record::{ActivationRecord, ResetCode, TrialRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tablepos_types::MachineId;

#[derive(Debug, Default)]
struct MemoryState {
    activations: HashMap<MachineId, ActivationRecord>,
    trials: HashMap<MachineId, TrialRecord>,
    reset_codes: Vec<ResetCode>,
}

/// A [`LicenseStore`] held entirely in memory behind one mutex.
#[derive(Debug, Default)]
pub struct MemoryLicenseStore {
    state: Mutex<MemoryState>,
}

impl MemoryLicenseStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> LicenseResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| LicenseError::Storage("license store lock poisoned".to_string()))
    }
}

impl LicenseStore for MemoryLicenseStore {
    fn get_activation(&self, machine_id: &MachineId) -> LicenseResult<Option<ActivationRecord>> {
        Ok(self.lock()?.activations.get(machine_id).cloned())
    }

    fn insert_activation(&self, record: ActivationRecord) -> LicenseResult<ActivationRecord> {
        let mut state = self.lock()?;
        let stored = state
            .activations
            .entry(record.machine_id.clone())
            .or_insert(record);
        Ok(stored.clone())
    }

    fn get_trial(&self, machine_id: &MachineId) -> LicenseResult<Option<TrialRecord>> {
        Ok(self.lock()?.trials.get(machine_id).cloned())
    }

    fn insert_trial(&self, record: &TrialRecord) -> LicenseResult<()> {
        let mut state = self.lock()?;
        if state.trials.contains_key(&record.machine_id) {
            return Err(LicenseError::InvalidState(format!(
                "trial already started for {}",
                record.machine_id
            )));
        }
        state
            .trials
            .insert(record.machine_id.clone(), record.clone());
        Ok(())
    }

    fn update_trial(
        &self,
        machine_id: &MachineId,
        mutate: TrialMutation<'_>,
    ) -> LicenseResult<TrialRecord> {
        let mut state = self.lock()?;
        let current = state
            .trials
            .get(machine_id)
            .ok_or_else(|| LicenseError::NotFound(format!("no trial for {machine_id}")))?;
        let next = mutate(current)?;
        state.trials.insert(machine_id.clone(), next.clone());
        Ok(next)
    }

    fn insert_reset_code(&self, code: &ResetCode) -> LicenseResult<()> {
        self.lock()?.reset_codes.push(code.clone());
        Ok(())
    }

    fn prune_reset_codes(&self, now: DateTime<Utc>) -> LicenseResult<usize> {
        let mut state = self.lock()?;
        let before = state.reset_codes.len();
        state
            .reset_codes
            .retain(|code| !code.used && !code.is_expired(now));
        Ok(before - state.reset_codes.len())
    }

    fn redeem_reset_code(
        &self,
        machine_id: &MachineId,
        code: &str,
        now: DateTime<Utc>,
    ) -> LicenseResult<ResetCode> {
        let mut state = self.lock()?;
        let entry = state
            .reset_codes
            .iter_mut()
            .find(|c| &c.machine_id == machine_id && constant_time_eq(&c.code, code))
            .ok_or(LicenseError::InvalidCode)?;
        if entry.used {
            return Err(LicenseError::AlreadyUsed);
        }
        if entry.is_expired(now) {
            return Err(LicenseError::Expired);
        }
        entry.used = true;
        Ok(entry.clone())
    }
}
