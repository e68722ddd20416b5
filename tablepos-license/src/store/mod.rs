//! Authoritative persistence for activation, trial and reset-code records.
//!
//! Every trial mutation goes through [`LicenseStore::update_trial`], which
//! runs the read-modify-write for one machine under a lock so concurrent
//! admin actions serialize instead of overwriting each other. When the
//! mutation fails, nothing is written.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryLicenseStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLicenseStore;

use crate::error::LicenseResult;
use crate::record::{ActivationRecord, ResetCode, TrialRecord};
use chrono::{DateTime, Utc};
use tablepos_types::MachineId;

/// Computes the next trial record from the current one.
pub type TrialMutation<'a> = &'a dyn Fn(&TrialRecord) -> LicenseResult<TrialRecord>;

/// Storage backend for licensing records.
pub trait LicenseStore: Send + Sync {
    /// Returns the activation for a machine, if any.
    fn get_activation(&self, machine_id: &MachineId) -> LicenseResult<Option<ActivationRecord>>;

    /// Stores an activation unless one exists. Returns the stored record,
    /// which is the earlier one when the machine was already activated.
    fn insert_activation(&self, record: ActivationRecord) -> LicenseResult<ActivationRecord>;

    /// Returns the trial record for a machine, if any.
    fn get_trial(&self, machine_id: &MachineId) -> LicenseResult<Option<TrialRecord>>;

    /// Creates a trial record. Fails with `InvalidState` if one exists.
    fn insert_trial(&self, record: &TrialRecord) -> LicenseResult<()>;

    /// Atomically replaces the trial record with `mutate(current)`.
    ///
    /// Fails with `NotFound` if the machine has no trial. Errors from
    /// `mutate` are returned unchanged and leave the record untouched.
    fn update_trial(
        &self,
        machine_id: &MachineId,
        mutate: TrialMutation<'_>,
    ) -> LicenseResult<TrialRecord>;

    /// Stores a freshly issued reset code.
    fn insert_reset_code(&self, code: &ResetCode) -> LicenseResult<()>;

    /// Deletes every reset code that is used or expired at `now`.
    /// Returns how many were removed.
    fn prune_reset_codes(&self, now: DateTime<Utc>) -> LicenseResult<usize>;

    /// Marks a reset code used if it exists, is unused and unexpired.
    ///
    /// The check and the flip happen atomically: of two racing
    /// redemptions exactly one succeeds. Fails with `InvalidCode`,
    /// `AlreadyUsed` or `Expired`.
    fn redeem_reset_code(
        &self,
        machine_id: &MachineId,
        code: &str,
        now: DateTime<Utc>,
    ) -> LicenseResult<ResetCode>;
}
