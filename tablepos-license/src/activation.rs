//! Serial-code redemption.

use crate::codec::verify_serial_code;
use crate::config::CodeSecret;
use crate::error::{LicenseError, LicenseResult};
use crate::record::ActivationRecord;
use crate::store::LicenseStore;
use std::sync::Arc;
use tablepos_types::{Clock, MachineId};
use tracing::{info, warn};

/// Turns a valid serial code into a permanent activation.
#[derive(Clone)]
pub struct ActivationService {
    store: Arc<dyn LicenseStore>,
    clock: Arc<dyn Clock>,
    serial_secret: CodeSecret,
}

impl ActivationService {
    pub fn new(store: Arc<dyn LicenseStore>, clock: Arc<dyn Clock>, serial_secret: CodeSecret) -> Self {
        Self {
            store,
            clock,
            serial_secret,
        }
    }

    /// Redeems a serial for `machine_id`.
    ///
    /// Redeeming again for an already activated machine returns the
    /// original record; the activation time never moves.
    pub fn activate(&self, machine_id: &MachineId, serial: &str) -> LicenseResult<ActivationRecord> {
        if !verify_serial_code(serial, machine_id, &self.serial_secret)? {
            warn!(machine_id = %machine_id, "serial code rejected");
            return Err(LicenseError::InvalidCode);
        }
        let stored = self.store.insert_activation(ActivationRecord {
            machine_id: machine_id.clone(),
            activated_at: self.clock.now(),
        })?;
        info!(machine_id = %machine_id, activated_at = %stored.activated_at, "machine activated");
        Ok(stored)
    }

    /// Returns true once the machine holds a permanent license.
    pub fn is_activated(&self, machine_id: &MachineId) -> LicenseResult<bool> {
        Ok(self.store.get_activation(machine_id)?.is_some())
    }
}
