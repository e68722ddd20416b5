//! Authority half of the password-reset flow.
//!
//! Two independent proofs are accepted:
//! - the deterministic unlock code, recomputed from the machine id and the
//!   unlock secret (never stored, never consumed);
//! - a random one-time code issued here, valid for 24 hours and consumed
//!   on first successful redemption.
//!
//! Rejections keep their precise cause in the returned error and in the
//! log; callers facing end users flatten them with
//! [`LicenseError::is_code_rejection`].

use crate::codec::{generate_one_time_code, normalize_code, verify_unlock_code};
use crate::config::{CodeSecret, RESET_CODE_TTL_HOURS};
use crate::error::{LicenseError, LicenseResult};
use crate::record::ResetCode;
use crate::store::LicenseStore;
use chrono::Duration;
use std::sync::Arc;
use tablepos_types::{Clock, MachineId};
use tracing::{debug, info, warn};

/// Issues and redeems password-reset codes.
#[derive(Clone)]
pub struct ResetCodeService {
    store: Arc<dyn LicenseStore>,
    clock: Arc<dyn Clock>,
    unlock_secret: CodeSecret,
}

impl ResetCodeService {
    pub fn new(store: Arc<dyn LicenseStore>, clock: Arc<dyn Clock>, unlock_secret: CodeSecret) -> Self {
        Self {
            store,
            clock,
            unlock_secret,
        }
    }

    /// Creates and stores a one-time code for `machine_id`.
    ///
    /// Used and expired codes of every machine are deleted first, so the
    /// table only ever holds codes that could still be redeemed.
    pub fn issue(&self, machine_id: &MachineId) -> LicenseResult<ResetCode> {
        let now = self.clock.now();
        let pruned = self.store.prune_reset_codes(now)?;
        if pruned > 0 {
            debug!(pruned, "dropped spent reset codes");
        }
        let code = ResetCode {
            machine_id: machine_id.clone(),
            code: generate_one_time_code(),
            used: false,
            expires_at: now + Duration::hours(RESET_CODE_TTL_HOURS),
        };
        self.store.insert_reset_code(&code)?;
        info!(machine_id = %machine_id, expires_at = %code.expires_at, "reset code issued");
        Ok(code)
    }

    /// Consumes a one-time code. Succeeds at most once per code.
    pub fn redeem(&self, machine_id: &MachineId, candidate: &str) -> LicenseResult<ResetCode> {
        let code = normalize_code(candidate);
        match self.store.redeem_reset_code(machine_id, &code, self.clock.now()) {
            Ok(redeemed) => {
                info!(machine_id = %machine_id, "reset code redeemed");
                Ok(redeemed)
            }
            Err(e) => {
                warn!(machine_id = %machine_id, reason = %e, "reset code rejected");
                Err(e)
            }
        }
    }

    /// Accepts either proof: the machine's unlock code, or an unused
    /// one-time code, which is consumed.
    ///
    /// The unlock check is silent; a rejection is logged once, with the
    /// one-time code's precise reason, only after both proofs failed.
    pub fn authorize(&self, machine_id: &MachineId, candidate: &str) -> LicenseResult<()> {
        if verify_unlock_code(candidate, machine_id, &self.unlock_secret)? {
            info!(machine_id = %machine_id, "password reset authorized by unlock code");
            return Ok(());
        }
        self.redeem(machine_id, candidate).map(|_| ())
    }

    /// Checks a deterministic unlock code. Works without any stored state.
    pub fn verify_unlock(&self, machine_id: &MachineId, candidate: &str) -> LicenseResult<()> {
        if verify_unlock_code(candidate, machine_id, &self.unlock_secret)? {
            Ok(())
        } else {
            warn!(machine_id = %machine_id, "unlock code rejected");
            Err(LicenseError::InvalidCode)
        }
    }
}
