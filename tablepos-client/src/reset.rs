//! Two-step password-reset check: the deterministic unlock code first,
//! then the authority's one-time code.
//!
//! The outcome records what each step did so a caller can tell "local
//! check failed, remote never tried" from "both failed". What the end user
//! sees comes from [`ResetOutcome::user_message`], which never says which
//! check failed.

use crate::authority::AuthorityClient;
use std::sync::Arc;
use std::time::Duration;
use tablepos_license::codec::normalize_code;
use tablepos_license::{verify_unlock_code, CodeSecret, GENERIC_CODE_REJECTION};
use tablepos_types::MachineId;
use tracing::{debug, info, warn};

/// Shown when the code could not be checked because the authority is down.
pub const UNREACHABLE_MESSAGE: &str = "licensing server unreachable, try again later";

/// Shown after a successful check.
pub const ACCEPTED_MESSAGE: &str = "code accepted";

/// What one step of the pipeline concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Authorized,
    Rejected,
    /// The step is not configured on this installation.
    Skipped,
    /// The authority did not answer in time.
    Unreachable,
}

/// Which step authorized the reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPath {
    /// Deterministic unlock code, checked offline.
    Local,
    /// One-time code, consumed at the authority.
    Remote,
}

/// Result of running the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Authorized(ResetPath),
    Rejected { local: StepResult, remote: StepResult },
}

impl ResetOutcome {
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized(_))
    }

    /// Message safe to show the end user.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Authorized(_) => ACCEPTED_MESSAGE,
            Self::Rejected {
                remote: StepResult::Unreachable,
                ..
            } => UNREACHABLE_MESSAGE,
            Self::Rejected { .. } => GENERIC_CODE_REJECTION,
        }
    }
}

/// Client-side reset pipeline for one machine.
#[derive(Clone)]
pub struct ResetFlow {
    machine_id: MachineId,
    unlock_secret: Option<CodeSecret>,
    authority: Option<Arc<dyn AuthorityClient>>,
    request_timeout: Duration,
}

impl ResetFlow {
    /// A pipeline with neither path enabled.
    pub fn new(machine_id: MachineId) -> Self {
        Self {
            machine_id,
            unlock_secret: None,
            authority: None,
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Enables the offline unlock-code path.
    #[must_use]
    pub fn with_unlock_secret(mut self, secret: CodeSecret) -> Self {
        self.unlock_secret = Some(secret);
        self
    }

    /// Enables the one-time-code path.
    #[must_use]
    pub fn with_authority(mut self, authority: Arc<dyn AuthorityClient>, request_timeout: Duration) -> Self {
        self.authority = Some(authority);
        self.request_timeout = request_timeout;
        self
    }

    /// Checks `code` as a deterministic unlock code. Never touches the network.
    pub fn try_local(&self, code: &str) -> StepResult {
        let Some(secret) = &self.unlock_secret else {
            return StepResult::Skipped;
        };
        match verify_unlock_code(code, &self.machine_id, secret) {
            Ok(true) => StepResult::Authorized,
            Ok(false) => StepResult::Rejected,
            Err(e) => {
                warn!(error = %e, "unlock code check failed");
                StepResult::Rejected
            }
        }
    }

    /// Redeems `code` as a one-time code at the authority.
    pub async fn try_remote(&self, code: &str) -> StepResult {
        let Some(authority) = &self.authority else {
            return StepResult::Skipped;
        };
        let code = normalize_code(code);
        let redeem = authority.redeem_reset_code(&self.machine_id, &code);
        match tokio::time::timeout(self.request_timeout, redeem).await {
            Ok(Ok(())) => StepResult::Authorized,
            Ok(Err(e)) if e.is_unreachable() => {
                warn!(error = %e, "reset code not checked, authority unreachable");
                StepResult::Unreachable
            }
            Ok(Err(e)) => {
                debug!(error = %e, "reset code rejected by authority");
                StepResult::Rejected
            }
            Err(_) => {
                warn!("reset code not checked, authority timed out");
                StepResult::Unreachable
            }
        }
    }

    /// Runs `try_local`, then `try_remote` only if the local step did not
    /// authorize.
    pub async fn redeem(&self, code: &str) -> ResetOutcome {
        let local = self.try_local(code);
        if local == StepResult::Authorized {
            info!(machine_id = %self.machine_id, "password reset authorized by unlock code");
            return ResetOutcome::Authorized(ResetPath::Local);
        }
        let remote = self.try_remote(code).await;
        if remote == StepResult::Authorized {
            info!(machine_id = %self.machine_id, "password reset authorized by one-time code");
            return ResetOutcome::Authorized(ResetPath::Remote);
        }
        ResetOutcome::Rejected { local, remote }
    }
}
