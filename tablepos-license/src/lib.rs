//! Trial licensing and activation for TablePOS.
//!
//! This crate handles the authority side of licensing:
//! - Deterministic serial and unlock codes (HMAC-SHA-256, constant-time checks)
//! - The trial time-accounting state machine and its operator mutations
//! - One-time password-reset codes with atomic single use
//! - Persistence behind the [`LicenseStore`] trait (in-memory and SQLite)
//! - Machine identity generation for the desktop client
//!
//! # Design Principles
//!
//! - **One record per installation**: every entity is keyed by [`MachineId`]
//! - **Injected time**: transitions read "now" from a [`Clock`], never the OS
//! - **Injected secrets**: both code secrets arrive in a [`LicenseConfig`]
//! - **Serialized writes**: each mutation is a single locked read-modify-write
//!
//! [`MachineId`]: tablepos_types::MachineId
//! [`Clock`]: tablepos_types::Clock

mod activation;
pub mod admin;
pub mod api;
pub mod codec;
mod config;
mod device;
mod error;
mod record;
mod reset;
pub mod store;
mod trial;

pub use activation::ActivationService;
pub use admin::{AdminMutationApi, AdminRequest, AdminResponse};
pub use api::{
    ActivateRequest, ErrorBody, IssueResetCodeRequest, LicenseStatusResponse,
    RedeemResetCodeRequest, StartTrialRequest, SupportCodes,
};
pub use codec::{
    derive_serial_code, derive_unlock_code, generate_one_time_code, verify_serial_code,
    verify_unlock_code,
};
pub use config::{CodeSecret, LicenseConfig, LicensePolicy, RESET_CODE_TTL_HOURS};
pub use device::{default_identity_path, generate_machine_id, load_or_generate};
pub use error::{LicenseError, LicenseResult, GENERIC_CODE_REJECTION};
pub use record::{ActivationRecord, ResetCode, TrialRecord, TrialStatus, TrialView};
pub use reset::ResetCodeService;
pub use store::{LicenseStore, MemoryLicenseStore};
#[cfg(feature = "sqlite")]
pub use store::SqliteLicenseStore;
pub use trial::{parse_expiry, TrialAction, TrialEngine};
