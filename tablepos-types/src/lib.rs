//! Core type definitions for TablePOS licensing.
//!
//! This crate defines the leaf types shared by the licensing authority and
//! the desktop client:
//! - Machine identifiers (upper-case hex, the primary key of every record)
//! - Clock abstraction so time-dependent logic can run on simulated time
//!
//! Domain records (trials, activations, reset codes) live in
//! `tablepos-license`, not here.

mod clock;
mod ids;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{MachineId, MIN_MACHINE_ID_LEN};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid machine id: {0}")]
    InvalidMachineId(String),
}
