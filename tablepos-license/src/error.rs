//! Error types for the licensing module.

use thiserror::Error;

/// Message shown to end users for every rejected reset or unlock code.
pub const GENERIC_CODE_REJECTION: &str = "invalid or expired code";

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Bad input: non-positive `days`, unparseable timestamp, missing field.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No record exists for the machine.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested transition is not allowed from the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The trial has no time left to pause or reduce.
    #[error("trial already expired")]
    AlreadyExpired,

    /// Serial, unlock or reset code did not match.
    #[error("invalid code")]
    InvalidCode,

    /// Reset code is past its validity window.
    #[error("code expired")]
    Expired,

    /// Reset code was redeemed before.
    #[error("code already used")]
    AlreadyUsed,

    /// The licensing authority could not be reached in time.
    #[error("authority unreachable: {0}")]
    Unreachable(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LicenseError {
    /// Returns the HTTP-equivalent status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_) => 400,
            Self::InvalidCode => 401,
            Self::NotFound(_) => 404,
            Self::InvalidState(_) | Self::AlreadyExpired => 409,
            Self::Expired | Self::AlreadyUsed => 410,
            Self::Unreachable(_) => 503,
            Self::Storage(_) | Self::Serialization(_) => 500,
        }
    }

    /// Returns true for the failures a code check can produce.
    ///
    /// These are flattened to [`GENERIC_CODE_REJECTION`] before reaching an
    /// end user so the response does not reveal which check failed.
    #[must_use]
    pub fn is_code_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidCode | Self::Expired | Self::AlreadyUsed | Self::NotFound(_)
        )
    }

    /// Returns true if the error means the authority was not reachable.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

impl From<tablepos_types::Error> for LicenseError {
    fn from(err: tablepos_types::Error) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for LicenseError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
