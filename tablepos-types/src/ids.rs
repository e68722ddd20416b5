//! Machine identifier used as the key for every licensing record.
//!
//! Identifiers are hex strings of at least [`MIN_MACHINE_ID_LEN`]
//! characters. Input is case-insensitive; the stored form is always
//! upper-case so derivations and lookups agree.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Minimum number of hex characters in a machine identifier.
pub const MIN_MACHINE_ID_LEN: usize = 8;

/// Stable per-installation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MachineId(String);

impl MachineId {
    /// Parses and normalizes a machine identifier.
    ///
    /// Surrounding whitespace is ignored and the result is upper-cased.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let trimmed = s.trim();
        if trimmed.len() < MIN_MACHINE_ID_LEN {
            return Err(Error::InvalidMachineId(format!(
                "expected at least {MIN_MACHINE_ID_LEN} hex characters, got {}",
                trimmed.len()
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidMachineId(
                "machine id must be hexadecimal".to_string(),
            ));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Returns the normalized (upper-case) identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MachineId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MachineId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MachineId> for String {
    fn from(id: MachineId) -> Self {
        id.0
    }
}

impl AsRef<str> for MachineId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
