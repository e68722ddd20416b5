//! Activation, unlock and one-time code derivation.
//!
//! Two deterministic families are keyed HMAC-SHA-256 digests of the
//! upper-cased machine id, each under its own secret:
//!
//! - Serial code: first 20 hex characters as `XXXXX-XXXXX-XXXXX-XXXXX`.
//!   Redeemed once to create an activation record.
//! - Unlock code: first 8 hex characters. A permanent, offline-verifiable
//!   password-reset proof.
//!
//! One-time reset codes are random, 8 upper-case hex characters, and only
//! meaningful against the copy persisted by the authority.
//!
//! All comparisons against derived codes are constant-time.

use crate::config::CodeSecret;
use crate::error::{LicenseError, LicenseResult};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tablepos_types::MachineId;

type HmacSha256 = Hmac<Sha256>;

/// Hex characters kept from the digest for a serial code.
pub const SERIAL_HEX_LEN: usize = 20;

/// Characters per dash-separated serial group.
pub const SERIAL_GROUP_LEN: usize = 5;

/// Length of a formatted serial, separators included.
pub const SERIAL_CODE_LEN: usize = SERIAL_HEX_LEN + SERIAL_HEX_LEN / SERIAL_GROUP_LEN - 1;

/// Length of unlock and one-time reset codes.
pub const SHORT_CODE_LEN: usize = 8;

fn keyed_hex(machine_id: &MachineId, secret: &CodeSecret) -> LicenseResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| LicenseError::InvalidArgument(format!("unusable code secret: {e}")))?;
    mac.update(machine_id.as_str().to_ascii_uppercase().as_bytes());
    Ok(hex::encode_upper(mac.finalize().into_bytes()))
}

/// Derives the activation serial for a machine.
pub fn derive_serial_code(machine_id: &MachineId, secret: &CodeSecret) -> LicenseResult<String> {
    let digest = keyed_hex(machine_id, secret)?;
    let groups: Vec<&str> = digest.as_bytes()[..SERIAL_HEX_LEN]
        .chunks(SERIAL_GROUP_LEN)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    Ok(groups.join("-"))
}

/// Derives the permanent password-reset unlock code for a machine.
pub fn derive_unlock_code(machine_id: &MachineId, secret: &CodeSecret) -> LicenseResult<String> {
    let mut digest = keyed_hex(machine_id, secret)?;
    digest.truncate(SHORT_CODE_LEN);
    Ok(digest)
}

/// Generates a random single-use reset code.
#[must_use]
pub fn generate_one_time_code() -> String {
    let mut bytes = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let mut code = hex::encode_upper(bytes);
    code.truncate(SHORT_CODE_LEN);
    code
}

/// Normalizes user-entered codes: trims whitespace and upper-cases.
#[must_use]
pub fn normalize_code(candidate: &str) -> String {
    candidate.trim().to_ascii_uppercase()
}

/// Compares two strings without short-circuiting on the first mismatch.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Checks a candidate serial against the one derived for `machine_id`.
pub fn verify_serial_code(
    candidate: &str,
    machine_id: &MachineId,
    secret: &CodeSecret,
) -> LicenseResult<bool> {
    let expected = derive_serial_code(machine_id, secret)?;
    Ok(constant_time_eq(&normalize_code(candidate), &expected))
}

/// Checks a candidate unlock code against the one derived for `machine_id`.
pub fn verify_unlock_code(
    candidate: &str,
    machine_id: &MachineId,
    secret: &CodeSecret,
) -> LicenseResult<bool> {
    let expected = derive_unlock_code(machine_id, secret)?;
    Ok(constant_time_eq(&normalize_code(candidate), &expected))
}
