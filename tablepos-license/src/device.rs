//! Machine identity for license binding.
//!
//! Generates a stable identifier for this installation from hardware and
//! host identifiers, and persists it so it never changes once issued.

use crate::error::{LicenseError, LicenseResult};
use sha2::{Digest, Sha256};
use std::env;
use std::path::{Path, PathBuf};
use tablepos_types::MachineId;
use tracing::info;

/// Bytes of the hardware hash kept in the identifier (32 hex characters).
const MACHINE_ID_BYTES: usize = 16;

/// File name used under the application data directory.
const IDENTITY_FILE: &str = "machine-id";

/// Derives a machine identifier from the current device.
///
/// Survives reboots but changes if the hardware or host changes
/// significantly. Use [`load_or_generate`] to pin it.
pub fn generate_machine_id() -> LicenseResult<MachineId> {
    let combined = collect_hardware_ids().join("|");
    let hash = Sha256::digest(combined.as_bytes());
    let id = hex::encode_upper(&hash[..MACHINE_ID_BYTES]);
    Ok(MachineId::parse(&id)?)
}

/// Loads the persisted identifier, generating and saving one on first run.
pub fn load_or_generate(path: &Path) -> LicenseResult<MachineId> {
    if path.exists() {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LicenseError::Storage(format!("failed to read {}: {e}", path.display()))
        })?;
        return Ok(MachineId::parse(&raw)?);
    }

    let id = generate_machine_id()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            LicenseError::Storage(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    std::fs::write(path, id.as_str()).map_err(|e| {
        LicenseError::Storage(format!("failed to write {}: {e}", path.display()))
    })?;
    info!(machine_id = %id, "generated new machine identity");
    Ok(id)
}

/// Default location of the identity file in the user's data directory.
#[must_use]
pub fn default_identity_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("tablepos").join(IDENTITY_FILE))
}

/// Collects hardware identifiers for fingerprinting.
fn collect_hardware_ids() -> Vec<String> {
    let mut ids = vec![
        env::consts::OS.to_string(),
        env::consts::ARCH.to_string(),
        get_hostname(),
    ];

    if let Some(machine_id) = get_platform_machine_id() {
        ids.push(machine_id);
    }

    if let Ok(user) = env::var("USER").or_else(|_| env::var("USERNAME")) {
        ids.push(user);
    }

    ids
}

fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Platform-specific unique identifier, when the OS exposes one.
fn get_platform_machine_id() -> Option<String> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("reg")
            .args([
                "query",
                r"HKLM\SOFTWARE\Microsoft\Cryptography",
                "/v",
                "MachineGuid",
            ])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("MachineGuid"))
                    .and_then(|l| l.split_whitespace().last())
                    .map(String::from)
            })
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        None
    }
}
