//! Shared test helpers for license tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tablepos_license::{
    ActivationService, CodeSecret, LicenseConfig, LicensePolicy, LicenseStore,
    MemoryLicenseStore, ResetCodeService, TrialEngine, TrialRecord, TrialStatus,
};
use tablepos_types::{ManualClock, MachineId};

pub const SERIAL_SECRET: &[u8] = b"test-serial-secret";
pub const UNLOCK_SECRET: &[u8] = b"test-unlock-secret";

/// Serial for [`machine`] under [`SERIAL_SECRET`], computed independently.
pub const KNOWN_SERIAL: &str = "13440-6651E-4FA15-9934A";

/// Unlock code for [`machine`] under [`UNLOCK_SECRET`], computed independently.
pub const KNOWN_UNLOCK: &str = "CE009BA9";

/// Fixed reference instant, `T0` in the scenarios.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub fn machine() -> MachineId {
    MachineId::parse("a1b2c3d4e5f60718").unwrap()
}

pub fn other_machine() -> MachineId {
    MachineId::parse("0000FFFF0000FFFF").unwrap()
}

pub fn serial_secret() -> CodeSecret {
    CodeSecret::new(SERIAL_SECRET)
}

pub fn unlock_secret() -> CodeSecret {
    CodeSecret::new(UNLOCK_SECRET)
}

pub fn config() -> LicenseConfig {
    LicenseConfig::new(serial_secret(), unlock_secret(), LicensePolicy::default()).unwrap()
}

/// An active trial started at `T0` running for seven days.
pub fn fresh_trial() -> TrialRecord {
    TrialRecord {
        machine_id: machine(),
        status: TrialStatus::Active,
        started_at: t0(),
        expires_at: t0() + Duration::days(7),
        paused_remaining_ms: None,
    }
}

/// Asserts two instants are within one second of each other.
pub fn assert_close(actual: DateTime<Utc>, expected: DateTime<Utc>) {
    let drift = (actual - expected).num_milliseconds().abs();
    assert!(drift <= 1_000, "expected ~{expected}, got {actual}");
}

/// An engine over an in-memory store with a manual clock at `T0`.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryLicenseStore>,
    pub engine: TrialEngine,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(MemoryLicenseStore::new());
        let engine = TrialEngine::new(store.clone(), clock.clone(), LicensePolicy::default());
        Self {
            clock,
            store,
            engine,
        }
    }

    pub fn with_started_trial() -> Self {
        let harness = Self::new();
        harness.engine.start(&machine()).unwrap();
        harness
    }

    pub fn stored(&self) -> TrialRecord {
        self.store.get_trial(&machine()).unwrap().unwrap()
    }

    pub fn resets(&self) -> ResetCodeService {
        ResetCodeService::new(self.store.clone(), self.clock.clone(), unlock_secret())
    }

    pub fn activations(&self) -> ActivationService {
        ActivationService::new(self.store.clone(), self.clock.clone(), serial_secret())
    }
}
