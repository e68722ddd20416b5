//! Shared test helpers for client tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tablepos_client::{AuthorityClient, WatcherConfig};
use tablepos_license::{
    LicenseError, LicenseResult, LicenseStatusResponse, TrialStatus, TrialView,
};
use tablepos_types::MachineId;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub fn machine() -> MachineId {
    MachineId::parse("A1B2C3D4E5F60718").unwrap()
}

/// Fast timings: poll every 60 s, 5 s grace, 2 s request timeout.
pub fn fast_config() -> WatcherConfig {
    WatcherConfig {
        poll_interval: Duration::from_secs(60),
        offline_grace: Duration::from_secs(5),
        request_timeout: Duration::from_secs(2),
        countdown_tick: Duration::from_secs(1),
    }
}

pub fn trial_status(status: TrialStatus, expires_at: DateTime<Utc>) -> LicenseStatusResponse {
    LicenseStatusResponse {
        machine_id: machine(),
        activated: false,
        trial: Some(TrialView {
            machine_id: machine(),
            status,
            started_at: t0(),
            expires_at,
            remaining_ms: 0,
            paused_remaining_ms: None,
        }),
    }
}

pub fn active() -> LicenseStatusResponse {
    trial_status(TrialStatus::Active, t0() + ChronoDuration::days(7))
}

pub fn licensed() -> LicenseStatusResponse {
    LicenseStatusResponse {
        machine_id: machine(),
        activated: true,
        trial: None,
    }
}

/// What the scripted authority does on the next call.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(LicenseStatusResponse),
    Unreachable,
    /// Answers with the status, but only after the delay.
    Slow(Duration, LicenseStatusResponse),
    /// The client blows up mid-request.
    Panic,
}

/// Scripted [`AuthorityClient`] that also records concurrency.
#[derive(Debug)]
pub struct ScriptedAuthority {
    reply: Mutex<Reply>,
    redeem: Mutex<LicenseResult<()>>,
    calls: AtomicUsize,
    redeem_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedAuthority {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply: Mutex::new(reply),
            redeem: Mutex::new(Err(LicenseError::InvalidCode)),
            calls: AtomicUsize::new(0),
            redeem_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn set_redeem(&self, result: LicenseResult<()>) {
        *self.redeem.lock().unwrap() = result;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn redeem_calls(&self) -> usize {
        self.redeem_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn copy_result(result: &LicenseResult<()>) -> LicenseResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(LicenseError::Unreachable(msg)) => Err(LicenseError::Unreachable(msg.clone())),
        Err(LicenseError::AlreadyUsed) => Err(LicenseError::AlreadyUsed),
        Err(LicenseError::Expired) => Err(LicenseError::Expired),
        Err(_) => Err(LicenseError::InvalidCode),
    }
}

#[async_trait]
impl AuthorityClient for ScriptedAuthority {
    async fn fetch_status(&self, _machine_id: &MachineId) -> LicenseResult<LicenseStatusResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let reply = self.reply.lock().unwrap().clone();
        match reply {
            Reply::Status(status) => Ok(status),
            Reply::Unreachable => Err(LicenseError::Unreachable("connection refused".into())),
            Reply::Slow(delay, status) => {
                tokio::time::sleep(delay).await;
                Ok(status)
            }
            Reply::Panic => panic!("scripted client failure"),
        }
    }

    async fn redeem_reset_code(&self, _machine_id: &MachineId, _code: &str) -> LicenseResult<()> {
        self.redeem_calls.fetch_add(1, Ordering::SeqCst);
        copy_result(&self.redeem.lock().unwrap())
    }
}
