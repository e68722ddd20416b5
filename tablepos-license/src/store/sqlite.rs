//! Durable store backed by SQLite.
//!
//! Timestamps are stored as Unix milliseconds. Trial updates and reset-code
//! redemption run inside `IMMEDIATE` transactions, which take the database
//! write lock up front so a second process cannot interleave its own
//! read-modify-write.

use super::{LicenseStore, TrialMutation};
use crate::error::{LicenseError, LicenseResult};
use crate::record::{ActivationRecord, ResetCode, TrialRecord, TrialStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tablepos_types::MachineId;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistent [`LicenseStore`] backed by a SQLite file.
pub struct SqliteLicenseStore {
    conn: Mutex<Connection>,
}

impl SqliteLicenseStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: &Path) -> LicenseResult<Self> {
        let conn = Connection::open(path).map_err(|e| {
            LicenseError::Storage(format!("failed to open license store: {e}"))
        })?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> LicenseResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            LicenseError::Storage(format!("failed to open in-memory license store: {e}"))
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> LicenseResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> LicenseResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LicenseError::Storage("license store lock poisoned".to_string()))
    }

    fn init_schema(&self) -> LicenseResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS activations (
                machine_id TEXT PRIMARY KEY,
                activated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trials (
                machine_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                paused_remaining_ms INTEGER
            );

            CREATE TABLE IF NOT EXISTS reset_codes (
                machine_id TEXT NOT NULL,
                code TEXT NOT NULL,
                used INTEGER NOT NULL DEFAULT 0,
                expires_at INTEGER NOT NULL,
                UNIQUE(machine_id, code)
            );
            ",
        )
        .map_err(|e| LicenseError::Storage(format!("failed to init license schema: {e}")))?;
        Ok(())
    }
}

type TrialRow = (String, String, i64, i64, Option<i64>);

fn from_millis(ms: i64) -> LicenseResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| LicenseError::Storage(format!("timestamp out of range: {ms}")))
}

fn stored_machine_id(raw: &str) -> LicenseResult<MachineId> {
    MachineId::parse(raw).map_err(|e| LicenseError::Storage(format!("corrupt machine id: {e}")))
}

fn trial_from_row(row: TrialRow) -> LicenseResult<TrialRecord> {
    let (machine_id, status, started_at, expires_at, paused_remaining_ms) = row;
    Ok(TrialRecord {
        machine_id: stored_machine_id(&machine_id)?,
        status: status.parse::<TrialStatus>()?,
        started_at: from_millis(started_at)?,
        expires_at: from_millis(expires_at)?,
        paused_remaining_ms,
    })
}

fn select_trial(conn: &Connection, machine_id: &MachineId) -> LicenseResult<Option<TrialRecord>> {
    let row: Option<TrialRow> = conn
        .query_row(
            "SELECT machine_id, status, started_at, expires_at, paused_remaining_ms
             FROM trials WHERE machine_id = ?1",
            params![machine_id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()?;
    row.map(trial_from_row).transpose()
}

impl LicenseStore for SqliteLicenseStore {
    fn get_activation(&self, machine_id: &MachineId) -> LicenseResult<Option<ActivationRecord>> {
        let conn = self.lock()?;
        let activated_at: Option<i64> = conn
            .query_row(
                "SELECT activated_at FROM activations WHERE machine_id = ?1",
                params![machine_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        activated_at
            .map(|ms| {
                Ok(ActivationRecord {
                    machine_id: machine_id.clone(),
                    activated_at: from_millis(ms)?,
                })
            })
            .transpose()
    }

    fn insert_activation(&self, record: ActivationRecord) -> LicenseResult<ActivationRecord> {
        {
            let conn = self.lock()?;
            conn.execute(
                "INSERT OR IGNORE INTO activations (machine_id, activated_at) VALUES (?1, ?2)",
                params![
                    record.machine_id.as_str(),
                    record.activated_at.timestamp_millis()
                ],
            )?;
        }
        self.get_activation(&record.machine_id)?.ok_or_else(|| {
            LicenseError::Storage(format!("activation for {} vanished", record.machine_id))
        })
    }

    fn get_trial(&self, machine_id: &MachineId) -> LicenseResult<Option<TrialRecord>> {
        let conn = self.lock()?;
        select_trial(&conn, machine_id)
    }

    fn insert_trial(&self, record: &TrialRecord) -> LicenseResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if select_trial(&tx, &record.machine_id)?.is_some() {
            return Err(LicenseError::InvalidState(format!(
                "trial already started for {}",
                record.machine_id
            )));
        }
        tx.execute(
            "INSERT INTO trials (machine_id, status, started_at, expires_at, paused_remaining_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.machine_id.as_str(),
                record.status.as_str(),
                record.started_at.timestamp_millis(),
                record.expires_at.timestamp_millis(),
                record.paused_remaining_ms,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn update_trial(
        &self,
        machine_id: &MachineId,
        mutate: TrialMutation<'_>,
    ) -> LicenseResult<TrialRecord> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = select_trial(&tx, machine_id)?
            .ok_or_else(|| LicenseError::NotFound(format!("no trial for {machine_id}")))?;
        let next = mutate(&current)?;
        tx.execute(
            "UPDATE trials
             SET status = ?2, started_at = ?3, expires_at = ?4, paused_remaining_ms = ?5
             WHERE machine_id = ?1",
            params![
                machine_id.as_str(),
                next.status.as_str(),
                next.started_at.timestamp_millis(),
                next.expires_at.timestamp_millis(),
                next.paused_remaining_ms,
            ],
        )?;
        tx.commit()?;
        Ok(next)
    }

    fn insert_reset_code(&self, code: &ResetCode) -> LicenseResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO reset_codes (machine_id, code, used, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                code.machine_id.as_str(),
                code.code,
                code.used,
                code.expires_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn prune_reset_codes(&self, now: DateTime<Utc>) -> LicenseResult<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM reset_codes WHERE used = 1 OR expires_at <= ?1",
            params![now.timestamp_millis()],
        )?;
        Ok(removed)
    }

    fn redeem_reset_code(
        &self,
        machine_id: &MachineId,
        code: &str,
        now: DateTime<Utc>,
    ) -> LicenseResult<ResetCode> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let row: Option<(bool, i64)> = tx
            .query_row(
                "SELECT used, expires_at FROM reset_codes WHERE machine_id = ?1 AND code = ?2",
                params![machine_id.as_str(), code],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (used, expires_at) = row.ok_or(LicenseError::InvalidCode)?;
        let expires_at = from_millis(expires_at)?;
        if used {
            return Err(LicenseError::AlreadyUsed);
        }
        if expires_at <= now {
            return Err(LicenseError::Expired);
        }
        let changed = tx.execute(
            "UPDATE reset_codes SET used = 1
             WHERE machine_id = ?1 AND code = ?2 AND used = 0",
            params![machine_id.as_str(), code],
        )?;
        if changed != 1 {
            return Err(LicenseError::AlreadyUsed);
        }
        tx.commit()?;
        Ok(ResetCode {
            machine_id: machine_id.clone(),
            code: code.to_string(),
            used: true,
            expires_at,
        })
    }
}
