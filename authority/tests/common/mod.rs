//! Shared helpers for authority HTTP tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tablepos_authority::{build_router, AppState};
use tablepos_license::{CodeSecret, LicenseConfig, LicensePolicy, SqliteLicenseStore};
use tablepos_types::{MachineId, ManualClock};

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Serial for [`MACHINE`] under the test serial secret.
pub const KNOWN_SERIAL: &str = "13440-6651E-4FA15-9934A";

/// Unlock code for [`MACHINE`] under the test unlock secret.
pub const KNOWN_UNLOCK: &str = "CE009BA9";

pub const MACHINE: &str = "A1B2C3D4E5F60718";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub fn machine() -> MachineId {
    MachineId::parse(MACHINE).unwrap()
}

pub struct TestServer {
    pub base: String,
    pub clock: Arc<ManualClock>,
    pub http: reqwest::Client,
}

impl TestServer {
    /// Spin up the HTTP server on an OS-assigned port over an in-memory database.
    pub async fn spawn() -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        let config = LicenseConfig::new(
            CodeSecret::new(b"test-serial-secret".to_vec()),
            CodeSecret::new(b"test-unlock-secret".to_vec()),
            LicensePolicy::default(),
        )
        .unwrap();
        let store = Arc::new(SqliteLicenseStore::open_in_memory().unwrap());
        let state = AppState::new(store, clock.clone(), config, ADMIN_TOKEN).unwrap();
        let app = build_router(Arc::new(state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://127.0.0.1:{port}"),
            clock,
            http: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.http.post(self.url(path)).json(&body).send().await.unwrap()
    }

    pub async fn admin_post(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.http
            .post(self.url(path))
            .bearer_auth(ADMIN_TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.http.get(self.url(path)).send().await.unwrap()
    }

    pub async fn start_trial(&self) {
        let resp = self
            .post("/api/v1/trial/start", serde_json::json!({ "machineId": MACHINE }))
            .await;
        assert_eq!(resp.status(), 201);
    }

    pub async fn issue_reset_code(&self) -> String {
        let resp = self
            .admin_post("/api/v1/admin/reset-codes", serde_json::json!({ "machineId": MACHINE }))
            .await;
        assert_eq!(resp.status(), 201);
        let body: serde_json::Value = resp.json().await.unwrap();
        body["code"].as_str().unwrap().to_string()
    }
}

/// Reads the `error` field of an error body.
pub async fn error_message(resp: reqwest::Response) -> String {
    let body: serde_json::Value = resp.json().await.unwrap();
    body["error"].as_str().unwrap().to_string()
}
