//! Connection to the licensing authority.
//!
//! The watcher and the reset flow talk to the authority only through
//! [`AuthorityClient`], so tests can script responses without a server.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tablepos_license::{
    ErrorBody, LicenseError, LicenseResult, LicenseStatusResponse, RedeemResetCodeRequest,
};
use tablepos_types::MachineId;
use tracing::debug;

/// Remote calls the client makes to the authority.
#[async_trait]
pub trait AuthorityClient: Send + Sync {
    /// Fetches activation and trial state for `machine_id`.
    async fn fetch_status(&self, machine_id: &MachineId) -> LicenseResult<LicenseStatusResponse>;

    /// Redeems a one-time reset code. Succeeds at most once per code.
    async fn redeem_reset_code(&self, machine_id: &MachineId, code: &str) -> LicenseResult<()>;
}

/// [`AuthorityClient`] over HTTP.
///
/// Network failures, timeouts and 5xx responses all come back as
/// [`LicenseError::Unreachable`].
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    base_url: String,
    client: Client,
}

impl HttpAuthority {
    /// Creates a client for the authority at `base_url` (e.g. `https://license.example.com`).
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> LicenseResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LicenseError::InvalidArgument(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn unreachable(err: &reqwest::Error) -> LicenseError {
    if err.is_timeout() {
        LicenseError::Unreachable("request timed out".to_string())
    } else {
        LicenseError::Unreachable(err.to_string())
    }
}

/// Maps a non-success response to the error the authority meant.
async fn error_from_response(response: reqwest::Response) -> LicenseError {
    let status = response.status();
    if status.is_server_error() {
        return LicenseError::Unreachable(format!("authority returned {status}"));
    }
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    match status {
        StatusCode::BAD_REQUEST => LicenseError::InvalidArgument(message),
        StatusCode::UNAUTHORIZED => LicenseError::InvalidCode,
        StatusCode::NOT_FOUND => LicenseError::NotFound(message),
        StatusCode::CONFLICT => LicenseError::InvalidState(message),
        StatusCode::GONE => LicenseError::Expired,
        _ => LicenseError::Unreachable(format!("unexpected status {status}: {message}")),
    }
}

#[async_trait]
impl AuthorityClient for HttpAuthority {
    async fn fetch_status(&self, machine_id: &MachineId) -> LicenseResult<LicenseStatusResponse> {
        let url = format!("{}/api/v1/license/{}", self.base_url, machine_id);
        debug!(url = %url, "fetching license status");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unreachable(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body = response.text().await.map_err(|e| unreachable(&e))?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn redeem_reset_code(&self, machine_id: &MachineId, code: &str) -> LicenseResult<()> {
        let url = format!("{}/api/v1/reset-codes/redeem", self.base_url);
        let request = RedeemResetCodeRequest {
            machine_id: machine_id.clone(),
            code: code.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| unreachable(&e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }
}
