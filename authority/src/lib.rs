//! HTTP API for the TablePOS licensing authority.
//!
//! All licensing state lives in the [`LicenseStore`] behind the services in
//! [`AppState`]; handlers only decode requests, run the blocking store work
//! off the async runtime, and map [`LicenseError`] to a status code with an
//! `{"error": ...}` body.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tablepos_license::codec::constant_time_eq;
use tablepos_license::{
    derive_serial_code, derive_unlock_code, ActivateRequest, ActivationRecord, ActivationService,
    AdminMutationApi, AdminRequest, AdminResponse, ErrorBody, IssueResetCodeRequest,
    LicenseConfig, LicenseError, LicenseResult, LicenseStatusResponse, LicenseStore,
    RedeemResetCodeRequest, ResetCode, ResetCodeService, StartTrialRequest, SupportCodes,
    TrialEngine, TrialView, GENERIC_CODE_REJECTION,
};
use tablepos_types::{Clock, MachineId};
use tracing::{debug, error, warn};

/// Services and secrets shared by every request.
pub struct AppState {
    engine: TrialEngine,
    admin: AdminMutationApi,
    activations: ActivationService,
    resets: ResetCodeService,
    config: LicenseConfig,
    admin_token: String,
}

impl AppState {
    /// Wires the licensing services over one store and clock.
    ///
    /// Fails if `admin_token` is blank.
    pub fn new(
        store: Arc<dyn LicenseStore>,
        clock: Arc<dyn Clock>,
        config: LicenseConfig,
        admin_token: impl Into<String>,
    ) -> LicenseResult<Self> {
        let admin_token = admin_token.into();
        if admin_token.trim().is_empty() {
            return Err(LicenseError::InvalidArgument(
                "admin token must not be empty".to_string(),
            ));
        }
        let engine = TrialEngine::new(Arc::clone(&store), Arc::clone(&clock), config.policy().clone());
        Ok(Self {
            admin: AdminMutationApi::new(engine.clone(), Arc::clone(&clock)),
            activations: ActivationService::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                config.serial_secret().clone(),
            ),
            resets: ResetCodeService::new(store, clock, config.unlock_secret().clone()),
            engine,
            config,
            admin_token,
        })
    }

    fn authorize_admin(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let provided = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        match provided {
            Some(token) if constant_time_eq(token.trim(), &self.admin_token) => Ok(()),
            Some(_) => {
                warn!("admin request with wrong token");
                Err(ApiError::unauthorized())
            }
            None => Err(ApiError::unauthorized()),
        }
    }
}

/// A status code plus the message for the `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    /// Same answer for every failed code check, whatever the cause.
    fn code_rejected() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, GENERIC_CODE_REJECTION)
    }
}

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %err, "request failed");
            return Self::new(status, "internal error");
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody::new(self.message))).into_response()
    }
}

/// Runs store work on the blocking pool.
async fn blocking<T, F>(work: F) -> LicenseResult<T>
where
    F: FnOnce() -> LicenseResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| LicenseError::Storage(format!("store task failed: {e}")))?
}

fn parse_machine_id(raw: &str) -> Result<MachineId, ApiError> {
    MachineId::parse(raw).map_err(|e| ApiError::from(LicenseError::from(e)))
}

// ── Public endpoints ──

async fn license_status(
    State(state): State<Arc<AppState>>,
    Path(machine_id): Path<String>,
) -> Result<Json<LicenseStatusResponse>, ApiError> {
    let machine_id = parse_machine_id(&machine_id)?;
    let status = blocking(move || state.engine.license_status(&machine_id)).await?;
    Ok(Json(status))
}

async fn start_trial(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StartTrialRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TrialView>), ApiError> {
    let Json(request) = payload?;
    let record = blocking(move || state.engine.start(&request.machine_id)).await?;
    Ok((StatusCode::CREATED, Json(TrialView::at(&record, record.started_at))))
}

async fn activate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ActivateRequest>, JsonRejection>,
) -> Result<Json<ActivationRecord>, ApiError> {
    let Json(request) = payload?;
    let record =
        blocking(move || state.activations.activate(&request.machine_id, &request.serial)).await?;
    Ok(Json(record))
}

/// Accepts either the machine's unlock code or an unused one-time code.
async fn redeem_reset_code(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RedeemResetCodeRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = payload?;
    let result =
        blocking(move || state.resets.authorize(&request.machine_id, &request.code)).await;

    match result {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) if e.is_code_rejection() => Err(ApiError::code_rejected()),
        Err(e) => Err(e.into()),
    }
}

// ── Admin endpoints ──

async fn admin_trial(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<AdminRequest>, JsonRejection>,
) -> Result<Json<AdminResponse>, ApiError> {
    state.authorize_admin(&headers)?;
    let Json(request) = payload?;
    debug!(action = ?request.action, "admin trial mutation");
    let response = blocking(move || state.admin.handle(&request)).await?;
    Ok(Json(response))
}

async fn issue_reset_code(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<IssueResetCodeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ResetCode>), ApiError> {
    state.authorize_admin(&headers)?;
    let Json(request) = payload?;
    let code = blocking(move || state.resets.issue(&request.machine_id)).await?;
    Ok((StatusCode::CREATED, Json(code)))
}

async fn support_codes(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(machine_id): Path<String>,
) -> Result<Json<SupportCodes>, ApiError> {
    state.authorize_admin(&headers)?;
    let machine_id = parse_machine_id(&machine_id)?;
    let serial_code = derive_serial_code(&machine_id, state.config.serial_secret())?;
    let unlock_code = derive_unlock_code(&machine_id, state.config.unlock_secret())?;
    Ok(Json(SupportCodes {
        machine_id,
        serial_code,
        unlock_code,
    }))
}

/// Build the HTTP API router over the given state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/license/{machine_id}", get(license_status))
        .route("/api/v1/trial/start", post(start_trial))
        .route("/api/v1/activate", post(activate))
        .route("/api/v1/reset-codes/redeem", post(redeem_reset_code))
        .route("/api/v1/admin/trial", post(admin_trial))
        .route("/api/v1/admin/reset-codes", post(issue_reset_code))
        .route("/api/v1/admin/codes/{machine_id}", get(support_codes))
        .with_state(state)
}
