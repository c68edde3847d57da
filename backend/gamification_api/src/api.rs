//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gamification_engine::{Action, EngineError, Period};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ApiError;
use crate::service::SnapshotService;

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<SnapshotService>,
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ConsumptionRequest {
    pub period: String,
    pub usage: f64,
}

#[derive(Deserialize)]
pub struct RedeemRequest {
    pub period: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// `true` when the error is informational rather than a failure.
    pub info: bool,
}

/// Status code for an error surfaced to the shell.
pub fn status_for(err: &ApiError) -> StatusCode {
    match err {
        ApiError::Engine(EngineError::NoCreditsAvailable) => StatusCode::CONFLICT,
        ApiError::Engine(e) if e.is_invalid_input() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: ApiError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!("Request failed: {err}");
    }
    let (error, info) = match &err {
        ApiError::Engine(EngineError::NoCreditsAvailable) => {
            ("No discounts available right now.".to_string(), true)
        }
        other => (other.to_string(), false),
    };
    (status, Json(ErrorResponse { error, info })).into_response()
}

/// Run `action` and answer with the refreshed dashboard.
async fn run(state: &ApiState, action: Action) -> Response {
    match state.service.apply(action).await {
        Ok(_) => {
            let view = state.service.dashboard(None).await;
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(e) => error_response(e),
    }
}

fn parse_period(raw: String) -> Result<Period, Response> {
    Period::new(raw).map_err(|e| error_response(e.into()))
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /dashboard`
///
/// Returns the full view for the current period.
pub async fn get_dashboard(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.service.dashboard(None).await)
}

/// `POST /consumption`
///
/// Records (or replaces) a monthly usage report and re-checks challenges
/// for that month.
pub async fn record_consumption(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<ConsumptionRequest>,
) -> Response {
    let period = match parse_period(body.period) {
        Ok(period) => period,
        Err(response) => return response,
    };
    run(
        &state,
        Action::RecordConsumption {
            period,
            usage: body.usage,
        },
    )
    .await
}

/// `POST /invoices/pay`
pub async fn pay_invoice(State(state): State<Arc<ApiState>>) -> Response {
    run(&state, Action::PayInvoice).await
}

/// `POST /referrals/share`
pub async fn share_code(State(state): State<Arc<ApiState>>) -> Response {
    let period = state.service.current_period();
    run(&state, Action::ShareCode { period }).await
}

/// `POST /challenges/:id/enroll`
///
/// Joins the challenge for the current month.
pub async fn enroll_challenge(
    State(state): State<Arc<ApiState>>,
    Path(challenge_id): Path<String>,
) -> Response {
    let period = state.service.current_period();
    run(
        &state,
        Action::EnrollChallenge {
            challenge_id,
            period,
        },
    )
    .await
}

/// `POST /challenges/refresh`
pub async fn refresh(State(state): State<Arc<ApiState>>) -> Response {
    let period = state.service.current_period();
    run(&state, Action::Refresh { period }).await
}

/// `POST /discounts/redeem`
pub async fn redeem_discount(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<RedeemRequest>,
) -> Response {
    let period = match parse_period(body.period) {
        Ok(period) => period,
        Err(response) => return response,
    };
    run(&state, Action::RedeemDiscount { period }).await
}
