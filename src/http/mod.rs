mod error;
mod validate;

use std::collections::HashMap;

use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::analytics::{DailyAnalytics, HourlyPattern, WeeklySummary};
use crate::app::{AlertsPage, AppContext, IngestOutcome, ReadingsPage};
use crate::config::HttpConfig;
use crate::conservation::{ConservationReport, ReportPeriod};
use crate::controls::ControlState;
use crate::dashboard::LiveDashboard;
use crate::forecasting::ShortagePrediction;
use crate::query::{DayWindow, Limit};
use crate::state::format_timestamp;

pub use error::ApiError;
pub use validate::validate_reading;

type Params = Query<HashMap<String, String>>;

pub fn create_router(ctx: AppContext) -> Router {
    let cors = cors_layer(&ctx.config.http);

    let api = Router::new()
        .route("/health", get(get_health))
        .route("/sensors/ingest", post(post_ingest))
        .route("/sensors/latest", get(get_latest))
        .route("/dashboard/live", get(get_live_dashboard))
        .route("/analytics/daily", get(get_daily_analytics))
        .route("/analytics/weekly", get(get_weekly_summary))
        .route("/analytics/hourly-pattern", get(get_hourly_pattern))
        .route("/alerts", get(get_alerts))
        .route("/predictions/water-shortage", get(get_shortage_prediction))
        .route("/controls/state", get(get_control_state))
        .route("/controls/pump/:pump_id", post(post_pump))
        .route("/controls/valve/:valve_id", post(post_valve))
        .route("/controls/auto-mode", post(post_auto_mode))
        .route("/reports/conservation", get(get_conservation_report));

    Router::new()
        .route("/health", get(get_health))
        .route("/metrics", get(get_metrics))
        .nest("/api/v1", api)
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

fn cors_layer(config: &HttpConfig) -> CorsLayer {
    let origin = if config.cors_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(origin = %origin, error = %err, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

async fn not_found() -> ApiError {
    ApiError::not_found()
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: String,
}

async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: format_timestamp(Utc::now()),
    })
}

async fn get_metrics(State(ctx): State<AppContext>) -> Response {
    match ctx.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            warn!(error = ?err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn post_ingest(
    State(ctx): State<AppContext>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestOutcome>), ApiError> {
    let Json(body) = body.map_err(|_| ApiError::validation("Request body must be valid JSON"))?;
    let reading = validate_reading(&body, Utc::now())?;
    let outcome = ctx.ingest_reading(reading).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn get_latest(State(ctx): State<AppContext>, Query(params): Params) -> Json<ReadingsPage> {
    let limit = Limit::parse_or(
        params.get("limit").map(String::as_str),
        Limit::READINGS_DEFAULT,
    );
    Json(ctx.latest(limit).await)
}

async fn get_live_dashboard(State(ctx): State<AppContext>) -> Json<LiveDashboard> {
    Json(ctx.live_dashboard().await)
}

async fn get_daily_analytics(
    State(ctx): State<AppContext>,
    Query(params): Params,
) -> Json<DailyAnalytics> {
    let window = DayWindow::parse(params.get("days").map(String::as_str));
    Json(ctx.daily_analytics(window).await)
}

async fn get_weekly_summary(State(ctx): State<AppContext>) -> Json<WeeklySummary> {
    Json(ctx.weekly_summary().await)
}

async fn get_hourly_pattern(State(ctx): State<AppContext>) -> Json<HourlyPattern> {
    Json(ctx.hourly_pattern().await)
}

async fn get_alerts(State(ctx): State<AppContext>, Query(params): Params) -> Json<AlertsPage> {
    let limit = Limit::parse_or(params.get("limit").map(String::as_str), Limit::ALERTS_DEFAULT);
    let active_only = params
        .get("active_only")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    Json(ctx.alerts(limit, active_only).await)
}

async fn get_shortage_prediction(State(ctx): State<AppContext>) -> Json<ShortagePrediction> {
    Json(ctx.predict_shortage().await)
}

#[derive(Serialize)]
struct ControlStateResponse {
    controls: ControlState,
    timestamp: String,
}

async fn get_control_state(State(ctx): State<AppContext>) -> Json<ControlStateResponse> {
    Json(ControlStateResponse {
        controls: ctx.controls.snapshot().await,
        timestamp: format_timestamp(Utc::now()),
    })
}

fn requested_state(body: Result<Json<Value>, JsonRejection>) -> Result<bool, ApiError> {
    let missing = || ApiError::invalid_field("state", "Request must include 'state' field");
    let Json(body) = body.map_err(|_| missing())?;
    match body.get("state") {
        Some(Value::Bool(state)) => Ok(*state),
        Some(_) => Err(ApiError::invalid_field("state", "state must be a boolean")),
        None => Err(missing()),
    }
}

#[derive(Serialize)]
struct ActuatorResponse {
    success: bool,
    #[serde(flatten)]
    id: ActuatorId,
    state: bool,
    message: String,
    timestamp: String,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ActuatorId {
    Pump { pump_id: String },
    Valve { valve_id: String },
}

async fn post_pump(
    State(ctx): State<AppContext>,
    Path(pump_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ActuatorResponse>, ApiError> {
    let state = requested_state(body)?;
    ctx.controls.set_pump(&pump_id, state).await?;
    let label = if state { "ON" } else { "OFF" };
    info!(pump_id = %pump_id, state = label, "pump switched");
    Ok(Json(ActuatorResponse {
        success: true,
        message: format!("Pump {pump_id} turned {label}"),
        id: ActuatorId::Pump { pump_id },
        state,
        timestamp: format_timestamp(Utc::now()),
    }))
}

async fn post_valve(
    State(ctx): State<AppContext>,
    Path(valve_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ActuatorResponse>, ApiError> {
    let state = requested_state(body)?;
    ctx.controls.set_valve(&valve_id, state).await?;
    let label = if state { "OPENED" } else { "CLOSED" };
    info!(valve_id = %valve_id, state = label, "valve switched");
    Ok(Json(ActuatorResponse {
        success: true,
        message: format!("Valve {valve_id} {label}"),
        id: ActuatorId::Valve { valve_id },
        state,
        timestamp: format_timestamp(Utc::now()),
    }))
}

#[derive(Serialize)]
struct AutoModeResponse {
    success: bool,
    auto_mode: bool,
    message: String,
    timestamp: String,
}

async fn post_auto_mode(
    State(ctx): State<AppContext>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<AutoModeResponse>, ApiError> {
    let state = requested_state(body)?;
    ctx.controls.set_auto_mode(state).await;
    let label = if state { "enabled" } else { "disabled" };
    info!(auto_mode = state, "auto mode switched");
    Ok(Json(AutoModeResponse {
        success: true,
        auto_mode: state,
        message: format!("Auto mode {label}"),
        timestamp: format_timestamp(Utc::now()),
    }))
}

async fn get_conservation_report(
    State(ctx): State<AppContext>,
    Query(params): Params,
) -> Json<ConservationReport> {
    let period = ReportPeriod::parse(params.get("period").map(String::as_str));
    Json(ctx.conservation_report(period).await)
}
