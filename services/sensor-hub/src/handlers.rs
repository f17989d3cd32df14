use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{Duration, SecondsFormat, Utc};
use serde_json::Value;

use crate::auth::Authenticator;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::forecast::{self, ForecastParams, Strategy};
use crate::store::SensorStore;
use crate::types::{
    DeviceAuthReq, DeviceAuthResp, IngestResp, PredictQuery, PredictResp, ReadingOut,
    ThresholdResp,
};

pub struct AppState {
    pub store: SensorStore,
    pub auth: Authenticator,
    pub config: AppConfig,
}

pub type SharedState = Arc<AppState>;

pub async fn healthz() -> Json<Value> {
    Json(serde_json::json!({"status": "ok"}))
}

// --- Token issuance (token mode only) ---

pub async fn device_login(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<DeviceAuthReq>,
) -> Result<Json<DeviceAuthResp>, ApiError> {
    let request_id = request_id(&headers);
    let device_id = req
        .device_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::invalid("missing device_id"))?;
    let access_token = state.auth.issue_device_token(device_id)?;
    tracing::info!(%request_id, device_id = %device_id, "device token issued");
    Ok(Json(DeviceAuthResp { access_token }))
}

// --- Ingestion ---

pub async fn ingest(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<IngestResp>), ApiError> {
    let request_id = request_id(&headers);
    let payload_device_id = body.get("device_id").and_then(Value::as_str);
    let identity = state.auth.authorize_device(&headers, payload_device_id)?;

    let temperature = require_number(&body, "temperature")?;
    let humidity = require_number(&body, "humidity")?;

    let reading = state
        .store
        .append_reading(&identity.device_id, temperature, humidity)?;
    let threshold = state.store.threshold()?;
    if breaches_threshold(reading.temperature, threshold) {
        tracing::warn!(
            %request_id,
            device_id = %reading.device_id,
            temperature = reading.temperature,
            threshold,
            "temperature alert: reading exceeds threshold"
        );
    }

    tracing::info!(
        %request_id,
        device_id = %reading.device_id,
        reading_id = reading.id,
        "reading stored"
    );
    Ok((StatusCode::CREATED, Json(IngestResp { status: "success" })))
}

/// Alert fires on strictly-greater only; a reading equal to the threshold
/// is quiet.
fn breaches_threshold(temperature: f64, threshold: f64) -> bool {
    temperature > threshold
}

// --- History ---

pub async fn get_readings(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ReadingOut>>, ApiError> {
    state.auth.authorize_dashboard(&headers)?;
    let offset = state.config.display_offset;
    let out = state
        .store
        .all_readings()?
        .into_iter()
        .map(|reading| ReadingOut {
            timestamp: reading
                .timestamp
                .with_timezone(&offset)
                .to_rfc3339_opts(SecondsFormat::Secs, false),
            temperature: reading.temperature,
            humidity: reading.humidity,
        })
        .collect();
    Ok(Json(out))
}

// --- Forecast ---

pub async fn predict(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<PredictQuery>,
) -> Result<Json<PredictResp>, ApiError> {
    state.auth.authorize_dashboard(&headers)?;

    let horizon_hours = match query.hours.as_deref() {
        None => 6,
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| ApiError::invalid("hours must be a non-negative integer"))?,
    };
    let strategy = match query.strategy.as_deref() {
        None => state.config.default_strategy,
        Some(raw) => {
            Strategy::parse(raw).ok_or_else(|| ApiError::invalid("unknown forecast strategy"))?
        }
    };

    let params = ForecastParams {
        window: Duration::hours(state.config.forecast_window_hours),
        horizon_hours,
        min_trend_samples: state.config.min_trend_samples,
        max_fit_points: state.config.max_fit_points,
    };
    let now = Utc::now();
    let readings = match strategy {
        // the baseline only ever needs the window
        Strategy::Window => state.store.readings_since(Some(now - params.window))?,
        Strategy::Trend => state.store.all_readings()?,
    };
    let forecast = forecast::predict(&readings, strategy, now, &params)?;

    let future_time = (now + Duration::hours(i64::from(horizon_hours)))
        .with_timezone(&state.config.display_offset)
        .to_rfc3339_opts(SecondsFormat::Secs, false);
    Ok(Json(PredictResp {
        prediction: forecast.prediction,
        data_points: forecast.data_points,
        strategy: forecast.strategy.as_str(),
        future_time,
    }))
}

// --- Threshold ---

pub async fn get_threshold(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<ThresholdResp>, ApiError> {
    state.auth.authorize_dashboard(&headers)?;
    let threshold = state.store.threshold()?;
    Ok(Json(ThresholdResp { threshold }))
}

pub async fn set_threshold(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<ThresholdResp>, ApiError> {
    state.auth.authorize_dashboard(&headers)?;
    let request_id = request_id(&headers);
    let value = require_number(&body, "temperature")?;
    let threshold = state.store.set_threshold(value)?;
    tracing::info!(%request_id, threshold, "alert threshold updated");
    Ok(Json(ThresholdResp { threshold }))
}

// --- Helpers ---

fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

/// Pulls a required numeric field out of a JSON body, collapsing both
/// "missing" and "wrong type" into one `InvalidInput`.
fn require_number(body: &Value, field: &str) -> Result<f64, ApiError> {
    body.get(field)
        .ok_or_else(|| ApiError::invalid(format!("missing {field}")))?
        .as_f64()
        .ok_or_else(|| ApiError::invalid(format!("{field} must be a number")))
}
