use std::path::PathBuf;

use chrono::FixedOffset;

/// Reads an env var, falling back to `default` when unset or blank.
pub fn read_env(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

pub fn read_env_optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    read_env_optional(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// How device (write-path) identity is established. Fixed at startup,
/// never mixed within a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    ApiKey,
    Token,
}

impl AuthMode {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "api-key" => Some(Self::ApiKey),
            "token" => Some(Self::Token),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub auth_mode: AuthMode,
    pub device_api_key: String,
    pub dashboard_api_key: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub default_threshold: f64,
    /// Boundary-only display conversion for `GET /data`; storage stays UTC.
    pub display_offset: FixedOffset,
    pub forecast_window_hours: i64,
    pub default_strategy: crate::forecast::Strategy,
    pub min_trend_samples: usize,
    pub max_fit_points: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let auth_mode = AuthMode::parse(&read_env("AUTH_MODE", "api-key")).unwrap_or_else(|| {
            tracing::warn!("unknown AUTH_MODE, falling back to api-key");
            AuthMode::ApiKey
        });
        let default_strategy = crate::forecast::Strategy::parse(&read_env(
            "FORECAST_STRATEGY",
            "window",
        ))
        .unwrap_or_else(|| {
            tracing::warn!("unknown FORECAST_STRATEGY, falling back to window");
            crate::forecast::Strategy::Window
        });
        Self {
            db_path: PathBuf::from(read_env("SENSOR_HUB_DB_PATH", "sensor_data.db")),
            auth_mode,
            device_api_key: read_env("DEVICE_API_KEY", "device-dev-secret"),
            dashboard_api_key: read_env("DASHBOARD_API_KEY", "dashboard-dev-secret"),
            jwt_secret: read_env("JWT_SECRET_KEY", "super-secret"),
            token_ttl_hours: read_env_parsed("TOKEN_TTL_HOURS", 1),
            default_threshold: read_env_parsed("TEMP_THRESHOLD_DEFAULT", 30.0),
            display_offset: display_offset_from_hours(read_env_parsed(
                "DISPLAY_UTC_OFFSET_HOURS",
                8,
            )),
            forecast_window_hours: read_env_parsed("FORECAST_WINDOW_HOURS", 6),
            default_strategy,
            min_trend_samples: read_env_parsed("FORECAST_MIN_SAMPLES", 10),
            max_fit_points: read_env_parsed("FORECAST_MAX_FIT_POINTS", 10_000),
        }
    }
}

fn display_offset_from_hours(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| {
        tracing::warn!(hours, "invalid DISPLAY_UTC_OFFSET_HOURS, using UTC");
        FixedOffset::east_opt(0).expect("zero offset is valid")
    })
}
