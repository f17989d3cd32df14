use axum::http::{HeaderMap, header};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, AuthMode};
use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// The authenticated writer behind a request. Never persisted; every
/// request re-resolves its identity.
#[derive(Debug, Clone)]
pub struct Identity {
    pub device_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct DeviceClaims {
    sub: String,
    exp: usize,
    iat: usize,
}

/// How the write path establishes device identity. Selected once at
/// startup; the two variants are never mixed within a request.
#[derive(Clone)]
enum DeviceAuth {
    /// Shared secret in `x-api-key`; the payload names the device.
    ApiKey { device_key: String },
    /// HS256 bearer token whose `sub` names the device; the payload's
    /// `device_id` is ignored so a caller cannot write as someone else.
    Token { secret: String, ttl: Duration },
}

#[derive(Clone)]
pub struct Authenticator {
    dashboard_key: String,
    device_auth: DeviceAuth,
}

impl Authenticator {
    pub fn from_config(config: &AppConfig) -> Self {
        let device_auth = match config.auth_mode {
            AuthMode::ApiKey => DeviceAuth::ApiKey {
                device_key: config.device_api_key.clone(),
            },
            AuthMode::Token => DeviceAuth::Token {
                secret: config.jwt_secret.clone(),
                ttl: Duration::hours(config.token_ttl_hours),
            },
        };
        Self {
            dashboard_key: config.dashboard_api_key.clone(),
            device_auth,
        }
    }

    /// Issues a device token binding `device_id` as the subject. Fails
    /// with `InvalidInput` when the deployment does not use token auth.
    pub fn issue_device_token(&self, device_id: &str) -> Result<String, ApiError> {
        let DeviceAuth::Token { secret, ttl } = &self.device_auth else {
            return Err(ApiError::invalid("token auth disabled"));
        };
        let now = Utc::now();
        let claims = DeviceClaims {
            sub: device_id.to_string(),
            exp: (now + *ttl).timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("token encoding failed: {e}")))
    }

    /// Resolves the writer identity for an ingestion request. Every
    /// credential failure collapses to the same `Unauthorized`.
    pub fn authorize_device(
        &self,
        headers: &HeaderMap,
        payload_device_id: Option<&str>,
    ) -> Result<Identity, ApiError> {
        match &self.device_auth {
            DeviceAuth::ApiKey { device_key } => {
                require_api_key(headers, device_key)?;
                let device_id = payload_device_id
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| ApiError::invalid("missing device_id"))?;
                Ok(Identity {
                    device_id: device_id.to_string(),
                })
            }
            DeviceAuth::Token { secret, .. } => {
                let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
                let data = decode::<DeviceClaims>(
                    token,
                    &DecodingKey::from_secret(secret.as_bytes()),
                    &Validation::default(),
                )
                .map_err(|_| ApiError::Unauthorized)?;
                Ok(Identity {
                    device_id: data.claims.sub,
                })
            }
        }
    }

    /// Gates the read side (history, forecast, threshold). Always the
    /// static dashboard key, in either mode.
    pub fn authorize_dashboard(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        require_api_key(headers, &self.dashboard_key)
    }
}

fn require_api_key(headers: &HeaderMap, expected: &str) -> Result<(), ApiError> {
    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if presented == expected {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
