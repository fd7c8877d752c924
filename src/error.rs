use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::provider::ProviderError;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },
    #[error("weather service temporarily unavailable")]
    UpstreamTransient,
    #[error("weather service returned an unreadable response")]
    UpstreamMalformed,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    message: String,
    timestamp: DateTime<Utc>,
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::UpstreamTransient => "upstream_unavailable",
            Self::UpstreamMalformed => "upstream_malformed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamTransient | Self::UpstreamMalformed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Maps a provider failure for `location` onto the client-facing taxonomy.
    pub fn from_provider(err: ProviderError, location: &str) -> Self {
        match err {
            ProviderError::NotFound => Self::NotFound(format!("Location '{location}' not found")),
            ProviderError::Transient(_) => Self::UpstreamTransient,
            ProviderError::Malformed(_) => Self::UpstreamMalformed,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let mut response = (
            status,
            Json(ErrorBody {
                success: false,
                error: self.code(),
                message,
                timestamp: Utc::now(),
            }),
        )
            .into_response();

        if let Self::RateLimited { retry_after_secs } = self
            && let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, v);
        }

        response
    }
}
