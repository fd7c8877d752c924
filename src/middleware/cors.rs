use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::{
    context::RequestContext,
    error::GatewayResult,
    middleware::{ControlFlow, GatewayMiddleware},
};

const ALLOW_METHODS: &str = "GET, OPTIONS";
const ALLOW_HEADERS: &str = "content-type, x-request-id";
const EXPOSE_HEADERS: &str = "x-cache, x-request-id, x-ratelimit-remaining, retry-after";
const MAX_AGE_SECS: &str = "86400";

/// Answers preflight requests before they reach the limiter and decorates
/// every other response with the allow-origin headers.
pub struct CorsMiddleware {
    allow_origin: HeaderValue,
}

impl CorsMiddleware {
    pub fn new(allow_origin: &str) -> Self {
        let allow_origin =
            HeaderValue::from_str(allow_origin).unwrap_or_else(|_| HeaderValue::from_static("*"));
        Self { allow_origin }
    }
}

#[async_trait]
impl GatewayMiddleware for CorsMiddleware {
    fn name(&self) -> &'static str {
        "cors"
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> GatewayResult<ControlFlow> {
        if ctx.method != Method::OPTIONS {
            return Ok(ControlFlow::Continue);
        }

        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE_SECS));

        Ok(ControlFlow::ShortCircuit(response))
    }

    async fn on_response(
        &self,
        _ctx: &RequestContext,
        response: &mut Response<Body>,
    ) -> GatewayResult<()> {
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(EXPOSE_HEADERS),
        );
        Ok(())
    }
}
