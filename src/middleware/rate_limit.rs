use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};

use crate::{
    context::RequestContext,
    error::{GatewayError, GatewayResult},
    middleware::{ControlFlow, GatewayMiddleware},
    ratelimit::FixedWindowLimiter,
};

const REMAINING_KEY: &str = "ratelimit.remaining";

pub struct RateLimitMiddleware {
    limiter: FixedWindowLimiter,
    exempt_prefixes: Vec<String>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: FixedWindowLimiter, exempt_prefixes: Vec<String>) -> Self {
        Self {
            limiter,
            exempt_prefixes,
        }
    }

    fn is_exempt(&self, path: &str) -> bool {
        self.exempt_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

#[async_trait]
impl GatewayMiddleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> GatewayResult<ControlFlow> {
        if self.is_exempt(ctx.uri.path()) {
            return Ok(ControlFlow::Continue);
        }

        let decision = self.limiter.check(&ctx.client).await;

        if !decision.degraded {
            ctx.metadata
                .insert(REMAINING_KEY.to_string(), decision.remaining.to_string());
        }

        if decision.allowed {
            return Ok(ControlFlow::Continue);
        }

        tracing::info!(
            request_id = %ctx.request_id,
            client = %ctx.client,
            retry_after_secs = decision.retry_after_secs,
            "rate limit exceeded"
        );
        Ok(ControlFlow::ShortCircuit(
            GatewayError::RateLimited {
                retry_after_secs: decision.retry_after_secs,
            }
            .into_response(),
        ))
    }

    async fn on_response(
        &self,
        ctx: &RequestContext,
        response: &mut Response<Body>,
    ) -> GatewayResult<()> {
        if let Some(remaining) = ctx.metadata.get(REMAINING_KEY)
            && let Ok(value) = HeaderValue::from_str(remaining)
        {
            response
                .headers_mut()
                .insert(HeaderName::from_static("x-ratelimit-remaining"), value);
        }

        Ok(())
    }
}
