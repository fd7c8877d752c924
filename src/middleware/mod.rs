pub mod cors;
pub mod logging;
pub mod rate_limit;

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::{
    config::GatewayConfig,
    context::RequestContext,
    error::GatewayResult,
    middleware::{
        cors::CorsMiddleware, logging::RequestLoggingMiddleware, rate_limit::RateLimitMiddleware,
    },
    ratelimit::FixedWindowLimiter,
    store::KeyValueStore,
};

pub enum ControlFlow {
    Continue,
    ShortCircuit(Response<Body>),
}

#[async_trait]
pub trait GatewayMiddleware: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_request(&self, ctx: &mut RequestContext) -> GatewayResult<ControlFlow>;

    async fn on_response(
        &self,
        _ctx: &RequestContext,
        _response: &mut Response<Body>,
    ) -> GatewayResult<()> {
        Ok(())
    }
}

/// Ordered middleware chain run around the router. Response hooks run in
/// reverse order, and only for middlewares whose request hook continued.
pub struct Pipeline {
    middlewares: Vec<Arc<dyn GatewayMiddleware>>,
}

impl Pipeline {
    pub fn new(middlewares: Vec<Arc<dyn GatewayMiddleware>>) -> Self {
        Self { middlewares }
    }

    pub fn from_config(config: &GatewayConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let mut middlewares: Vec<Arc<dyn GatewayMiddleware>> = vec![
            Arc::new(RequestLoggingMiddleware),
            Arc::new(CorsMiddleware::new(&config.cors_allow_origin)),
        ];

        if config.rate_limit.enabled {
            let limiter = FixedWindowLimiter::new(
                store,
                config.rate_limit.limit,
                config.rate_limit.window,
            );
            middlewares.push(Arc::new(RateLimitMiddleware::new(
                limiter,
                config.rate_limit.exempt_prefixes.clone(),
            )));
        } else {
            tracing::info!("rate limiting disabled by configuration");
        }

        Self::new(middlewares)
    }

    async fn apply_response_middlewares(
        &self,
        executed: &[usize],
        ctx: &RequestContext,
        response: &mut Response<Body>,
    ) {
        for idx in executed.iter().rev() {
            let middleware = &self.middlewares[*idx];
            if let Err(err) = middleware.on_response(ctx, response).await {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    middleware = middleware.name(),
                    error = %err,
                    "middleware post-response hook failed"
                );
            }
        }
    }

    async fn finish(&self, executed: &[usize], ctx: &RequestContext, response: &mut Response<Body>) {
        self.apply_response_middlewares(executed, ctx, response).await;
        attach_hardening_headers(&ctx.request_id, response);
    }
}

/// Entry point for `axum::middleware::from_fn_with_state`.
pub async fn run(State(pipeline): State<Arc<Pipeline>>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut ctx = RequestContext::new(
        request_id,
        request.method().clone(),
        request.uri().clone(),
        request.headers(),
        peer,
    );

    let mut executed = Vec::with_capacity(pipeline.middlewares.len());

    for (idx, middleware) in pipeline.middlewares.iter().enumerate() {
        match middleware.on_request(&mut ctx).await {
            Ok(ControlFlow::Continue) => executed.push(idx),
            Ok(ControlFlow::ShortCircuit(mut response)) => {
                pipeline.finish(&executed, &ctx, &mut response).await;
                return response;
            }
            Err(err) => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    middleware = middleware.name(),
                    error = %err,
                    "middleware rejected request"
                );
                let mut response = err.into_response();
                pipeline.finish(&executed, &ctx, &mut response).await;
                return response;
            }
        }
    }

    let mut response = next.run(request).await;
    pipeline.finish(&executed, &ctx, &mut response).await;
    response
}

fn attach_hardening_headers(request_id: &str, response: &mut Response<Body>) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-request-id"), value);
    }

    response.headers_mut().insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    response.headers_mut().insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    response.headers_mut().insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
}
