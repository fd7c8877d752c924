use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    cache::Cached,
    error::{GatewayError, GatewayResult},
    gateway::WeatherGateway,
    middleware::{self, Pipeline},
    models::{ApiResponse, LocationQuery, UnitSystem},
};

#[derive(Debug, Default, Deserialize)]
pub struct UnitsParams {
    units: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CoordinateParams {
    lat: Option<String>,
    lon: Option<String>,
    units: Option<String>,
}

impl CoordinateParams {
    fn resolve(&self) -> GatewayResult<(LocationQuery, UnitSystem)> {
        let location = LocationQuery::parse_coordinates(self.lat.as_deref(), self.lon.as_deref())?;
        Ok((location, UnitSystem::parse_lenient(self.units.as_deref())))
    }
}

fn city_request(city: &str, params: &UnitsParams) -> GatewayResult<(LocationQuery, UnitSystem)> {
    let location = LocationQuery::city(city)?;
    Ok((location, UnitSystem::parse_lenient(params.units.as_deref())))
}

pub fn router(gateway: Arc<WeatherGateway>, pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/api/weather/{city}", get(weather_by_city))
        .route("/api/forecast/{city}", get(forecast_by_city))
        .route("/api/alerts/{city}", get(alerts_by_city))
        .route("/api/stats/{city}", get(stats_by_city))
        .route("/api/weather-coords", get(weather_by_coords))
        .route("/api/forecast-coords", get(forecast_by_coords))
        .route("/api/alerts-coords", get(alerts_by_coords))
        .route("/api/health", get(health))
        .fallback(route_not_found)
        .with_state(gateway)
        .layer(axum::middleware::from_fn_with_state(pipeline, middleware::run))
}

/// Wraps a gateway result in the response envelope and marks its cache origin.
fn cached_response<T: Serialize>(cached: Cached<T>) -> Response {
    let (message, marker) = if cached.from_cache() {
        ("From cache", "HIT")
    } else {
        ("Success", "MISS")
    };

    let mut response = Json(ApiResponse::ok(cached.value, message)).into_response();
    response
        .headers_mut()
        .insert(HeaderName::from_static("x-cache"), HeaderValue::from_static(marker));
    response
}

async fn weather_by_city(
    State(gateway): State<Arc<WeatherGateway>>,
    Path(city): Path<String>,
    Query(params): Query<UnitsParams>,
) -> GatewayResult<Response> {
    let (location, units) = city_request(&city, &params)?;
    Ok(cached_response(gateway.current(&location, units).await?))
}

async fn forecast_by_city(
    State(gateway): State<Arc<WeatherGateway>>,
    Path(city): Path<String>,
    Query(params): Query<UnitsParams>,
) -> GatewayResult<Response> {
    let (location, units) = city_request(&city, &params)?;
    Ok(cached_response(gateway.forecast(&location, units).await?))
}

async fn alerts_by_city(
    State(gateway): State<Arc<WeatherGateway>>,
    Path(city): Path<String>,
    Query(params): Query<UnitsParams>,
) -> GatewayResult<Response> {
    let (location, units) = city_request(&city, &params)?;
    Ok(cached_response(gateway.alerts(&location, units).await?))
}

async fn stats_by_city(
    State(gateway): State<Arc<WeatherGateway>>,
    Path(city): Path<String>,
    Query(params): Query<UnitsParams>,
) -> GatewayResult<Response> {
    let (location, units) = city_request(&city, &params)?;
    Ok(cached_response(gateway.stats(&location, units).await?))
}

async fn weather_by_coords(
    State(gateway): State<Arc<WeatherGateway>>,
    Query(params): Query<CoordinateParams>,
) -> GatewayResult<Response> {
    let (location, units) = params.resolve()?;
    Ok(cached_response(gateway.current(&location, units).await?))
}

async fn forecast_by_coords(
    State(gateway): State<Arc<WeatherGateway>>,
    Query(params): Query<CoordinateParams>,
) -> GatewayResult<Response> {
    let (location, units) = params.resolve()?;
    Ok(cached_response(gateway.forecast(&location, units).await?))
}

async fn alerts_by_coords(
    State(gateway): State<Arc<WeatherGateway>>,
    Query(params): Query<CoordinateParams>,
) -> GatewayResult<Response> {
    let (location, units) = params.resolve()?;
    Ok(cached_response(gateway.alerts(&location, units).await?))
}

async fn health(State(gateway): State<Arc<WeatherGateway>>) -> Response {
    let report = gateway.health().await;
    let (status, message) = if report.healthy {
        (StatusCode::OK, "Healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Degraded")
    };

    let body = ApiResponse {
        success: report.healthy,
        message: message.to_string(),
        data: Some(report),
        timestamp: Utc::now(),
    };
    (status, Json(body)).into_response()
}

async fn route_not_found() -> GatewayError {
    GatewayError::NotFound("Route not found".to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, header},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        alerts::AlertThresholds,
        config::CacheTtls,
        middleware::{
            GatewayMiddleware, cors::CorsMiddleware, logging::RequestLoggingMiddleware,
            rate_limit::RateLimitMiddleware,
        },
        ratelimit::FixedWindowLimiter,
        store::{KeyValueStore, memory::MemoryStore},
        testing::{FailingStore, StubFailure, StubProvider},
    };

    fn app_with(provider: StubProvider, store: Arc<dyn KeyValueStore>, limit: u64) -> Router {
        let gateway = Arc::new(WeatherGateway::new(
            Arc::new(provider),
            store.clone(),
            CacheTtls::default(),
            AlertThresholds::default(),
        ));
        let middlewares: Vec<Arc<dyn GatewayMiddleware>> = vec![
            Arc::new(RequestLoggingMiddleware),
            Arc::new(CorsMiddleware::new("*")),
            Arc::new(RateLimitMiddleware::new(
                FixedWindowLimiter::new(store, limit, Duration::from_secs(10)),
                vec!["/api/health".to_string()],
            )),
        ];
        router(gateway, Arc::new(Pipeline::new(middlewares)))
    }

    fn app() -> Router {
        app_with(StubProvider::mild(), Arc::new(MemoryStore::new()), 100)
    }

    fn get(uri: &str, client: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn weather_by_city_marks_miss_then_hit() {
        let app = app();

        let first = app.clone().oneshot(get("/api/weather/Lima", "203.0.113.1")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()["x-cache"], "MISS");
        assert_eq!(first.headers()["x-content-type-options"], "nosniff");
        assert!(first.headers().contains_key("x-request-id"));
        let body = json_body(first).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Success");
        assert_eq!(body["data"]["location"], "Lima");
        assert_eq!(body["data"]["windSpeed"], 10.0);

        let second = app.oneshot(get("/api/weather/lima", "203.0.113.1")).await.unwrap();
        assert_eq!(second.headers()["x-cache"], "HIT");
        assert_eq!(json_body(second).await["message"], "From cache");
    }

    #[tokio::test]
    async fn request_id_is_echoed() {
        let request = Request::builder()
            .uri("/api/forecast/Lima?units=imperial")
            .header("x-request-id", "req-42")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "req-42");
    }

    #[tokio::test]
    async fn limit_plus_one_is_rejected_with_retry_after() {
        let app = app_with(StubProvider::mild(), Arc::new(MemoryStore::new()), 3);

        for remaining in ["2", "1", "0"] {
            let response = app.clone().oneshot(get("/api/weather/Lima", "198.51.100.7")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["x-ratelimit-remaining"], remaining);
        }

        let rejected = app.clone().oneshot(get("/api/weather/Lima", "198.51.100.7")).await.unwrap();
        assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(rejected.headers()[header::RETRY_AFTER], "10");
        assert_eq!(rejected.headers()["access-control-allow-origin"], "*");
        let body = json_body(rejected).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "rate_limited");

        let other_client = app.oneshot(get("/api/weather/Lima", "198.51.100.8")).await.unwrap();
        assert_eq!(other_client.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_is_not_throttled() {
        let app = app_with(StubProvider::mild(), Arc::new(MemoryStore::new()), 1);

        for _ in 0..3 {
            let response = app.clone().oneshot(get("/api/health", "192.0.2.1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(!response.headers().contains_key("x-ratelimit-remaining"));
        }
    }

    #[tokio::test]
    async fn unavailable_store_fails_open() {
        let app = app_with(StubProvider::mild(), Arc::new(FailingStore), 1);

        for _ in 0..4 {
            let response = app.clone().oneshot(get("/api/weather/Lima", "192.0.2.9")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["x-cache"], "MISS");
        }
    }

    #[tokio::test]
    async fn invalid_coordinates_are_rejected() {
        for uri in [
            "/api/weather-coords?lat=91&lon=0",
            "/api/forecast-coords?lat=0&lon=181",
            "/api/alerts-coords?lat=abc&lon=0",
            "/api/weather-coords?lon=10",
        ] {
            let response = app().oneshot(get(uri, "192.0.2.2")).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(json_body(response).await["error"], "invalid_input");
        }
    }

    #[tokio::test]
    async fn coordinate_lookup_resolves_name() {
        let response = app()
            .oneshot(get("/api/weather-coords?lat=51.5074&lon=-0.1278", "192.0.2.3"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"]["location"], "Westminster, England");
    }

    #[tokio::test]
    async fn short_city_name_is_invalid() {
        let response = app().oneshot(get("/api/alerts/X", "192.0.2.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_city_is_not_found() {
        let app = app_with(
            StubProvider::failing(StubFailure::NotFound),
            Arc::new(MemoryStore::new()),
            100,
        );
        let response = app.oneshot(get("/api/weather/Atlantis", "192.0.2.5")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["message"], "Location 'Atlantis' not found");
    }

    #[tokio::test]
    async fn provider_outage_is_service_unavailable() {
        let app = app_with(
            StubProvider::failing(StubFailure::Transient),
            Arc::new(MemoryStore::new()),
            100,
        );

        let response = app.clone().oneshot(get("/api/stats/Lima", "192.0.2.6")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["error"], "upstream_unavailable");

        let health = app.oneshot(get("/api/health", "192.0.2.6")).await.unwrap();
        assert_eq!(health.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(health).await;
        assert_eq!(body["message"], "Degraded");
        assert_eq!(body["data"]["provider"], "unavailable");
    }

    #[tokio::test]
    async fn alerts_endpoint_returns_evaluated_alerts() {
        let app = app_with(
            StubProvider::new(36.0, 20.0, "Clear"),
            Arc::new(MemoryStore::new()),
            100,
        );
        let response = app.oneshot(get("/api/alerts/Lima", "192.0.2.7")).await.unwrap();
        let body = json_body(response).await;

        let alerts = body["data"].as_array().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["kind"], "High Temperature");
        assert_eq!(alerts[0]["severity"], "Medium");
    }

    #[tokio::test]
    async fn preflight_is_answered_without_consuming_quota() {
        let app = app_with(StubProvider::mild(), Arc::new(MemoryStore::new()), 1);

        for _ in 0..3 {
            let request = Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/weather/Lima")
                .header("x-forwarded-for", "192.0.2.8")
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
            assert_eq!(response.headers()["access-control-allow-methods"], "GET, OPTIONS");
        }

        let response = app.oneshot(get("/api/weather/Lima", "192.0.2.8")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let response = app().oneshot(get("/api/nope", "192.0.2.10")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "not_found");
    }
}
