use std::{sync::Arc, time::Duration};

use chrono::Utc;
use serde::Serialize;

use crate::{
    alerts::{AlertEvaluator, AlertThresholds},
    cache::{CacheLayer, CacheSource, Cached, cache_key},
    config::CacheTtls,
    error::{GatewayError, GatewayResult},
    models::{
        Alert, ForecastSeries, ForecastStats, LocationQuery, ResourceKind, UnitSystem,
        WeatherSnapshot, WeatherStats,
    },
    provider::{ProviderError, WeatherProvider},
    store::KeyValueStore,
};

const HEALTH_CHECK_CITY: &str = "London";
const STORE_PING_BUDGET: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Ok,
    Unavailable,
    Disabled,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub provider: ComponentStatus,
    pub store: ComponentStatus,
    pub store_backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_latency_ms: Option<u64>,
}

/// Stateless per call: every piece of cross-request state lives in the
/// shared store behind `cache`.
pub struct WeatherGateway {
    provider: Arc<dyn WeatherProvider>,
    store: Arc<dyn KeyValueStore>,
    cache: CacheLayer,
    evaluator: AlertEvaluator,
}

impl WeatherGateway {
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        store: Arc<dyn KeyValueStore>,
        ttls: CacheTtls,
        thresholds: AlertThresholds,
    ) -> Self {
        Self {
            provider,
            cache: CacheLayer::new(store.clone(), ttls),
            store,
            evaluator: AlertEvaluator::new(thresholds),
        }
    }

    pub async fn current(
        &self,
        location: &LocationQuery,
        units: UnitSystem,
    ) -> GatewayResult<Cached<WeatherSnapshot>> {
        let key = cache_key(ResourceKind::Weather, location, units);
        let ttl = self.cache.ttl_for(ResourceKind::Weather);

        self.cache
            .get_or_fetch(&key, ttl, || async move {
                let mut snapshot = self
                    .provider
                    .current(location, units)
                    .await
                    .map_err(|err| self.upstream_error(err, location))?;

                if let LocationQuery::Coordinates { lat, lon } = *location {
                    snapshot.location = self.location_label(lat, lon).await;
                }
                Ok::<_, GatewayError>(snapshot)
            })
            .await
    }

    pub async fn forecast(
        &self,
        location: &LocationQuery,
        units: UnitSystem,
    ) -> GatewayResult<Cached<ForecastSeries>> {
        let key = cache_key(ResourceKind::Forecast, location, units);
        let ttl = self.cache.ttl_for(ResourceKind::Forecast);

        self.cache
            .get_or_fetch(&key, ttl, || async move {
                let mut series = self
                    .provider
                    .forecast(location, units)
                    .await
                    .map_err(|err| self.upstream_error(err, location))?;

                if let LocationQuery::Coordinates { lat, lon } = *location {
                    series.city = self.location_label(lat, lon).await;
                }
                Ok::<_, GatewayError>(series)
            })
            .await
    }

    /// Alert lists are cached on their own key; a miss evaluates the current
    /// snapshot, which itself goes through the current-conditions cache.
    pub async fn alerts(
        &self,
        location: &LocationQuery,
        units: UnitSystem,
    ) -> GatewayResult<Cached<Vec<Alert>>> {
        let key = cache_key(ResourceKind::Alerts, location, units);
        let ttl = self.cache.ttl_for(ResourceKind::Alerts);

        self.cache
            .get_or_fetch(&key, ttl, || async move {
                let snapshot = self.current(location, units).await?.value;
                let alerts = self.evaluator.evaluate(&snapshot, units);
                tracing::debug!(
                    location = %location,
                    units = %units,
                    count = alerts.len(),
                    "alerts evaluated"
                );
                Ok::<_, GatewayError>(alerts)
            })
            .await
    }

    /// Current conditions plus forecast aggregates. Reported as cached only
    /// when both halves came from the cache.
    pub async fn stats(
        &self,
        location: &LocationQuery,
        units: UnitSystem,
    ) -> GatewayResult<Cached<WeatherStats>> {
        let (current, forecast) =
            tokio::join!(self.current(location, units), self.forecast(location, units));
        let (current, forecast) = (current?, forecast?);

        let source = if current.from_cache() && forecast.from_cache() {
            CacheSource::Hit
        } else {
            CacheSource::Fresh
        };

        let forecast_stats = ForecastStats::summarize(&forecast.value);
        Ok(Cached {
            value: WeatherStats {
                city: current.value.location.clone(),
                current_conditions: current.value,
                forecast_stats,
                generated_at: Utc::now(),
            },
            source,
        })
    }

    /// The store is optional, so only the provider check decides health.
    pub async fn health(&self) -> HealthReport {
        let (store, store_latency_ms) = self.check_store().await;

        let location = LocationQuery::City(HEALTH_CHECK_CITY.to_string());
        let provider = match self.current(&location, UnitSystem::Metric).await {
            Ok(_) => ComponentStatus::Ok,
            Err(_) => ComponentStatus::Unavailable,
        };

        HealthReport {
            healthy: provider == ComponentStatus::Ok,
            provider,
            store,
            store_backend: self.store.name(),
            store_latency_ms,
        }
    }

    async fn check_store(&self) -> (ComponentStatus, Option<u64>) {
        match tokio::time::timeout(STORE_PING_BUDGET, self.store.ping()).await {
            Ok(Ok(latency)) if latency < STORE_PING_BUDGET => {
                (ComponentStatus::Ok, Some(latency.as_millis() as u64))
            }
            Ok(Err(err)) if err.is_disabled() => (ComponentStatus::Disabled, None),
            Ok(Ok(_)) | Ok(Err(_)) | Err(_) => (ComponentStatus::Unavailable, None),
        }
    }

    async fn location_label(&self, lat: f64, lon: f64) -> String {
        match self.provider.reverse_geocode(lat, lon).await {
            Ok(name) => name,
            Err(err) => {
                tracing::debug!(lat, lon, error = %err, "reverse geocoding failed; using coordinate label");
                LocationQuery::fallback_label(lat, lon)
            }
        }
    }

    fn upstream_error(&self, err: ProviderError, location: &LocationQuery) -> GatewayError {
        match &err {
            ProviderError::NotFound => {
                tracing::debug!(provider = self.provider.name(), location = %location, "location not found upstream");
            }
            ProviderError::Transient(detail) | ProviderError::Malformed(detail) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    location = %location,
                    error = %detail,
                    "provider call failed"
                );
            }
        }
        GatewayError::from_provider(err, &location.to_string())
    }
}
