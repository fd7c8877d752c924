pub mod openweather;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ForecastSeries, LocationQuery, UnitSystem, WeatherSnapshot};

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("location not found")]
    NotFound,
    #[error("provider temporarily unavailable: {0}")]
    Transient(String),
    #[error("provider response could not be decoded: {0}")]
    Malformed(String),
}

/// Upstream weather source. Implementations return values already converted
/// to `units`, except wind speed which stays on its metric baseline.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn current(
        &self,
        location: &LocationQuery,
        units: UnitSystem,
    ) -> ProviderResult<WeatherSnapshot>;

    async fn forecast(
        &self,
        location: &LocationQuery,
        units: UnitSystem,
    ) -> ProviderResult<ForecastSeries>;

    async fn reverse_geocode(&self, lat: f64, lon: f64) -> ProviderResult<String>;
}
