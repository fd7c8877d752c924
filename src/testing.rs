use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use crate::{
    models::{ForecastEntry, ForecastSeries, LocationQuery, UnitSystem, WeatherSnapshot},
    provider::{ProviderError, ProviderResult, WeatherProvider},
    store::{KeyValueStore, StoreError, StoreResult},
};

/// A configured store whose every call fails, as an unreachable Redis would.
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn increment(&self, _key: &str) -> StoreResult<i64> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn get(&self, _key: &str) -> StoreResult<Option<Bytes>> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn ping(&self) -> StoreResult<Duration> {
        Err(StoreError::Timeout)
    }
}

pub fn snapshot(temperature: f64, wind_speed: f64, condition: &str) -> WeatherSnapshot {
    WeatherSnapshot {
        location: "Lima".to_string(),
        country: "PE".to_string(),
        latitude: -12.05,
        longitude: -77.04,
        temperature,
        feels_like: temperature,
        temp_min: temperature - 2.0,
        temp_max: temperature + 2.0,
        humidity: 60,
        pressure: 1013,
        wind_speed,
        wind_direction: 90,
        condition_id: 800,
        condition: condition.to_string(),
        description: condition.to_lowercase(),
        icon: "01d".to_string(),
        observed_at: Utc::now(),
    }
}

#[derive(Debug, Clone, Copy)]
pub enum StubFailure {
    NotFound,
    Transient,
    Malformed,
}

impl StubFailure {
    fn to_error(self) -> ProviderError {
        match self {
            Self::NotFound => ProviderError::NotFound,
            Self::Transient => ProviderError::Transient("upstream returned 502".into()),
            Self::Malformed => ProviderError::Malformed("expected value at line 1".into()),
        }
    }
}

/// Provider double that counts calls and answers from fixed readings.
pub struct StubProvider {
    pub current_calls: AtomicUsize,
    pub forecast_calls: AtomicUsize,
    pub geocode_calls: AtomicUsize,
    temperature: f64,
    wind_speed: f64,
    condition: String,
    failure: Option<StubFailure>,
    geocode_name: Option<String>,
}

impl StubProvider {
    pub fn new(temperature: f64, wind_speed: f64, condition: &str) -> Self {
        Self {
            current_calls: AtomicUsize::new(0),
            forecast_calls: AtomicUsize::new(0),
            geocode_calls: AtomicUsize::new(0),
            temperature,
            wind_speed,
            condition: condition.to_string(),
            failure: None,
            geocode_name: Some("Westminster, England".to_string()),
        }
    }

    pub fn mild() -> Self {
        Self::new(20.0, 10.0, "Clear")
    }

    pub fn failing(failure: StubFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::mild()
        }
    }

    pub fn without_geocoding(self) -> Self {
        Self {
            geocode_name: None,
            ..self
        }
    }

    pub fn calls(&self) -> usize {
        self.current_calls.load(Ordering::SeqCst)
            + self.forecast_calls.load(Ordering::SeqCst)
            + self.geocode_calls.load(Ordering::SeqCst)
    }

    fn name_for(location: &LocationQuery) -> String {
        match location {
            LocationQuery::City(city) => city.clone(),
            LocationQuery::Coordinates { .. } => "Station 4471".to_string(),
        }
    }
}

#[async_trait]
impl WeatherProvider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn current(
        &self,
        location: &LocationQuery,
        _units: UnitSystem,
    ) -> ProviderResult<WeatherSnapshot> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.failure {
            return Err(failure.to_error());
        }

        let mut reading = snapshot(self.temperature, self.wind_speed, &self.condition);
        reading.location = Self::name_for(location);
        Ok(reading)
    }

    async fn forecast(
        &self,
        location: &LocationQuery,
        _units: UnitSystem,
    ) -> ProviderResult<ForecastSeries> {
        self.forecast_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.failure {
            return Err(failure.to_error());
        }

        let entry = |offset: f64, condition: &str| ForecastEntry {
            at: Utc::now(),
            temperature: self.temperature + offset,
            temp_min: self.temperature + offset - 1.0,
            temp_max: self.temperature + offset + 1.0,
            humidity: 55,
            wind_speed: self.wind_speed,
            condition: condition.to_string(),
            description: condition.to_lowercase(),
            precipitation_chance: 0.2,
        };

        Ok(ForecastSeries {
            city: Self::name_for(location),
            country: "PE".to_string(),
            entries: vec![entry(-1.0, "Rain"), entry(0.0, "Clear"), entry(1.0, "Clouds")],
        })
    }

    async fn reverse_geocode(&self, _lat: f64, _lon: f64) -> ProviderResult<String> {
        self.geocode_calls.fetch_add(1, Ordering::SeqCst);
        self.geocode_name
            .clone()
            .ok_or_else(|| ProviderError::Transient("geocoding timed out".into()))
    }
}
