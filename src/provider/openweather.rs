use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    config::ProviderConfig,
    models::{ForecastEntry, ForecastSeries, LocationQuery, UnitSystem, WeatherSnapshot},
    provider::{ProviderError, ProviderResult, WeatherProvider},
};

const CURRENT_PATH: &str = "/data/2.5/weather";
const FORECAST_PATH: &str = "/data/2.5/forecast";
const REVERSE_GEOCODE_PATH: &str = "/geo/1.0/reverse";

#[derive(Clone)]
pub struct OpenWeatherProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherProvider {
    pub fn new(config: &ProviderConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(16)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> ProviderResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("appid", self.api_key.as_str())])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if matches!(status, StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST) {
            return Err(ProviderError::NotFound);
        }
        if !status.is_success() {
            return Err(ProviderError::Transient(format!("{path} returned {status}")));
        }

        let body = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&body).map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_decode() {
        ProviderError::Malformed(err.to_string())
    } else {
        ProviderError::Transient(err.to_string())
    }
}

fn location_params(location: &LocationQuery, units: UnitSystem) -> Vec<(&'static str, String)> {
    let mut params = match location {
        LocationQuery::City(city) => vec![("q", city.clone())],
        LocationQuery::Coordinates { lat, lon } => {
            vec![("lat", lat.to_string()), ("lon", lon.to_string())]
        }
    };
    params.push(("units", units.as_str().to_string()));
    params
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn name(&self) -> &'static str {
        "openweather"
    }

    async fn current(
        &self,
        location: &LocationQuery,
        units: UnitSystem,
    ) -> ProviderResult<WeatherSnapshot> {
        let parsed: OwCurrent = self
            .get_json(CURRENT_PATH, &location_params(location, units))
            .await?;
        Ok(parsed.into_snapshot())
    }

    async fn forecast(
        &self,
        location: &LocationQuery,
        units: UnitSystem,
    ) -> ProviderResult<ForecastSeries> {
        let parsed: OwForecast = self
            .get_json(FORECAST_PATH, &location_params(location, units))
            .await?;
        Ok(parsed.into_series())
    }

    async fn reverse_geocode(&self, lat: f64, lon: f64) -> ProviderResult<String> {
        let params = [
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("limit", "1".to_string()),
        ];
        let places: Vec<OwPlace> = self.get_json(REVERSE_GEOCODE_PATH, &params).await?;
        places
            .into_iter()
            .next()
            .map(OwPlace::label)
            .ok_or(ProviderError::NotFound)
    }
}

fn unix_to_utc(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    #[serde(default)]
    feels_like: f64,
    #[serde(default)]
    temp_min: f64,
    #[serde(default)]
    temp_max: f64,
    #[serde(default)]
    pressure: u32,
    #[serde(default)]
    humidity: u8,
}

#[derive(Debug, Default, Deserialize)]
struct OwCondition {
    #[serde(default)]
    id: u32,
    #[serde(default)]
    main: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Default, Deserialize)]
struct OwWind {
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    deg: u16,
}

#[derive(Debug, Default, Deserialize)]
struct OwCoord {
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
}

#[derive(Debug, Default, Deserialize)]
struct OwSys {
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrent {
    #[serde(default)]
    name: String,
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwCondition>,
    #[serde(default)]
    wind: OwWind,
    #[serde(default)]
    coord: OwCoord,
    #[serde(default)]
    sys: OwSys,
    #[serde(default)]
    dt: i64,
}

impl OwCurrent {
    fn into_snapshot(self) -> WeatherSnapshot {
        let condition = self.weather.into_iter().next().unwrap_or_default();
        WeatherSnapshot {
            location: self.name,
            country: self.sys.country,
            latitude: self.coord.lat,
            longitude: self.coord.lon,
            temperature: self.main.temp,
            feels_like: self.main.feels_like,
            temp_min: self.main.temp_min,
            temp_max: self.main.temp_max,
            humidity: self.main.humidity,
            pressure: self.main.pressure,
            wind_speed: self.wind.speed,
            wind_direction: self.wind.deg,
            condition_id: condition.id,
            condition: condition.main,
            description: condition.description,
            icon: condition.icon,
            observed_at: unix_to_utc(self.dt),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwForecastItem {
    dt: i64,
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwCondition>,
    #[serde(default)]
    wind: OwWind,
    #[serde(default)]
    pop: f64,
}

#[derive(Debug, Default, Deserialize)]
struct OwCity {
    #[serde(default)]
    name: String,
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct OwForecast {
    list: Vec<OwForecastItem>,
    #[serde(default)]
    city: OwCity,
}

impl OwForecast {
    fn into_series(self) -> ForecastSeries {
        let entries = self
            .list
            .into_iter()
            .map(|item| {
                let condition = item.weather.into_iter().next().unwrap_or_default();
                ForecastEntry {
                    at: unix_to_utc(item.dt),
                    temperature: item.main.temp,
                    temp_min: item.main.temp_min,
                    temp_max: item.main.temp_max,
                    humidity: item.main.humidity,
                    wind_speed: item.wind.speed,
                    condition: condition.main,
                    description: condition.description,
                    precipitation_chance: item.pop,
                }
            })
            .collect();

        ForecastSeries {
            city: self.city.name,
            country: self.city.country,
            entries,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwPlace {
    name: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    state: Option<String>,
}

impl OwPlace {
    fn label(self) -> String {
        match self.state.filter(|s| !s.trim().is_empty()) {
            Some(state) => format!("{}, {}", self.name, state),
            None => format!("{}, {}", self.name, self.country),
        }
    }
}
