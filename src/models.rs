use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    /// Anything other than `imperial` (case-insensitive) is treated as metric.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("imperial") => Self::Imperial,
            _ => Self::Metric,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
        }
    }

    pub fn temperature_suffix(&self) -> &'static str {
        match self {
            Self::Metric => "°C",
            Self::Imperial => "°F",
        }
    }

    pub fn speed_suffix(&self) -> &'static str {
        match self {
            Self::Metric => "km/h",
            Self::Imperial => "mph",
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Weather,
    Forecast,
    Alerts,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weather => "weather",
            Self::Forecast => "forecast",
            Self::Alerts => "alerts",
        }
    }
}

pub const MAX_CITY_LEN: usize = 100;

/// A validated location. Construct through [`LocationQuery::city`] or
/// [`LocationQuery::coordinates`] so invalid input never reaches the network.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationQuery {
    City(String),
    Coordinates { lat: f64, lon: f64 },
}

impl LocationQuery {
    pub fn city(raw: &str) -> GatewayResult<Self> {
        let city = raw.trim();
        let len = city.chars().count();
        if len < 2 || len > MAX_CITY_LEN {
            return Err(GatewayError::InvalidInput(format!(
                "City name must be between 2 and {MAX_CITY_LEN} characters"
            )));
        }
        Ok(Self::City(city.to_string()))
    }

    pub fn coordinates(lat: f64, lon: f64) -> GatewayResult<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);

        if !valid {
            return Err(GatewayError::InvalidInput(
                "Coordinates out of valid range. Latitude must be between -90 and 90, longitude between -180 and 180."
                    .to_string(),
            ));
        }
        Ok(Self::Coordinates { lat, lon })
    }

    /// Parses raw query-string values, rejecting missing or non-numeric input.
    pub fn parse_coordinates(lat: Option<&str>, lon: Option<&str>) -> GatewayResult<Self> {
        let parse = |raw: Option<&str>| raw.and_then(|v| v.trim().parse::<f64>().ok());
        match (parse(lat), parse(lon)) {
            (Some(lat), Some(lon)) => Self::coordinates(lat, lon),
            _ => Err(GatewayError::InvalidInput(
                "Invalid latitude or longitude parameters. Please provide valid numeric values."
                    .to_string(),
            )),
        }
    }

    /// Cache-key segment: lower-cased city, or coordinates rounded to two
    /// decimals so nearby lookups share an entry.
    pub fn cache_segment(&self) -> String {
        match self {
            Self::City(city) => city.to_lowercase(),
            Self::Coordinates { lat, lon } => {
                format!("coords:{}:{}", key_coordinate(*lat), key_coordinate(*lon))
            }
        }
    }

    pub fn fallback_label(lat: f64, lon: f64) -> String {
        format!("Location {lat:.4}, {lon:.4}")
    }
}

/// Two-decimal rendering with negative zero folded into zero, so points just
/// either side of the equator or meridian share a key.
fn key_coordinate(value: f64) -> String {
    let rendered = format!("{value:.2}");
    match rendered.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => rendered,
    }
}

impl fmt::Display for LocationQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::City(city) => f.write_str(city),
            Self::Coordinates { lat, lon } => write!(f, "{lat}, {lon}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    pub location: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
    pub temperature: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: u8,
    pub pressure: u32,
    pub wind_speed: f64,
    pub wind_direction: u16,
    pub condition_id: u32,
    pub condition: String,
    pub description: String,
    pub icon: String,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastEntry {
    pub at: DateTime<Utc>,
    pub temperature: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: u8,
    pub wind_speed: f64,
    pub condition: String,
    pub description: String,
    pub precipitation_chance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSeries {
    pub city: String,
    pub country: String,
    pub entries: Vec<ForecastEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    #[serde(rename = "High Temperature")]
    HighTemperature,
    #[serde(rename = "Low Temperature")]
    LowTemperature,
    #[serde(rename = "Strong Wind")]
    StrongWind,
    #[serde(rename = "Severe Weather")]
    SevereWeather,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub city: String,
    pub kind: AlertKind,
    pub message: String,
    pub severity: Severity,
    pub value: f64,
    pub threshold: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastStats {
    pub average_temp: f64,
    pub max_temp: f64,
    pub min_temp: f64,
    pub rainy_periods: usize,
    pub clear_periods: usize,
}

impl ForecastStats {
    pub fn summarize(series: &ForecastSeries) -> Self {
        let entries = &series.entries;
        if entries.is_empty() {
            return Self {
                average_temp: 0.0,
                max_temp: 0.0,
                min_temp: 0.0,
                rainy_periods: 0,
                clear_periods: 0,
            };
        }

        let sum: f64 = entries.iter().map(|e| e.temperature).sum();
        let has = |e: &ForecastEntry, needle: &str| e.condition.to_lowercase().contains(needle);

        Self {
            average_temp: sum / entries.len() as f64,
            max_temp: entries.iter().map(|e| e.temp_max).fold(f64::MIN, f64::max),
            min_temp: entries.iter().map(|e| e.temp_min).fold(f64::MAX, f64::min),
            rainy_periods: entries.iter().filter(|e| has(e, "rain")).count(),
            clear_periods: entries.iter().filter(|e| has(e, "clear")).count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherStats {
    pub city: String,
    pub current_conditions: WeatherSnapshot,
    pub forecast_stats: ForecastStats,
    pub generated_at: DateTime<Utc>,
}

/// Response envelope shared by every JSON endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            timestamp: Utc::now(),
        }
    }
}
