use chrono::Utc;
use uuid::Uuid;

use crate::models::{Alert, AlertKind, Severity, UnitSystem, WeatherSnapshot};

pub const KMH_TO_MPH: f64 = 0.621371;

/// Two-tier threshold: crossing `base` raises a Medium alert, crossing
/// `severe` raises it to High.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub base: f64,
    pub severe: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitThresholds {
    pub high_temp: Band,
    pub low_temp: Band,
    pub high_wind: Band,
}

/// Thresholds authored as metric/imperial twins. Temperatures arrive from the
/// provider already in the requested unit, so they are compared as-is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    pub metric: UnitThresholds,
    pub imperial: UnitThresholds,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            metric: UnitThresholds {
                high_temp: Band { base: 35.0, severe: 40.0 },
                low_temp: Band { base: 0.0, severe: -10.0 },
                high_wind: Band { base: 50.0, severe: 70.0 },
            },
            imperial: UnitThresholds {
                high_temp: Band { base: 95.0, severe: 104.0 },
                low_temp: Band { base: 32.0, severe: 14.0 },
                high_wind: Band { base: 31.0, severe: 43.0 },
            },
        }
    }
}

impl AlertThresholds {
    pub fn for_units(&self, units: UnitSystem) -> &UnitThresholds {
        match units {
            UnitSystem::Metric => &self.metric,
            UnitSystem::Imperial => &self.imperial,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Comparator {
    Above,
    Below,
}

impl Comparator {
    fn crosses(self, value: f64, limit: f64) -> bool {
        match self {
            Self::Above => value > limit,
            Self::Below => value < limit,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Reading {
    Temperature,
    WindSpeed,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    HighTemp,
    LowTemp,
    HighWind,
}

#[derive(Debug, Clone, Copy)]
struct AlertRule {
    kind: AlertKind,
    reading: Reading,
    comparator: Comparator,
    slot: Slot,
}

/// Numeric rules in output order. The categorical severe-weather rule is
/// always evaluated after these.
const NUMERIC_RULES: [AlertRule; 3] = [
    AlertRule {
        kind: AlertKind::HighTemperature,
        reading: Reading::Temperature,
        comparator: Comparator::Above,
        slot: Slot::HighTemp,
    },
    AlertRule {
        kind: AlertKind::LowTemperature,
        reading: Reading::Temperature,
        comparator: Comparator::Below,
        slot: Slot::LowTemp,
    },
    AlertRule {
        kind: AlertKind::StrongWind,
        reading: Reading::WindSpeed,
        comparator: Comparator::Above,
        slot: Slot::HighWind,
    },
];

const THUNDERSTORM_IDS: std::ops::Range<u32> = 200..300;

#[derive(Debug, Clone)]
pub struct AlertEvaluator {
    thresholds: AlertThresholds,
}

impl AlertEvaluator {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self { thresholds }
    }

    /// Derives alerts from one snapshot. Rules are independent; the result is
    /// ordered high-temperature, low-temperature, wind, severe-weather.
    pub fn evaluate(&self, snapshot: &WeatherSnapshot, units: UnitSystem) -> Vec<Alert> {
        let table = self.thresholds.for_units(units);
        let mut alerts = Vec::new();

        for rule in NUMERIC_RULES {
            let band = match rule.slot {
                Slot::HighTemp => table.high_temp,
                Slot::LowTemp => table.low_temp,
                Slot::HighWind => table.high_wind,
            };
            let value = reading(snapshot, rule.reading, units);

            if !rule.comparator.crosses(value, band.base) {
                continue;
            }

            let severity = if rule.comparator.crosses(value, band.severe) {
                Severity::High
            } else {
                Severity::Medium
            };

            alerts.push(new_alert(
                snapshot,
                rule.kind,
                message(rule.kind, value, units),
                severity,
                value,
                band.base,
            ));
        }

        if is_severe_condition(snapshot) {
            alerts.push(new_alert(
                snapshot,
                AlertKind::SevereWeather,
                message(AlertKind::SevereWeather, 1.0, units),
                Severity::High,
                1.0,
                0.0,
            ));
        }

        alerts
    }
}

/// Wind is reported on a metric baseline whatever the requested units, so it
/// is the one reading converted here.
fn reading(snapshot: &WeatherSnapshot, reading: Reading, units: UnitSystem) -> f64 {
    match (reading, units) {
        (Reading::Temperature, _) => snapshot.temperature,
        (Reading::WindSpeed, UnitSystem::Metric) => snapshot.wind_speed,
        (Reading::WindSpeed, UnitSystem::Imperial) => snapshot.wind_speed * KMH_TO_MPH,
    }
}

fn is_severe_condition(snapshot: &WeatherSnapshot) -> bool {
    snapshot.condition.eq_ignore_ascii_case("thunderstorm")
        || THUNDERSTORM_IDS.contains(&snapshot.condition_id)
}

fn message(kind: AlertKind, value: f64, units: UnitSystem) -> String {
    match kind {
        AlertKind::HighTemperature => {
            format!("Extreme heat warning: {value:.1}{}", units.temperature_suffix())
        }
        AlertKind::LowTemperature => {
            format!("Freezing conditions: {value:.1}{}", units.temperature_suffix())
        }
        AlertKind::StrongWind => format!("High wind speeds: {value:.1} {}", units.speed_suffix()),
        AlertKind::SevereWeather => "Thunderstorm conditions detected".to_string(),
    }
}

fn new_alert(
    snapshot: &WeatherSnapshot,
    kind: AlertKind,
    message: String,
    severity: Severity,
    value: f64,
    threshold: f64,
) -> Alert {
    Alert {
        id: Uuid::new_v4(),
        city: snapshot.location.clone(),
        kind,
        message,
        severity,
        value,
        threshold,
        created_at: Utc::now(),
    }
}
