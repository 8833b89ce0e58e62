use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::analytics::{WEEK_DAYS, round_to};
use crate::state::{Reading, serialize_timestamp};

/// Assumed tank capacity; one percent of level is ten liters.
pub const TANK_CAPACITY_LITERS: f64 = 1000.0;

/// Reported when neither the current flow nor the history shows any draw.
pub const NO_DRAW_HOURS: f64 = 999.0;

/// Percent deviation from the average beyond which usage counts as unusual.
const USAGE_DEVIATION_PERCENT: f64 = 20.0;

/// How soon the tank runs dry at the current draw.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    Normal,  // >= 24h
    Caution, // 12-24h
    Warning, // 6-12h
    Critical, // <6h
}

impl WarningLevel {
    pub fn from_hours(hours_remaining: f64) -> Self {
        if hours_remaining < 6.0 {
            Self::Critical
        } else if hours_remaining < 12.0 {
            Self::Warning
        } else if hours_remaining < 24.0 {
            Self::Caution
        } else {
            Self::Normal
        }
    }
}

/// Today's consumption compared with the trailing average.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    High,
    Low,
    Normal,
    Unknown,
}

impl UsageStatus {
    fn from_diff(diff_percent: f64) -> Self {
        if diff_percent > USAGE_DEVIATION_PERCENT {
            Self::High
        } else if diff_percent < -USAGE_DEVIATION_PERCENT {
            Self::Low
        } else {
            Self::Normal
        }
    }

    fn message(self, diff_percent: f64) -> String {
        match self {
            Self::High => format!("Today's usage is {:.1}% above normal", diff_percent.abs()),
            Self::Low => format!("Today's usage is {:.1}% below normal", diff_percent.abs()),
            Self::Normal => "Today's usage is within normal range".to_string(),
            Self::Unknown => "Not enough data to compare usage".to_string(),
        }
    }
}

/// Remaining-hours estimate for the tank behind the latest reading.
#[derive(Debug, Clone, Serialize)]
pub struct ShortageForecast {
    pub hours_remaining: f64,
    pub current_level_percent: f64,
    pub current_water_liters: f64,
    pub usage_status: UsageStatus,
    pub usage_message: String,
    pub usage_diff_percent: f64,
    pub warning_level: WarningLevel,
    pub avg_daily_consumption: f64,
    pub today_consumption: f64,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Prediction result; an empty store yields `NoData` instead of an error.
#[derive(Debug, Clone)]
pub enum ShortagePrediction {
    Forecast(ShortageForecast),
    NoData,
}

impl Serialize for ShortagePrediction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct Degraded {
            error: &'static str,
            hours_remaining: f64,
            usage_status: UsageStatus,
        }

        match self {
            Self::Forecast(forecast) => forecast.serialize(serializer),
            Self::NoData => Degraded {
                error: "No sensor data available",
                hours_remaining: 0.0,
                usage_status: UsageStatus::Unknown,
            }
            .serialize(serializer),
        }
    }
}

/// Consumption history the predictor compares against, in liters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumptionHistory {
    /// Seven-day flow total.
    pub week_total: f64,
    /// One-day flow total.
    pub today_total: f64,
}

impl ConsumptionHistory {
    pub fn avg_daily(&self) -> f64 {
        self.week_total / f64::from(WEEK_DAYS)
    }
}

/// Estimate hours of water left using the fixed capacity model.
pub fn predict(
    latest: Option<&Reading>,
    history: ConsumptionHistory,
    now: DateTime<Utc>,
) -> ShortagePrediction {
    let Some(latest) = latest else {
        return ShortagePrediction::NoData;
    };

    let level = latest.water_level_percent;
    let flow = latest.flow_rate_lpm;
    let avg_daily = history.avg_daily();
    let current_liters = level / 100.0 * TANK_CAPACITY_LITERS;

    let hours_remaining = if flow > 0.0 {
        current_liters / (flow * 60.0)
    } else {
        let avg_hourly = avg_daily / 24.0;
        if avg_hourly > 0.0 {
            current_liters / avg_hourly
        } else {
            NO_DRAW_HOURS
        }
    };

    let usage_diff_percent = if avg_daily > 0.0 {
        (history.today_total - avg_daily) / avg_daily * 100.0
    } else {
        0.0
    };
    let usage_status = UsageStatus::from_diff(usage_diff_percent);

    ShortagePrediction::Forecast(ShortageForecast {
        hours_remaining: round_to(hours_remaining, 1),
        current_level_percent: round_to(level, 1),
        current_water_liters: round_to(current_liters, 1),
        usage_status,
        usage_message: usage_status.message(usage_diff_percent),
        usage_diff_percent: round_to(usage_diff_percent, 1),
        warning_level: WarningLevel::from_hours(hours_remaining),
        avg_daily_consumption: round_to(avg_daily, 1),
        today_consumption: round_to(history.today_total, 1),
        timestamp: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reading(level: f64, flow: f64) -> Reading {
        Reading {
            device_id: "SENSOR-001".into(),
            tank_id: "TANK-MAIN".into(),
            water_level_percent: level,
            flow_rate_lpm: flow,
            timestamp: "2025-01-15T12:00:00Z".into(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    fn forecast(prediction: ShortagePrediction) -> ShortageForecast {
        match prediction {
            ShortagePrediction::Forecast(forecast) => forecast,
            ShortagePrediction::NoData => panic!("expected a forecast"),
        }
    }

    const NO_HISTORY: ConsumptionHistory = ConsumptionHistory {
        week_total: 0.0,
        today_total: 0.0,
    };

    #[test]
    fn current_flow_drives_estimate() {
        // 500 L at 10 L/min
        let f = forecast(predict(Some(&reading(50.0, 10.0)), NO_HISTORY, now()));
        assert_eq!(f.current_water_liters, 500.0);
        assert_eq!(f.hours_remaining, 0.8);
        assert_eq!(f.warning_level, WarningLevel::Critical);
    }

    #[test]
    fn idle_flow_falls_back_to_average_daily_draw() {
        // avg daily = 168 / 7 = 24 L, i.e. 1 L/h; 300 L lasts 300 h
        let history = ConsumptionHistory {
            week_total: 168.0,
            today_total: 24.0,
        };
        let f = forecast(predict(Some(&reading(30.0, 0.0)), history, now()));
        assert_eq!(f.hours_remaining, 300.0);
        assert_eq!(f.warning_level, WarningLevel::Normal);
        assert_eq!(f.usage_status, UsageStatus::Normal);
        assert_eq!(f.avg_daily_consumption, 24.0);
    }

    #[test]
    fn no_draw_anywhere_reports_sentinel() {
        let f = forecast(predict(Some(&reading(30.0, 0.0)), NO_HISTORY, now()));
        assert_eq!(f.hours_remaining, NO_DRAW_HOURS);
        assert_eq!(f.usage_diff_percent, 0.0);
        assert_eq!(f.usage_status, UsageStatus::Normal);
    }

    #[test]
    fn usage_deviation_classification() {
        let high = ConsumptionHistory {
            week_total: 70.0,
            today_total: 15.0,
        };
        let f = forecast(predict(Some(&reading(50.0, 1.0)), high, now()));
        assert_eq!(f.usage_status, UsageStatus::High);
        assert_eq!(f.usage_diff_percent, 50.0);
        assert_eq!(f.usage_message, "Today's usage is 50.0% above normal");

        let low = ConsumptionHistory {
            week_total: 70.0,
            today_total: 5.0,
        };
        let f = forecast(predict(Some(&reading(50.0, 1.0)), low, now()));
        assert_eq!(f.usage_status, UsageStatus::Low);
    }

    #[test]
    fn warning_level_boundaries() {
        assert_eq!(WarningLevel::from_hours(5.9), WarningLevel::Critical);
        assert_eq!(WarningLevel::from_hours(6.0), WarningLevel::Warning);
        assert_eq!(WarningLevel::from_hours(12.0), WarningLevel::Caution);
        assert_eq!(WarningLevel::from_hours(24.0), WarningLevel::Normal);
    }

    #[test]
    fn empty_store_yields_degraded_payload() {
        let prediction = predict(None, NO_HISTORY, now());
        let json = serde_json::to_value(&prediction).expect("json");
        assert_eq!(json["error"], "No sensor data available");
        assert_eq!(json["hours_remaining"], 0.0);
        assert_eq!(json["usage_status"], "unknown");
    }

    #[test]
    fn forecast_serialises_lowercase_enums() {
        let prediction = predict(Some(&reading(50.0, 10.0)), NO_HISTORY, now());
        let json = serde_json::to_value(&prediction).expect("json");
        assert_eq!(json["warning_level"], "critical");
        assert_eq!(json["usage_status"], "normal");
        assert_eq!(json["timestamp"], "2025-01-15T12:00:00Z");
    }
}
