use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::detector::{Alert, AnomalyDetector, Status};
use crate::state::{Reading, StoredReading, serialize_timestamp};

/// Active alerts shown on the live view.
pub const DASHBOARD_ALERTS: usize = 5;

/// Flow above which the tank counts as filling or draining.
const ACTIVE_FLOW_LPM: f64 = 5.0;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum LevelStatus {
    Full,
    High,
    Normal,
    Low,
    Critical,
}

impl LevelStatus {
    pub fn from_level(level: f64) -> Self {
        if level >= 90.0 {
            Self::Full
        } else if level >= 70.0 {
            Self::High
        } else if level >= 40.0 {
            Self::Normal
        } else if level >= 20.0 {
            Self::Low
        } else {
            Self::Critical
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TankStatus {
    pub water_level_percent: f64,
    pub flow_rate_lpm: f64,
    pub is_filling: bool,
    pub is_draining: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_status: Option<LevelStatus>,
}

impl TankStatus {
    fn idle() -> Self {
        Self {
            water_level_percent: 0.0,
            flow_rate_lpm: 0.0,
            is_filling: false,
            is_draining: false,
            level_status: None,
        }
    }

    fn from_reading(reading: &Reading) -> Self {
        let level = reading.water_level_percent;
        let flow = reading.flow_rate_lpm;
        Self {
            water_level_percent: level,
            flow_rate_lpm: flow,
            is_filling: flow > ACTIVE_FLOW_LPM && level < 90.0,
            is_draining: flow > ACTIVE_FLOW_LPM && level > 10.0,
            level_status: Some(LevelStatus::from_level(level)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveDashboard {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub latest_reading: Option<Reading>,
    pub status: Status,
    pub status_message: String,
    pub alerts: Vec<Alert>,
    pub alerts_count: usize,
    pub tank_status: TankStatus,
    /// Latest insertion is older than `sensors.stale_after`.
    pub sensor_stale: bool,
}

/// Snapshot of the newest reading. The latest reading is evaluated but its
/// alerts are not recorded.
pub fn build_dashboard(
    latest: Option<StoredReading>,
    detector: &AnomalyDetector,
    mut active_alerts: Vec<Alert>,
    stale_after: Duration,
    now: DateTime<Utc>,
) -> LiveDashboard {
    let Some(latest) = latest else {
        return LiveDashboard {
            timestamp: now,
            latest_reading: None,
            status: Status::Normal,
            status_message: "No sensor data available".to_string(),
            alerts: Vec::new(),
            alerts_count: 0,
            tank_status: TankStatus::idle(),
            sensor_stale: false,
        };
    };

    let analysis = detector.evaluate_at(&latest.reading, now);
    let alerts_count = active_alerts.len();
    // Active alerts come back in insertion order; show the newest first.
    active_alerts.reverse();
    active_alerts.truncate(DASHBOARD_ALERTS);

    let age = now.signed_duration_since(latest.inserted_at);
    let sensor_stale = age
        .to_std()
        .map(|age| age > stale_after)
        .unwrap_or(false);

    LiveDashboard {
        timestamp: now,
        tank_status: TankStatus::from_reading(&latest.reading),
        latest_reading: Some(latest.reading),
        status: analysis.status,
        status_message: analysis.status_message,
        alerts: active_alerts,
        alerts_count,
        sensor_stale,
    }
}
