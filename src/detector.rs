//! Threshold rules that turn a single reading into alerts and a rollup status.
//!
//! Evaluation is pure: the caller decides whether the produced alerts are
//! appended to the [`AlertLog`](crate::state::AlertLog).

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Serialize, Serializer};

use crate::config::AlertThresholds;
use crate::state::Reading;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Overflow,
    Leakage,
    LowWater,
    HighFlow,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::Overflow => "overflow",
            AlertKind::Leakage => "leakage",
            AlertKind::LowWater => "low_water",
            AlertKind::HighFlow => "high_flow",
        }
    }

    pub fn suggested_action(self) -> &'static str {
        match self {
            AlertKind::Overflow => "Reduce inflow immediately. Stop pump or close inlet valve.",
            AlertKind::Leakage => {
                "Check pipelines and fittings around the tank. Inspect for visible leaks."
            }
            AlertKind::LowWater => {
                "Start pump within 30 minutes. Check water source availability."
            }
            AlertKind::HighFlow => "Monitor usage. Check for open taps or unusual consumption.",
        }
    }

    fn cause(self, value: f64, threshold: f64) -> String {
        match self {
            AlertKind::Overflow => {
                format!("Water level ({value:.1}%) exceeded safe threshold ({threshold}%)")
            }
            AlertKind::Leakage => {
                format!("Continuous flow ({value:.1} L/min) detected without active usage")
            }
            AlertKind::LowWater => {
                format!("Water level ({value:.1}%) below minimum threshold ({threshold}%)")
            }
            AlertKind::HighFlow => {
                format!("Flow rate ({value:.1} L/min) exceeds normal usage ({threshold} L/min)")
            }
        }
    }
}

/// Alert priority, ordered low to critical. Serialized as its ordinal (1-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Priority {
    pub fn label(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        }
    }

    pub fn ordinal(self) -> u8 {
        self as u8
    }
}

impl Serialize for Priority {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.ordinal())
    }
}

/// Rollup classification for one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Normal,
    Warning,
    Critical,
    OverflowRisk,
    LeakageDetected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub priority: Priority,
    pub priority_label: &'static str,
    pub message: String,
    pub device_id: String,
    pub tank_id: String,
    pub detected_value: f64,
    pub threshold: f64,
    #[serde(serialize_with = "crate::state::serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
    pub suggested_action: &'static str,
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub status: Status,
    pub status_message: String,
    pub alerts_count: usize,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    thresholds: AlertThresholds,
}

impl AnomalyDetector {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    pub fn evaluate(&self, reading: &Reading) -> Analysis {
        self.evaluate_at(reading, Utc::now())
    }

    /// Run every rule; the status reflects the first rule (in fixed order)
    /// that claims it, while all matching alerts are returned.
    pub fn evaluate_at(&self, reading: &Reading, now: DateTime<Utc>) -> Analysis {
        let t = &self.thresholds;
        let level = reading.water_level_percent;
        let flow = reading.flow_rate_lpm;
        let stamp = now.trunc_subsecs(0);

        let mut alerts = Vec::new();
        let mut status: Option<(Status, String)> = None;

        if let Some(alert) = self.check_overflow(reading, stamp) {
            if level >= t.overflow_level {
                status = Some((
                    Status::OverflowRisk,
                    format!("Overflow risk detected - Water level at {level:?}%"),
                ));
            }
            alerts.push(alert);
        }

        if let Some(alert) = self.check_leakage(reading, stamp) {
            alerts.push(alert);
            status.get_or_insert_with(|| {
                (
                    Status::LeakageDetected,
                    "Potential leakage detected".to_string(),
                )
            });
        }

        if let Some(alert) = self.check_low_water(reading, stamp) {
            alerts.push(alert);
            status.get_or_insert_with(|| {
                let rollup = if level >= t.critical_level {
                    Status::Warning
                } else {
                    Status::Critical
                };
                (rollup, format!("Low water level - {level:?}%"))
            });
        }

        if let Some(alert) = self.check_high_flow(reading, stamp) {
            alerts.push(alert);
            status.get_or_insert_with(|| {
                (Status::Warning, format!("High flow rate - {flow:?} L/min"))
            });
        }

        let (status, status_message) =
            status.unwrap_or_else(|| (Status::Normal, "All systems normal".to_string()));

        Analysis {
            status,
            status_message,
            alerts_count: alerts.len(),
            alerts,
        }
    }

    fn check_overflow(&self, reading: &Reading, now: DateTime<Utc>) -> Option<Alert> {
        let t = &self.thresholds;
        let level = reading.water_level_percent;
        let tank = &reading.tank_id;
        if level >= t.overflow_level {
            Some(build_alert(
                AlertKind::Overflow,
                Priority::Critical,
                format!("Tank {tank} is at {level:?}% capacity - Overflow imminent!"),
                reading,
                level,
                t.overflow_level,
                now,
            ))
        } else if level >= t.high_level {
            Some(build_alert(
                AlertKind::Overflow,
                Priority::High,
                format!("Tank {tank} water level is high at {level:?}%"),
                reading,
                level,
                t.high_level,
                now,
            ))
        } else {
            None
        }
    }

    // A small steady flow while the tank is not near full points at a leak
    // rather than normal draw-off.
    fn check_leakage(&self, reading: &Reading, now: DateTime<Utc>) -> Option<Alert> {
        let t = &self.thresholds;
        let level = reading.water_level_percent;
        let flow = reading.flow_rate_lpm;
        let tank = &reading.tank_id;
        let suspicious = flow >= t.leakage_flow
            && level < t.high_level
            && flow < t.normal_max_flow / 2.0;
        suspicious.then(|| {
            build_alert(
                AlertKind::Leakage,
                Priority::Medium,
                format!(
                    "Potential leak in tank {tank} - Low continuous flow of {flow:?} L/min"
                ),
                reading,
                flow,
                t.leakage_flow,
                now,
            )
        })
    }

    fn check_low_water(&self, reading: &Reading, now: DateTime<Utc>) -> Option<Alert> {
        let t = &self.thresholds;
        let level = reading.water_level_percent;
        let tank = &reading.tank_id;
        if level <= t.critical_level {
            Some(build_alert(
                AlertKind::LowWater,
                Priority::Critical,
                format!("Tank {tank} water level critically low at {level:?}%"),
                reading,
                level,
                t.critical_level,
                now,
            ))
        } else if level <= t.low_level {
            Some(build_alert(
                AlertKind::LowWater,
                Priority::Medium,
                format!("Tank {tank} water level low at {level:?}%"),
                reading,
                level,
                t.low_level,
                now,
            ))
        } else {
            None
        }
    }

    fn check_high_flow(&self, reading: &Reading, now: DateTime<Utc>) -> Option<Alert> {
        let t = &self.thresholds;
        let flow = reading.flow_rate_lpm;
        let tank = &reading.tank_id;
        (flow >= t.high_flow).then(|| {
            build_alert(
                AlertKind::HighFlow,
                Priority::High,
                format!("Unusually high water flow in tank {tank} - {flow:?} L/min"),
                reading,
                flow,
                t.high_flow,
                now,
            )
        })
    }
}

fn build_alert(
    kind: AlertKind,
    priority: Priority,
    message: String,
    reading: &Reading,
    value: f64,
    threshold: f64,
    now: DateTime<Utc>,
) -> Alert {
    Alert {
        kind,
        priority,
        priority_label: priority.label(),
        message,
        device_id: reading.device_id.clone(),
        tank_id: reading.tank_id.clone(),
        detected_value: value,
        threshold,
        timestamp: now,
        acknowledged: false,
        suggested_action: kind.suggested_action(),
        cause: kind.cause(value, threshold),
    }
}
