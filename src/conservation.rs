use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analytics::{DailyAnalytics, round_to};
use crate::query::DayWindow;
use crate::state::serialize_timestamp;

/// Usage without conservation measures is assumed to be this much higher.
const BASELINE_FACTOR: f64 = 1.15;

/// Requested report period, echoed back as given.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ReportPeriod(String);

impl ReportPeriod {
    pub const WEEKLY: &'static str = "weekly";

    /// Only `weekly` (the default) reports on the week; any other name
    /// reports on a single day.
    pub fn parse(raw: Option<&str>) -> Self {
        Self(raw.unwrap_or(Self::WEEKLY).to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_weekly(&self) -> bool {
        self.0 == Self::WEEKLY
    }

    pub fn days(&self) -> u32 {
        if self.is_weekly() { 7 } else { 1 }
    }

    pub fn window(&self) -> DayWindow {
        DayWindow::clamped(i64::from(self.days()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub efficiency: &'static str,
    pub savings: &'static str,
    pub method: &'static str,
}

const EXPLANATION: Explanation = Explanation {
    efficiency: "Calculated based on water level stability and usage patterns",
    savings: "Compared to baseline usage without conservation measures",
    method: "Simple comparison with 15% higher baseline consumption",
};

#[derive(Debug, Clone, Serialize)]
pub struct ConservationReport {
    pub period: ReportPeriod,
    pub days: u32,
    pub total_usage_liters: f64,
    pub average_daily_liters: f64,
    pub water_saved_liters: f64,
    pub savings_percent: f64,
    pub efficiency_percent: f64,
    pub insights: Vec<String>,
    pub explanation: Explanation,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Efficiency score in `[50, 95]` derived from the average tank level.
pub fn efficiency_from_level(avg_level: f64) -> f64 {
    let efficiency = if avg_level >= 60.0 {
        85.0 + (avg_level - 60.0) / 4.0
    } else if avg_level >= 40.0 {
        70.0 + (avg_level - 40.0) / 2.0
    } else {
        50.0 + avg_level / 2.0
    };
    efficiency.clamp(50.0, 95.0)
}

pub fn build_report(
    period: ReportPeriod,
    analytics: &DailyAnalytics,
    now: DateTime<Utc>,
) -> ConservationReport {
    let days = period.days();
    let total = analytics.summary.total_water_flow_liters;
    let avg_daily = total / f64::from(days);
    let baseline = total * BASELINE_FACTOR;
    let saved = baseline - total;
    let savings_percent = if baseline > 0.0 {
        saved / baseline * 100.0
    } else {
        0.0
    };
    let efficiency = efficiency_from_level(analytics.summary.average_daily_level);

    let mut insights = Vec::new();
    if efficiency >= 80.0 {
        insights.push("Excellent water management! System is operating efficiently.".to_string());
    } else if efficiency >= 70.0 {
        insights.push("Good water usage patterns. Minor optimizations possible.".to_string());
    } else {
        insights.push(
            "Water usage can be optimized. Consider reviewing consumption patterns.".to_string(),
        );
    }
    if saved > 100.0 {
        insights.push(format!("You've saved {saved:.0}L compared to baseline usage."));
    }
    if avg_daily < 500.0 {
        insights.push("Daily consumption is below average. Great conservation effort!".to_string());
    } else if avg_daily > 800.0 {
        insights.push("Daily consumption is high. Look for ways to reduce usage.".to_string());
    }

    ConservationReport {
        period,
        days,
        total_usage_liters: round_to(total, 1),
        average_daily_liters: round_to(avg_daily, 1),
        water_saved_liters: round_to(saved, 1),
        savings_percent: round_to(savings_percent, 1),
        efficiency_percent: round_to(efficiency, 1),
        insights,
        explanation: EXPLANATION,
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{DailySummary, Period};
    use chrono::TimeZone;

    fn analytics(total: f64, avg_level: f64) -> DailyAnalytics {
        DailyAnalytics {
            period: Period {
                start_date: "2025-01-08".into(),
                end_date: "2025-01-15".into(),
                days: 7,
            },
            summary: DailySummary {
                total_water_flow_liters: total,
                average_daily_level: avg_level,
                total_readings: 10,
            },
            daily_data: Vec::new(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn only_weekly_selects_seven_days() {
        assert_eq!(ReportPeriod::parse(None).days(), 7);
        assert_eq!(ReportPeriod::parse(None).name(), "weekly");
        assert_eq!(ReportPeriod::parse(Some("weekly")).days(), 7);
        assert_eq!(ReportPeriod::parse(Some("daily")).days(), 1);
        assert_eq!(ReportPeriod::parse(Some("monthly")).days(), 1);
        assert_eq!(ReportPeriod::parse(Some("monthly")).name(), "monthly");
    }

    #[test]
    fn efficiency_tiers_are_clamped() {
        assert_eq!(efficiency_from_level(100.0), 95.0);
        assert_eq!(efficiency_from_level(60.0), 85.0);
        assert_eq!(efficiency_from_level(50.0), 75.0);
        assert_eq!(efficiency_from_level(0.0), 50.0);
    }

    #[test]
    fn weekly_report_computes_savings() {
        let report = build_report(ReportPeriod::parse(None), &analytics(7000.0, 65.0), now());
        assert_eq!(report.days, 7);
        assert_eq!(report.average_daily_liters, 1000.0);
        assert_eq!(report.water_saved_liters, 1050.0);
        assert_eq!(report.savings_percent, 13.0);
        assert_eq!(report.efficiency_percent, 86.3);
        assert_eq!(report.insights.len(), 3);
        assert!(report.insights[1].contains("1050L"));
        assert!(report.insights[2].contains("high"));
    }

    #[test]
    fn empty_history_has_zero_savings() {
        let period = ReportPeriod::parse(Some("daily"));
        let report = build_report(period, &analytics(0.0, 0.0), now());
        assert_eq!(report.savings_percent, 0.0);
        assert_eq!(report.efficiency_percent, 50.0);
        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["period"], "daily");
        assert_eq!(
            json["explanation"]["method"],
            "Simple comparison with 15% higher baseline consumption"
        );
    }
}
