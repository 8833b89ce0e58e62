//! Calendar-day and hour-of-day rollups over the reading store.
//!
//! Buckets are recomputed from the store on every call. Readings are selected
//! by insertion instant but bucketed by their own sensor timestamp; a reading
//! ingested today with last week's timestamp lands in last week's bucket.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;
use tracing::warn;

use crate::query::DayWindow;
use crate::state::{Reading, ReadingStore};

/// Trailing window used by the weekly summary and the hourly pattern.
pub const WEEK_DAYS: u32 = 7;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Period {
    pub start_date: String,
    pub end_date: String,
    pub days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub total_water_flow_liters: f64,
    /// Mean of the per-day averages, not a reading-weighted mean.
    pub average_daily_level: f64,
    pub total_readings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyUsage {
    pub date: String,
    pub average_water_level: f64,
    pub max_water_level: f64,
    pub min_water_level: f64,
    pub total_flow_liters: f64,
    pub readings_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAnalytics {
    pub period: Period,
    pub summary: DailySummary,
    pub daily_data: Vec<DailyUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumptionDay {
    pub date: String,
    pub liters: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklySummary {
    pub week_start: String,
    pub week_end: String,
    pub total_consumption_liters: f64,
    pub average_daily_consumption: f64,
    pub peak_consumption_day: Option<ConsumptionDay>,
    pub lowest_consumption_day: Option<ConsumptionDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyUsage {
    pub hour: u32,
    pub hour_label: String,
    pub average_flow_lpm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyPattern {
    pub period_days: u32,
    pub hourly_pattern: Vec<HourlyUsage>,
}

#[derive(Debug, Default)]
struct DailyBucket {
    readings_count: usize,
    total_flow: f64,
    min_level: Option<f64>,
    max_level: Option<f64>,
    levels: Vec<f64>,
}

impl DailyBucket {
    fn push(&mut self, reading: &Reading) {
        let level = reading.water_level_percent;
        self.readings_count += 1;
        self.total_flow += reading.flow_rate_lpm;
        self.levels.push(level);
        self.min_level = Some(self.min_level.map_or(level, |min| min.min(level)));
        self.max_level = Some(self.max_level.map_or(level, |max| max.max(level)));
    }

    fn into_usage(self, date: String) -> DailyUsage {
        let average = if self.levels.is_empty() {
            0.0
        } else {
            self.levels.iter().sum::<f64>() / self.levels.len() as f64
        };
        DailyUsage {
            date,
            average_water_level: round_to(average, 1),
            max_water_level: round_to(self.max_level.unwrap_or(0.0), 1),
            min_water_level: round_to(self.min_level.unwrap_or(0.0), 1),
            total_flow_liters: round_to(self.total_flow, 1),
            readings_count: self.readings_count,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct HourBucket {
    total_flow: f64,
    count: usize,
}

/// Read-only view over the store that produces dashboard rollups.
#[derive(Clone)]
pub struct AggregationEngine {
    store: ReadingStore,
}

impl AggregationEngine {
    pub fn new(store: ReadingStore) -> Self {
        Self { store }
    }

    pub async fn daily_analytics(&self, window: DayWindow) -> DailyAnalytics {
        self.daily_analytics_at(window, Utc::now()).await
    }

    pub async fn daily_analytics_at(
        &self,
        window: DayWindow,
        now: DateTime<Utc>,
    ) -> DailyAnalytics {
        let start = now - Duration::days(i64::from(window.days()));
        let readings = self.store.range_by_insertion_time(start, now).await;
        daily_from_readings(&readings, window, start, now)
    }

    pub async fn weekly_summary(&self) -> WeeklySummary {
        self.weekly_summary_at(Utc::now()).await
    }

    pub async fn weekly_summary_at(&self, now: DateTime<Utc>) -> WeeklySummary {
        let daily = self.daily_analytics_at(DayWindow::week(), now).await;
        summarize_week(&daily)
    }

    pub async fn hourly_pattern(&self) -> HourlyPattern {
        self.hourly_pattern_at(Utc::now()).await
    }

    pub async fn hourly_pattern_at(&self, now: DateTime<Utc>) -> HourlyPattern {
        let start = now - Duration::days(i64::from(WEEK_DAYS));
        let readings = self.store.range_by_insertion_time(start, now).await;
        hourly_from_readings(&readings)
    }
}

fn daily_from_readings(
    readings: &[Reading],
    window: DayWindow,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> DailyAnalytics {
    let mut buckets: BTreeMap<String, DailyBucket> = BTreeMap::new();
    for reading in readings {
        let Some(ts) = reading.parsed_timestamp() else {
            warn!(
                device_id = %reading.device_id,
                timestamp = %reading.timestamp,
                "skipping reading with unparsable timestamp"
            );
            continue;
        };
        buckets
            .entry(ts.format(DATE_FORMAT).to_string())
            .or_default()
            .push(reading);
    }

    // BTreeMap iteration yields dates in ascending order.
    let daily_data: Vec<DailyUsage> = buckets
        .into_iter()
        .map(|(date, bucket)| bucket.into_usage(date))
        .collect();

    let total_flow: f64 = daily_data.iter().map(|d| d.total_flow_liters).sum();
    let average_daily_level = if daily_data.is_empty() {
        0.0
    } else {
        daily_data.iter().map(|d| d.average_water_level).sum::<f64>() / daily_data.len() as f64
    };

    DailyAnalytics {
        period: Period {
            start_date: start.format(DATE_FORMAT).to_string(),
            end_date: end.format(DATE_FORMAT).to_string(),
            days: window.days(),
        },
        summary: DailySummary {
            total_water_flow_liters: round_to(total_flow, 1),
            average_daily_level: round_to(average_daily_level, 1),
            total_readings: daily_data.iter().map(|d| d.readings_count).sum(),
        },
        daily_data,
    }
}

fn summarize_week(daily: &DailyAnalytics) -> WeeklySummary {
    let total = daily.summary.total_water_flow_liters;
    if daily.daily_data.is_empty() {
        return WeeklySummary {
            week_start: daily.period.start_date.clone(),
            week_end: daily.period.end_date.clone(),
            total_consumption_liters: 0.0,
            average_daily_consumption: 0.0,
            peak_consumption_day: None,
            lowest_consumption_day: None,
        };
    }

    // Stable sort: among equal totals the later date is the peak and the
    // earlier one the lowest day.
    let mut by_flow: Vec<&DailyUsage> = daily.daily_data.iter().collect();
    by_flow.sort_by(|a, b| a.total_flow_liters.total_cmp(&b.total_flow_liters));
    let to_day = |usage: &DailyUsage| ConsumptionDay {
        date: usage.date.clone(),
        liters: usage.total_flow_liters,
    };

    WeeklySummary {
        week_start: daily.period.start_date.clone(),
        week_end: daily.period.end_date.clone(),
        total_consumption_liters: total,
        average_daily_consumption: round_to(total / daily.daily_data.len() as f64, 1),
        peak_consumption_day: by_flow.last().map(|d| to_day(*d)),
        lowest_consumption_day: by_flow.first().map(|d| to_day(*d)),
    }
}

fn hourly_from_readings(readings: &[Reading]) -> HourlyPattern {
    let mut buckets = [HourBucket::default(); 24];
    for reading in readings {
        let Some(ts) = reading.parsed_timestamp() else {
            warn!(
                device_id = %reading.device_id,
                timestamp = %reading.timestamp,
                "skipping reading with unparsable timestamp"
            );
            continue;
        };
        let bucket = &mut buckets[ts.hour() as usize];
        bucket.total_flow += reading.flow_rate_lpm;
        bucket.count += 1;
    }

    let hourly_pattern = buckets
        .iter()
        .zip(0u32..)
        .map(|(bucket, hour)| {
            let average = if bucket.count > 0 {
                bucket.total_flow / bucket.count as f64
            } else {
                0.0
            };
            HourlyUsage {
                hour,
                hour_label: format!("{hour:02}:00"),
                average_flow_lpm: round_to(average, 2),
            }
        })
        .collect();

    HourlyPattern {
        period_days: WEEK_DAYS,
        hourly_pattern,
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
