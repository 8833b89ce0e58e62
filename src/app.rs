use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::analytics::{AggregationEngine, DailyAnalytics, HourlyPattern, WeeklySummary};
use crate::config::AppConfig;
use crate::conservation::{self, ConservationReport, ReportPeriod};
use crate::controls::ControlPanel;
use crate::dashboard::{self, LiveDashboard};
use crate::detector::{Alert, AlertKind, Analysis, AnomalyDetector};
use crate::forecasting::{self, ConsumptionHistory, ShortagePrediction};
use crate::metrics::AppMetrics;
use crate::query::{DayWindow, Limit};
use crate::state::{AlertLog, Reading, ReadingId, ReadingStore, StoreError};

/// Result of accepting one reading.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub success: bool,
    pub record_id: ReadingId,
    pub device_id: String,
    pub tank_id: String,
    pub timestamp: String,
    pub analysis: Analysis,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsPage {
    pub count: usize,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadingsPage {
    pub count: usize,
    pub readings: Vec<Reading>,
}

/// Shared application context passed to HTTP handlers.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub metrics: AppMetrics,
    pub readings: ReadingStore,
    pub alerts: AlertLog,
    pub controls: ControlPanel,
    detector: Arc<AnomalyDetector>,
    analytics: AggregationEngine,
}

impl AppContext {
    pub fn new(config: AppConfig, metrics: AppMetrics) -> Self {
        let readings = ReadingStore::new();
        let detector = AnomalyDetector::new(config.alerts.clone());
        Self {
            config: Arc::new(config),
            metrics,
            analytics: AggregationEngine::new(readings.clone()),
            readings,
            alerts: AlertLog::new(),
            controls: ControlPanel::new(),
            detector: Arc::new(detector),
        }
    }

    pub fn site(&self) -> &str {
        &self.config.site
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    /// Store a validated reading, evaluate it and record any alerts.
    pub async fn ingest_reading(&self, reading: Reading) -> Result<IngestOutcome, StoreError> {
        let started = Instant::now();

        let record_id = match self.readings.insert(reading.clone()).await {
            Ok(id) => id,
            Err(err) => {
                error!(device_id = %reading.device_id, error = %err, "failed to store reading");
                return Err(err);
            }
        };

        let analysis = self.detector.evaluate(&reading);
        if !analysis.alerts.is_empty() {
            let kinds: Vec<AlertKind> = analysis.alerts.iter().map(|a| a.kind).collect();
            warn!(
                device_id = %reading.device_id,
                tank_id = %reading.tank_id,
                status = ?analysis.status,
                kinds = ?kinds,
                "reading raised alerts"
            );
            self.alerts.append(analysis.alerts.iter().cloned()).await;
        }

        self.metrics.record_reading(self.site(), &reading);
        self.metrics.record_alerts(self.site(), &analysis.alerts);
        self.metrics
            .observe_ingest_duration(self.site(), started.elapsed());

        info!(
            record_id = %record_id,
            device_id = %reading.device_id,
            level = reading.water_level_percent,
            flow = reading.flow_rate_lpm,
            "ingested reading"
        );

        Ok(IngestOutcome {
            success: true,
            record_id,
            device_id: reading.device_id,
            tank_id: reading.tank_id,
            timestamp: reading.timestamp,
            analysis,
        })
    }

    pub async fn latest(&self, limit: Limit) -> ReadingsPage {
        let readings = self.readings.latest(limit.get()).await;
        ReadingsPage {
            count: readings.len(),
            readings,
        }
    }

    pub async fn daily_analytics(&self, window: DayWindow) -> DailyAnalytics {
        self.analytics.daily_analytics(window).await
    }

    pub async fn weekly_summary(&self) -> WeeklySummary {
        self.analytics.weekly_summary().await
    }

    pub async fn hourly_pattern(&self) -> HourlyPattern {
        self.analytics.hourly_pattern().await
    }

    pub async fn alerts(&self, limit: Limit, active_only: bool) -> AlertsPage {
        let alerts = if active_only {
            let mut active = self.alerts.active().await;
            active.truncate(limit.get());
            active
        } else {
            self.alerts.all(limit.get()).await
        };
        AlertsPage {
            count: alerts.len(),
            alerts,
        }
    }

    pub async fn predict_shortage(&self) -> ShortagePrediction {
        self.predict_shortage_at(Utc::now()).await
    }

    /// Reads the store several times; inserts landing in between may be
    /// reflected in some inputs and not others.
    pub async fn predict_shortage_at(&self, now: DateTime<Utc>) -> ShortagePrediction {
        let latest = self.readings.latest(1).await;
        let Some(latest) = latest.first() else {
            return ShortagePrediction::NoData;
        };
        let week = self
            .analytics
            .daily_analytics_at(DayWindow::week(), now)
            .await;
        let today = self
            .analytics
            .daily_analytics_at(DayWindow::clamped(1), now)
            .await;
        let history = ConsumptionHistory {
            week_total: week.summary.total_water_flow_liters,
            today_total: today.summary.total_water_flow_liters,
        };
        forecasting::predict(Some(latest), history, now)
    }

    pub async fn live_dashboard(&self) -> LiveDashboard {
        self.live_dashboard_at(Utc::now()).await
    }

    pub async fn live_dashboard_at(&self, now: DateTime<Utc>) -> LiveDashboard {
        let latest = self.readings.latest_stored(1).await.into_iter().next();
        let active = self.alerts.active().await;
        dashboard::build_dashboard(
            latest,
            &self.detector,
            active,
            self.config.sensors.stale_after,
            now,
        )
    }

    pub async fn conservation_report(&self, period: ReportPeriod) -> ConservationReport {
        let now = Utc::now();
        let analytics = self
            .analytics
            .daily_analytics_at(period.window(), now)
            .await;
        conservation::build_report(period, &analytics, now)
    }

    /// Drop all readings, alerts and control changes.
    pub async fn reset(&self) {
        self.readings.clear().await;
        self.alerts.clear().await;
        self.controls.reset().await;
        info!("cleared readings and alerts");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Status;

    fn context() -> AppContext {
        AppContext::new(AppConfig::default(), AppMetrics::new().expect("metrics"))
    }

    fn reading(level: f64, flow: f64) -> Reading {
        Reading {
            device_id: "SENSOR-001".into(),
            tank_id: "TANK-MAIN".into(),
            water_level_percent: level,
            flow_rate_lpm: flow,
            timestamp: "2025-01-15T12:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn ingest_stores_and_records_alerts() {
        let ctx = context();
        let outcome = ctx.ingest_reading(reading(97.0, 3.0)).await.expect("ingest");
        assert!(outcome.success);
        assert_eq!(outcome.analysis.status, Status::OverflowRisk);
        assert_eq!(ctx.readings.len().await, 1);
        assert_eq!(ctx.alerts.len().await, outcome.analysis.alerts_count);

        let json = serde_json::to_value(&outcome).expect("json");
        assert!(json["record_id"].as_str().expect("id").starts_with("rd_"));
        assert_eq!(json["analysis"]["status"], "overflow_risk");
    }

    #[tokio::test]
    async fn quiet_reading_records_no_alerts() {
        let ctx = context();
        let outcome = ctx.ingest_reading(reading(50.0, 10.0)).await.expect("ingest");
        assert_eq!(outcome.analysis.alerts_count, 0);
        assert_eq!(ctx.alerts.len().await, 0);
    }

    #[tokio::test]
    async fn dashboard_does_not_record_alerts() {
        let ctx = context();
        ctx.ingest_reading(reading(5.0, 0.0)).await.expect("ingest");
        let before = ctx.alerts.len().await;
        let dash = ctx.live_dashboard().await;
        assert_eq!(dash.status, Status::Critical);
        assert_eq!(ctx.alerts.len().await, before);
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let ctx = context();
        ctx.ingest_reading(reading(97.0, 0.0)).await.expect("ingest");
        ctx.controls.set_auto_mode(false).await;
        ctx.reset().await;
        assert!(ctx.readings.is_empty().await);
        assert_eq!(ctx.alerts.len().await, 0);
        assert!(ctx.controls.snapshot().await.auto_mode);
    }
}
