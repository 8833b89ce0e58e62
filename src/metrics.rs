use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::detector::Alert;
use crate::state::Reading;

/// Metrics registry for the service scraped by Prometheus.
#[derive(Clone)]
pub struct AppMetrics {
    registry: Arc<Registry>,
    ingest: IngestMetrics,
    tank: TankMetrics,
    alert_counters: AlertCounters,
}

impl AppMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new_custom(Some("tankmon".into()), None)?);

        let ingest = IngestMetrics::register(&registry)?;
        let tank = TankMetrics::register(&registry)?;
        let alert_counters = AlertCounters::register(&registry)?;

        Ok(Self {
            registry,
            ingest,
            tank,
            alert_counters,
        })
    }

    /// Count an accepted reading and publish it as the tank's current state.
    pub fn record_reading(&self, site: &str, reading: &Reading) {
        let tank = sanitize_label(&reading.tank_id);
        let labels = &[site, tank.as_str()];
        self.ingest.readings_total.with_label_values(labels).inc();
        self.tank
            .water_level_percent
            .with_label_values(labels)
            .set(reading.water_level_percent);
        self.tank
            .flow_rate_lpm
            .with_label_values(labels)
            .set(reading.flow_rate_lpm);
    }

    pub fn observe_ingest_duration(&self, site: &str, duration: Duration) {
        self.ingest
            .duration
            .with_label_values(&[site])
            .observe(duration.as_secs_f64());
    }

    pub fn record_alerts(&self, site: &str, alerts: &[Alert]) {
        for alert in alerts {
            self.alert_counters
                .alerts_total
                .with_label_values(&[site, alert.kind.as_str(), alert.priority.label()])
                .inc();
        }
    }

    pub fn encode(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[derive(Clone)]
struct IngestMetrics {
    readings_total: IntCounterVec,
    duration: HistogramVec,
}

impl IngestMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let readings_total = IntCounterVec::new(
            Opts::new("readings_ingested_total", "Readings accepted per tank"),
            &["site", "tank"],
        )?;
        registry.register(Box::new(readings_total.clone()))?;

        let duration = HistogramVec::new(
            HistogramOpts::new(
                "ingest_duration_seconds",
                "Time spent storing and evaluating one reading",
            ),
            &["site"],
        )?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            readings_total,
            duration,
        })
    }
}

#[derive(Clone)]
struct TankMetrics {
    water_level_percent: GaugeVec,
    flow_rate_lpm: GaugeVec,
}

impl TankMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let water_level_percent = GaugeVec::new(
            Opts::new(
                "tank_water_level_percent",
                "Water level from the most recent reading",
            ),
            &["site", "tank"],
        )?;
        registry.register(Box::new(water_level_percent.clone()))?;

        let flow_rate_lpm = GaugeVec::new(
            Opts::new(
                "tank_flow_rate_lpm",
                "Flow rate in L/min from the most recent reading",
            ),
            &["site", "tank"],
        )?;
        registry.register(Box::new(flow_rate_lpm.clone()))?;

        Ok(Self {
            water_level_percent,
            flow_rate_lpm,
        })
    }
}

#[derive(Clone)]
struct AlertCounters {
    alerts_total: IntCounterVec,
}

impl AlertCounters {
    fn register(registry: &Registry) -> Result<Self> {
        let alerts_total = IntCounterVec::new(
            Opts::new(
                "alerts_total",
                "Total emitted alerts grouped by kind and priority",
            ),
            &["site", "kind", "priority"],
        )?;
        registry.register(Box::new(alerts_total.clone()))?;
        Ok(Self { alerts_total })
    }
}

fn sanitize_label(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == ':' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::AnomalyDetector;

    fn reading(tank: &str, level: f64, flow: f64) -> Reading {
        Reading {
            device_id: "SENSOR-001".into(),
            tank_id: tank.into(),
            water_level_percent: level,
            flow_rate_lpm: flow,
            timestamp: "2025-01-15T12:00:00Z".into(),
        }
    }

    #[test]
    fn reading_metrics_sanitize_tank_label() {
        let metrics = AppMetrics::new().expect("metrics");
        metrics.record_reading("local", &reading("TANK-MAIN/roof", 42.5, 3.0));
        metrics.record_reading("local", &reading("TANK-MAIN/roof", 41.0, 2.0));

        let output = metrics.encode().expect("encode");
        let counter = output.lines().find(|line| {
            line.starts_with("tankmon_readings_ingested_total")
                && line.contains("tank=\"TANK_MAIN_roof\"")
                && line.trim_end().ends_with(" 2")
        });
        assert!(counter.is_some(), "ingest counter missing: {output}");
        let level = output.lines().find(|line| {
            line.starts_with("tankmon_tank_water_level_percent") && line.trim_end().ends_with(" 41")
        });
        assert!(level.is_some(), "level gauge missing: {output}");
    }

    #[test]
    fn alerts_are_counted_by_kind_and_priority() {
        let metrics = AppMetrics::new().expect("metrics");
        let analysis = AnomalyDetector::default().evaluate(&reading("TANK-1", 97.0, 25.0));
        metrics.record_alerts("local", &analysis.alerts);

        let output = metrics.encode().expect("encode");
        let alert_lines: Vec<&str> = output
            .lines()
            .filter(|line| line.starts_with("tankmon_alerts_total"))
            .collect();
        assert!(alert_lines.iter().any(|line| {
            line.contains("kind=\"overflow\"") && line.contains("priority=\"Critical\"")
        }));
        assert!(alert_lines.iter().any(|line| line.contains("kind=\"high_flow\"")));
    }

    #[test]
    fn sanitize_replaces_disallowed_characters() {
        assert_eq!(sanitize_label("a-b c:d_e"), "a_b_c:d_e");
    }
}
