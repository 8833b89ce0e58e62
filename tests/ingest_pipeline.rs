use tankmon::app::AppContext;
use tankmon::config::AppConfig;
use tankmon::metrics::AppMetrics;
use tankmon::query::Limit;
use tankmon::{AlertKind, Priority, Reading, Status};

fn context() -> AppContext {
    AppContext::new(AppConfig::default(), AppMetrics::new().expect("metrics"))
}

fn reading(level: f64, flow: f64) -> Reading {
    Reading {
        device_id: "SENSOR-001".into(),
        tank_id: "TANK-001".into(),
        water_level_percent: level,
        flow_rate_lpm: flow,
        timestamp: "2024-01-15T10:30:00Z".into(),
    }
}

#[tokio::test]
async fn overflow_reading_reports_overflow_risk() {
    let ctx = context();
    let outcome = ctx.ingest_reading(reading(96.0, 8.5)).await.expect("ingest");

    assert_eq!(outcome.analysis.status, Status::OverflowRisk);
    assert!(outcome.analysis.alerts_count >= 1);
    let overflow: Vec<_> = outcome
        .analysis
        .alerts
        .iter()
        .filter(|a| a.kind == AlertKind::Overflow)
        .collect();
    assert_eq!(overflow.len(), 1);
    assert_eq!(overflow[0].priority, Priority::Critical);
}

#[tokio::test]
async fn low_water_reading_is_critical() {
    let ctx = context();
    let outcome = ctx.ingest_reading(reading(8.0, 1.0)).await.expect("ingest");

    let low = outcome
        .analysis
        .alerts
        .iter()
        .find(|a| a.kind == AlertKind::LowWater)
        .expect("low water alert");
    assert_eq!(low.priority_label, "Critical");
    // Leakage fires first in rule order and owns the status.
    assert_eq!(outcome.analysis.status, Status::LeakageDetected);
}

#[tokio::test]
async fn latest_returns_inserted_fields_unchanged() {
    let ctx = context();
    let input = reading(42.17, 3.5);
    ctx.ingest_reading(input.clone()).await.expect("ingest");

    let page = ctx.latest(Limit::clamped(1)).await;
    assert_eq!(page.count, 1);
    assert_eq!(page.readings[0], input);
}

#[tokio::test]
async fn active_alerts_respect_limit() {
    let ctx = context();
    for _ in 0..4 {
        // overflow + high flow per reading
        ctx.ingest_reading(reading(97.0, 25.0)).await.expect("ingest");
    }
    assert_eq!(ctx.alerts.len().await, 8);

    let page = ctx.alerts(Limit::clamped(5), true).await;
    assert!(page.count <= 5);
    assert_eq!(page.count, page.alerts.len());
    assert!(page.alerts.iter().all(|a| !a.acknowledged));

    let all = ctx.alerts(Limit::clamped(100), false).await;
    assert_eq!(all.count, 8);
}

#[tokio::test]
async fn concurrent_ingest_loses_nothing() {
    let ctx = context();
    let mut handles = Vec::new();
    for i in 0..32 {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            ctx.ingest_reading(reading(50.0 + f64::from(i % 10), 10.0))
                .await
                .expect("ingest")
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.expect("join").record_id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 32);
    assert_eq!(ctx.readings.len().await, 32);
}

#[tokio::test]
async fn ingest_updates_metrics() {
    let ctx = context();
    ctx.ingest_reading(reading(97.0, 3.0)).await.expect("ingest");
    let output = ctx.metrics.encode().expect("encode");
    assert!(output.contains("tankmon_readings_ingested_total"));
    assert!(output.contains("kind=\"overflow\""));
}
