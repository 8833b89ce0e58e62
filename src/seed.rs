use chrono::{DateTime, Duration, SubsecRound, Timelike, Utc};
use tracing::info;

use crate::state::{Reading, ReadingStore, StoreError, format_timestamp};

pub const SAMPLE_DEVICE: &str = "SENSOR-001";
pub const SAMPLE_TANK: &str = "TANK-MAIN";
const SAMPLE_HOURS: i64 = 7 * 24;

/// Synthetic reading for one hour of a typical day: a morning and an
/// evening draw peak over a quiet baseline.
pub fn sample_reading(timestamp: DateTime<Utc>) -> Reading {
    let hour = timestamp.hour();
    let h = f64::from(hour);
    let (level, flow) = match hour {
        6..=9 => (60.0 + (h - 6.0) * 5.0, 8.5 + f64::from(hour % 3)),
        18..=21 => (70.0 - (h - 18.0) * 5.0, 7.0 + f64::from(hour % 2)),
        _ => (65.0 + f64::from(hour % 10), 2.0 + f64::from(hour % 5) * 0.5),
    };
    Reading {
        device_id: SAMPLE_DEVICE.to_string(),
        tank_id: SAMPLE_TANK.to_string(),
        water_level_percent: level.clamp(10.0, 95.0),
        flow_rate_lpm: flow,
        timestamp: format_timestamp(timestamp),
    }
}

/// Insert a week of hourly readings ending at `now`, oldest first. Each is
/// stored with its own timestamp as the insertion instant.
pub async fn seed_sample_data(
    store: &ReadingStore,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let now = now.trunc_subsecs(0);
    let mut inserted = 0;
    for offset in (0..SAMPLE_HOURS).rev() {
        let ts = now - Duration::hours(offset);
        store.insert_at(sample_reading(ts), ts).await?;
        inserted += 1;
    }
    info!(count = inserted, device_id = SAMPLE_DEVICE, "seeded sample readings");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn morning_and_evening_peaks() {
        let at = |hour| Utc.with_ymd_and_hms(2025, 1, 15, hour, 0, 0).unwrap();
        let morning = sample_reading(at(7));
        assert_eq!(morning.water_level_percent, 65.0);
        assert_eq!(morning.flow_rate_lpm, 9.5);

        let evening = sample_reading(at(21));
        assert_eq!(evening.water_level_percent, 55.0);
        assert_eq!(evening.flow_rate_lpm, 8.0);

        let night = sample_reading(at(3));
        assert_eq!(night.water_level_percent, 68.0);
        assert_eq!(night.flow_rate_lpm, 3.5);
        assert_eq!(night.timestamp, "2025-01-15T03:00:00Z");
    }

    #[tokio::test]
    async fn seeds_a_week_oldest_first() {
        let store = ReadingStore::new();
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let count = seed_sample_data(&store, now).await.expect("seed");
        assert_eq!(count, 168);
        assert_eq!(store.len().await, 168);

        let latest = store.latest(1).await;
        assert_eq!(latest[0].timestamp, "2025-01-15T12:00:00Z");
    }
}
