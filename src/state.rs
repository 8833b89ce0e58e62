use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::detector::Alert;

/// Wire format for every timestamp exchanged with clients (UTC, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a canonical `YYYY-MM-DDTHH:MM:SSZ` timestamp.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

pub(crate) fn serialize_timestamp<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_timestamp(*ts))
}

/// One validated sensor sample. Ranges and id lengths are enforced at the
/// HTTP boundary before a reading ever reaches the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub device_id: String,
    pub tank_id: String,
    pub water_level_percent: f64,
    pub flow_rate_lpm: f64,
    /// Sensor-side timestamp in `TIMESTAMP_FORMAT`. Aggregation buckets on this
    /// value, while "latest" queries use the store's insertion instant.
    pub timestamp: String,
}

impl Reading {
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }
}

/// Opaque, monotonically increasing record identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadingId(u64);

impl fmt::Display for ReadingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rd_{}", self.0)
    }
}

impl Serialize for ReadingId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone)]
pub struct StoredReading {
    pub id: ReadingId,
    pub inserted_at: DateTime<Utc>,
    pub reading: Reading,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("reading id sequence exhausted")]
    IdsExhausted,
}

#[derive(Default)]
struct ReadingLog {
    next_id: u64,
    rows: Vec<StoredReading>,
}

/// Append-only in-memory time series of readings.
///
/// Cloning is cheap and every clone observes the same underlying sequence.
#[derive(Clone, Default)]
pub struct ReadingStore {
    inner: Arc<RwLock<ReadingLog>>,
}

impl ReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, reading: Reading) -> Result<ReadingId, StoreError> {
        self.insert_at(reading, Utc::now()).await
    }

    /// Insert with an explicit insertion instant (seeding and tests).
    pub async fn insert_at(
        &self,
        reading: Reading,
        inserted_at: DateTime<Utc>,
    ) -> Result<ReadingId, StoreError> {
        let mut guard = self.inner.write().await;
        let id = ReadingId(guard.next_id);
        guard.next_id = guard.next_id.checked_add(1).ok_or(StoreError::IdsExhausted)?;
        guard.rows.push(StoredReading {
            id,
            inserted_at,
            reading,
        });
        Ok(id)
    }

    /// Up to `n` readings, most recently inserted first.
    pub async fn latest(&self, n: usize) -> Vec<Reading> {
        self.latest_stored(n)
            .await
            .into_iter()
            .map(|row| row.reading)
            .collect()
    }

    pub async fn latest_stored(&self, n: usize) -> Vec<StoredReading> {
        let guard = self.inner.read().await;
        let mut rows: Vec<&StoredReading> = guard.rows.iter().collect();
        rows.sort_by(|a, b| (b.inserted_at, b.id).cmp(&(a.inserted_at, a.id)));
        rows.into_iter().take(n).cloned().collect()
    }

    /// Readings whose insertion instant lies in `[start, end]`, oldest first.
    pub async fn range_by_insertion_time(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Reading> {
        let guard = self.inner.read().await;
        let mut rows: Vec<&StoredReading> = guard
            .rows
            .iter()
            .filter(|row| row.inserted_at >= start && row.inserted_at <= end)
            .collect();
        rows.sort_by_key(|row| (row.inserted_at, row.id));
        rows.into_iter().map(|row| row.reading.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every reading. Ids keep increasing across resets.
    pub async fn clear(&self) {
        self.inner.write().await.rows.clear();
    }
}

/// Every alert produced during the process lifetime.
#[derive(Clone, Default)]
pub struct AlertLog {
    inner: Arc<RwLock<Vec<Alert>>>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, alerts: impl IntoIterator<Item = Alert>) {
        let mut guard = self.inner.write().await;
        guard.extend(alerts);
    }

    /// Newest first by alert timestamp; ties keep insertion order.
    /// Callers clamp `limit`.
    pub async fn all(&self, limit: usize) -> Vec<Alert> {
        let mut alerts = self.inner.read().await.clone();
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        alerts.truncate(limit);
        alerts
    }

    /// Unacknowledged alerts in insertion order.
    pub async fn active(&self) -> Vec<Alert> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|alert| !alert.acknowledged)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}
