//! Clamped query parameters. Out-of-range values are pulled into range
//! instead of rejected; non-numeric values fall back to the default.

/// Parses a signed integer, saturating at the `i64` bounds when the digits
/// overflow. Returns `None` for anything that is not an integer.
fn parse_saturating(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    let (negative, digits) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(if negative { i64::MIN } else { i64::MAX })
}

/// Number of trailing days for the daily analytics window, within `[1, 30]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow(u32);

impl DayWindow {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 30;
    pub const DEFAULT: u32 = 7;

    pub fn clamped(days: i64) -> Self {
        Self(days.clamp(Self::MIN, Self::MAX) as u32)
    }

    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(parse_saturating)
            .map(Self::clamped)
            .unwrap_or_default()
    }

    pub const fn week() -> Self {
        Self(Self::DEFAULT)
    }

    pub const fn days(self) -> u32 {
        self.0
    }
}

impl Default for DayWindow {
    fn default() -> Self {
        Self::week()
    }
}

/// Row cap for list endpoints, within `[1, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit(usize);

impl Limit {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 100;
    /// Default page size for the alert list.
    pub const ALERTS_DEFAULT: usize = 50;
    /// Default page size for the latest-readings list.
    pub const READINGS_DEFAULT: usize = 20;

    pub fn clamped(limit: i64) -> Self {
        Self(limit.clamp(Self::MIN, Self::MAX) as usize)
    }

    pub fn parse_or(raw: Option<&str>, default: usize) -> Self {
        raw.and_then(parse_saturating)
            .map(Self::clamped)
            .unwrap_or(Self(default))
    }

    pub const fn get(self) -> usize {
        self.0
    }
}
