use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Accepts RFC 3339 as well as offset-less ISO-8601 timestamps, which are read as local time.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Some(value.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|value| value.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rfc3339_with_offset() {
        let parsed = parse_timestamp("2024-03-01T12:00:00+02:00").unwrap();
        assert_eq!(format_timestamp(parsed), "2024-03-01T10:00:00Z");
    }

    #[test]
    fn parse_naive_iso() {
        assert!(parse_timestamp("2024-03-01T12:00:00.123456").is_some());
    }

    #[test]
    fn reject_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
    }
}
