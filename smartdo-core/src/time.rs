//! Time utilities: turning model-written deadlines into UTC instants.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse()
        .map_err(|_| anyhow::anyhow!("invalid timezone: {name}"))
}

/// Interpret a naive local datetime in an IANA tz, returning UTC.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant.
pub fn local_to_utc(ndt: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>> {
    let local_dt = tz
        .from_local_datetime(&ndt)
        .earliest()
        .ok_or_else(|| anyhow::anyhow!("nonexistent local time (DST gap?): {ndt} {tz}"))?;
    Ok(local_dt.with_timezone(&Utc))
}

/// Parse a deadline the way models tend to write them.
///
/// Accepts RFC 3339 (offset or `Z`), `YYYY-MM-DD HH:MM[:SS]` with a space or
/// `T`, and a bare date (midnight). Naive forms are read in `tz`.
pub fn parse_deadline_str(raw: &str, tz: Tz) -> Result<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        anyhow::bail!("empty deadline");
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return local_to_utc(ndt, tz);
        }
    }

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ndt) = d.and_hms_opt(0, 0, 0) {
            return local_to_utc(ndt, tz);
        }
    }

    anyhow::bail!("unrecognized deadline format: '{s}'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_naive_in_chicago() {
        // Feb is CST (UTC-6)
        let tz = parse_timezone("America/Chicago").unwrap();
        let utc = parse_deadline_str("2026-02-20 23:59:00", tz).unwrap();
        assert_eq!(utc.to_rfc3339(), "2026-02-21T05:59:00+00:00");
    }

    #[test]
    fn parses_rfc3339_with_z() {
        let utc = parse_deadline_str("2026-03-01T17:00:00Z", Tz::UTC).unwrap();
        assert_eq!(utc.to_rfc3339(), "2026-03-01T17:00:00+00:00");
    }

    #[test]
    fn parses_bare_date_and_t_separator() {
        let d = parse_deadline_str("2026-03-01", Tz::UTC).unwrap();
        assert_eq!(d.to_rfc3339(), "2026-03-01T00:00:00+00:00");
        let t = parse_deadline_str("2026-03-01T09:30", Tz::UTC).unwrap();
        assert_eq!(t.to_rfc3339(), "2026-03-01T09:30:00+00:00");
    }

    #[test]
    fn rejects_garbage_and_bad_tz() {
        assert!(parse_deadline_str("next tuesday", Tz::UTC).is_err());
        assert!(parse_deadline_str("   ", Tz::UTC).is_err());
        assert!(parse_timezone("Mars/Olympus").is_err());
    }
}
