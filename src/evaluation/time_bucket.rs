//! Time Bucketing
//!
//! Derive a coarser timestamp from the scheduling time so metrics can be
//! grouped over time. Fixed-size frequencies (day and finer) are floored
//! relative to the Unix epoch in UTC. Calendar frequencies (week, month,
//! quarter, year) map to the start of their enclosing period.

use chrono::{
    DateTime, Datelike, Days, DurationRound, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc,
};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{EvalError, Result};
use crate::models::{format_timestamp, PredictionTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarUnit {
    /// Monday-starting weeks
    Week,
    Month,
    Quarter,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    /// Fixed duration, floored
    Fixed(TimeDelta),
    /// Calendar period, mapped to its first instant
    Calendar(CalendarUnit),
}

/// Parsed frequency alias such as `H`, `15min`, `D` or `M`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frequency {
    alias: String,
    kind: BucketKind,
}

fn alias_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)?([A-Za-z]+)$").expect("valid frequency regex"))
}

impl FromStr for Frequency {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || EvalError::InvalidFrequency(s.to_string());
        let caps = alias_regex().captures(s.trim()).ok_or_else(invalid)?;

        let multiple: i64 = match caps.get(1) {
            Some(m) => m.as_str().parse().map_err(|_| invalid())?,
            None => 1,
        };
        if multiple < 1 {
            return Err(invalid());
        }

        let unit = &caps[2];
        let fixed = match unit {
            "S" | "s" => Some(TimeDelta::try_seconds(multiple)),
            "T" | "min" => Some(TimeDelta::try_minutes(multiple)),
            "H" | "h" => Some(TimeDelta::try_hours(multiple)),
            "D" => Some(TimeDelta::try_days(multiple)),
            _ => None,
        };

        let kind = match fixed {
            Some(delta) => BucketKind::Fixed(delta.ok_or_else(invalid)?),
            None => {
                let calendar = match unit {
                    "W" => CalendarUnit::Week,
                    "M" | "MS" => CalendarUnit::Month,
                    "Q" | "QS" => CalendarUnit::Quarter,
                    "Y" | "YS" | "A" | "AS" => CalendarUnit::Year,
                    _ => return Err(invalid()),
                };
                // Multi-period calendar buckets have no single anchor
                if multiple != 1 {
                    return Err(invalid());
                }
                BucketKind::Calendar(calendar)
            }
        };

        Ok(Self {
            alias: s.trim().to_string(),
            kind,
        })
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.alias)
    }
}

impl Frequency {
    /// Name of the derived column: the alias if given, else `datetime_<freq>`
    pub fn column_name(&self, alias: Option<&str>) -> String {
        match alias {
            Some(a) => a.to_string(),
            None => format!("datetime_{}", self.alias),
        }
    }

    /// Start of the bucket enclosing `ts`
    pub fn bucket_start(&self, ts: &DateTime<Utc>) -> Result<DateTime<Utc>> {
        let out_of_range = || EvalError::InvalidTimestamp {
            column: format!("datetime_{}", self.alias),
            value: format_timestamp(ts),
        };

        match self.kind {
            BucketKind::Fixed(delta) => ts.duration_trunc(delta).map_err(|_| out_of_range()),
            BucketKind::Calendar(unit) => {
                let date = ts.date_naive();
                let start = match unit {
                    CalendarUnit::Week => date.checked_sub_days(Days::new(
                        date.weekday().num_days_from_monday() as u64,
                    )),
                    CalendarUnit::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1),
                    CalendarUnit::Quarter => {
                        NaiveDate::from_ymd_opt(date.year(), (date.month0() / 3) * 3 + 1, 1)
                    }
                    CalendarUnit::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1),
                };
                start
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|naive| Utc.from_utc_datetime(&naive))
                    .ok_or_else(out_of_range)
            }
        }
    }
}

/// Bucket a timestamp column at `frequency`
///
/// Returns the derived column name and one bucket start per input timestamp.
pub fn bucket(
    timestamps: &[DateTime<Utc>],
    frequency: &str,
    alias: Option<&str>,
) -> Result<(String, Vec<DateTime<Utc>>)> {
    let freq: Frequency = frequency.parse()?;
    let buckets = timestamps
        .iter()
        .map(|ts| freq.bucket_start(ts))
        .collect::<Result<Vec<_>>>()?;
    Ok((freq.column_name(alias), buckets))
}

/// Copy of `table` with the bucket column added
///
/// An alias naming an existing column (including id, `model_set` or the
/// timestamp column) overwrites that column in the copy.
pub fn with_time_bucket(
    table: &PredictionTable,
    frequency: &str,
    alias: Option<&str>,
) -> Result<(PredictionTable, String)> {
    let timestamps: Vec<DateTime<Utc>> = table.records.iter().map(|r| r.scheduled_at).collect();
    let (name, buckets) = bucket(&timestamps, frequency, alias)?;

    let mut derived = table.clone();
    if name == derived.timestamp_column {
        for (record, start) in derived.records.iter_mut().zip(buckets) {
            record.scheduled_at = start;
        }
    } else {
        derived.set_column(&name, buckets.iter().map(format_timestamp).collect());
    }
    Ok((derived, name))
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse a timestamp string; values without an offset are taken as UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PredictionRecord;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn start_of(freq: &str, ts: DateTime<Utc>) -> DateTime<Utc> {
        freq.parse::<Frequency>().unwrap().bucket_start(&ts).unwrap()
    }

    #[test]
    fn test_floor_hour_and_day() {
        let ts = utc(2023, 1, 1, 10, 45, 0);
        assert_eq!(start_of("H", ts), utc(2023, 1, 1, 10, 0, 0));
        assert_eq!(start_of("D", ts), utc(2023, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_floor_minutes_and_multiples() {
        let ts = utc(2023, 1, 1, 10, 47, 31);
        assert_eq!(start_of("T", ts), utc(2023, 1, 1, 10, 47, 0));
        assert_eq!(start_of("min", ts), utc(2023, 1, 1, 10, 47, 0));
        assert_eq!(start_of("15min", ts), utc(2023, 1, 1, 10, 45, 0));
        assert_eq!(start_of("S", ts), ts);
        assert_eq!(start_of("2H", ts), utc(2023, 1, 1, 10, 0, 0));
        assert_eq!(start_of("3H", ts), utc(2023, 1, 1, 9, 0, 0));
    }

    #[test]
    fn test_calendar_periods() {
        // 2023-05-17 is a Wednesday
        let ts = utc(2023, 5, 17, 18, 30, 0);
        assert_eq!(start_of("W", ts), utc(2023, 5, 15, 0, 0, 0));
        assert_eq!(start_of("M", ts), utc(2023, 5, 1, 0, 0, 0));
        assert_eq!(start_of("Q", ts), utc(2023, 4, 1, 0, 0, 0));
        assert_eq!(start_of("Y", ts), utc(2023, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_week_starts_monday_across_month_boundary() {
        // Sunday belongs to the week starting the previous Monday
        let ts = utc(2023, 10, 1, 12, 0, 0);
        assert_eq!(start_of("W", ts), utc(2023, 9, 25, 0, 0, 0));
    }

    #[test]
    fn test_invalid_frequencies() {
        for bad in ["", "X", "2M", "0H", "H2", "1.5H"] {
            assert!(
                matches!(bad.parse::<Frequency>(), Err(EvalError::InvalidFrequency(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_bucket_column_name() {
        let (name, buckets) = bucket(&[utc(2023, 1, 1, 10, 45, 0)], "H", None).unwrap();
        assert_eq!(name, "datetime_H");
        assert_eq!(buckets, vec![utc(2023, 1, 1, 10, 0, 0)]);

        let (name, _) = bucket(&[], "D", Some("race_day")).unwrap();
        assert_eq!(name, "race_day");
    }

    #[test]
    fn test_with_time_bucket_leaves_input_untouched() {
        let table = PredictionTable::new(vec![PredictionRecord::new(
            "r1",
            utc(2023, 1, 1, 10, 45, 0),
            "test",
            1.0,
            1.0,
        )]);
        let (derived, name) = with_time_bucket(&table, "H", None).unwrap();

        assert_eq!(name, "datetime_H");
        assert!(table.extra_columns.is_empty());
        assert_eq!(derived.records[0].extra[&name], "2023-01-01T10:00:00Z");
    }

    #[test]
    fn test_alias_overwrites_builtin_columns() {
        let table = PredictionTable::new(vec![
            PredictionRecord::new("r1", utc(2023, 1, 1, 10, 45, 0), "train", 1.0, 1.0),
            PredictionRecord::new("r2", utc(2023, 1, 1, 11, 5, 0), "test", 1.0, 1.0),
        ]);

        let (derived, name) = with_time_bucket(&table, "H", Some("model_set")).unwrap();
        assert_eq!(name, "model_set");
        assert!(derived.extra_columns.is_empty());
        assert_eq!(derived.records[0].model_set, "2023-01-01T10:00:00Z");
        assert_eq!(derived.records[1].model_set, "2023-01-01T11:00:00Z");
        assert_eq!(table.records[0].model_set, "train");

        let (derived, _) = with_time_bucket(&table, "D", Some("scheduleDateTime")).unwrap();
        assert_eq!(derived.records[1].scheduled_at, utc(2023, 1, 1, 0, 0, 0));
        assert_eq!(
            derived.value(&derived.records[1], "scheduleDateTime").as_deref(),
            Some("2023-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = utc(2023, 1, 1, 10, 45, 0);
        assert_eq!(parse_timestamp("2023-01-01T10:45:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01 10:45:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01 10:45:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01 11:45:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01 10:45"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01"), Some(utc(2023, 1, 1, 0, 0, 0)));
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
