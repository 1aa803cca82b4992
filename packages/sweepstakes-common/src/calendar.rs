use chrono::{Datelike, NaiveDate};
use cosmwasm_std::Timestamp;

use crate::types::DayCode;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// `num_days_from_ce()` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

/// Largest accepted distance from UTC, in minutes (UTC-14:00 .. UTC+14:00).
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

pub fn day_code(date: NaiveDate) -> DayCode {
    date.weekday().into()
}

/// The half-open `[start, end)` window covering `date` in a zone `utc_offset_minutes`
/// ahead of UTC. Returns `None` for dates whose window starts before the Unix epoch.
pub fn day_window(date: NaiveDate, utc_offset_minutes: i32) -> Option<(Timestamp, Timestamp)> {
    let days = i64::from(date.num_days_from_ce()) - UNIX_EPOCH_DAYS_FROM_CE;
    let start = days * SECONDS_PER_DAY - i64::from(utc_offset_minutes) * 60;
    if start < 0 {
        return None;
    }
    let start = u64::try_from(start).ok()?;
    let end = start.checked_add(SECONDS_PER_DAY as u64)?;
    Some((Timestamp::from_seconds(start), Timestamp::from_seconds(end)))
}

/// Calendar date a timestamp falls on in the given zone.
pub fn local_date(timestamp: Timestamp, utc_offset_minutes: i32) -> Option<NaiveDate> {
    let seconds = i64::try_from(timestamp.seconds()).ok()? + i64::from(utc_offset_minutes) * 60;
    let days = seconds.div_euclid(SECONDS_PER_DAY) + UNIX_EPOCH_DAYS_FROM_CE;
    NaiveDate::from_num_days_from_ce_opt(i32::try_from(days).ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_day_window_utc() {
        // 2024-03-04 00:00:00 UTC
        let (start, end) = day_window(date(2024, 3, 4), 0).unwrap();
        assert_eq!(start.seconds(), 1_709_510_400);
        assert_eq!(end.seconds(), 1_709_510_400 + 86_400);
    }

    #[test]
    fn test_day_window_with_offset() {
        // UTC+01:00 midnight is 23:00 UTC of the previous day
        let (start, _) = day_window(date(2024, 3, 4), 60).unwrap();
        assert_eq!(start.seconds(), 1_709_510_400 - 3_600);
    }

    #[test]
    fn test_day_window_before_epoch() {
        assert!(day_window(date(1969, 12, 31), 0).is_none());
        assert!(day_window(date(1970, 1, 1), 60).is_none());
        assert!(day_window(date(1970, 1, 1), 0).is_some());
    }

    #[test]
    fn test_local_date_round_trips_window_edges() {
        let d = date(2024, 3, 4);
        for offset in [-300, 0, 60, 330] {
            let (start, end) = day_window(d, offset).unwrap();
            assert_eq!(local_date(start, offset), Some(d));
            assert_eq!(local_date(end.minus_seconds(1), offset), Some(d));
            assert_eq!(local_date(end, offset), d.succ_opt());
        }
    }

    #[test]
    fn test_day_code() {
        assert_eq!(day_code(date(2024, 3, 4)), DayCode::Monday);
        assert_eq!(day_code(date(2024, 3, 10)), DayCode::Sunday);
    }
}
