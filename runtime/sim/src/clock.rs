//! Wall-clock timestamps for file metadata
//!
//! Converts [`SystemTime`] to UTC calendar fields using the days-from-civil
//! algorithm, so no calendar crate is needed.

use std::time::{SystemTime, UNIX_EPOCH};

const SECS_PER_DAY: i64 = 86_400;

/// UTC calendar time, as the filesystem device reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub year: u16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
}

impl Timestamp {
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => after.as_secs() as i64,
            Err(before) => -(before.duration().as_secs() as i64),
        };
        Self::from_unix(secs)
    }

    pub fn from_unix(secs: i64) -> Self {
        let days = secs.div_euclid(SECS_PER_DAY);
        let rem = secs.rem_euclid(SECS_PER_DAY);
        let (year, month, day) = civil_from_days(days);
        Self {
            year: year.clamp(0, u16::MAX as i64) as u16,
            month: month as u16,
            day: day as u16,
            hour: (rem / 3600) as u16,
            minute: (rem % 3600 / 60) as u16,
            second: (rem % 60) as u16,
        }
    }

    /// `[year, month, day, hour, minute, second]`
    pub fn words(&self) -> [u16; 6] {
        [self.year, self.month, self.day, self.hour, self.minute, self.second]
    }
}

/// Days since 1970-01-01 to (year, month, day)
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe as i64 + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch() {
        let t = Timestamp::from_unix(0);
        assert_eq!(t.words(), [1970, 1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_leap_day() {
        // 2000-02-29T12:34:56Z
        let t = Timestamp::from_unix(951_782_400 + 12 * 3600 + 34 * 60 + 56);
        assert_eq!(t.words(), [2000, 2, 29, 12, 34, 56]);
    }

    #[test]
    fn test_end_of_year() {
        // 2023-12-31T23:59:59Z
        let t = Timestamp::from_unix(1_704_067_199);
        assert_eq!(t.words(), [2023, 12, 31, 23, 59, 59]);
        assert_eq!(Timestamp::from_unix(1_704_067_200).words(), [2024, 1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_before_epoch() {
        assert_eq!(Timestamp::from_unix(-1).words(), [1969, 12, 31, 23, 59, 59]);
    }
}
