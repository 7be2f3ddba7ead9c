// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::disk::ADF;

/// Seconds between the Unix epoch and the AmigaDOS epoch (1978-01-01).
pub const AMIGA_EPOCH_OFFSET: i64 = 2922 * 86400;
pub const TICKS_PER_SECOND: u32 = 50;

/// AmigaDOS date stamp: days since 1978-01-01, minutes past midnight and
/// ticks (1/50 s) past the minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct DateStamp {
    pub days: u32,
    pub minutes: u32,
    pub ticks: u32,
}

impl DateStamp {
    pub fn from_datetime(time: NaiveDateTime) -> Self {
        let utc = time.and_utc();
        let secs = (utc.timestamp() - AMIGA_EPOCH_OFFSET).max(0) as u64;
        let sub_ticks = utc.timestamp_subsec_millis() / 20;
        DateStamp {
            days: (secs / 86400) as u32,
            minutes: ((secs % 86400) / 60) as u32,
            ticks: (secs % 60) as u32 * TICKS_PER_SECOND + sub_ticks,
        }
    }

    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        let secs = AMIGA_EPOCH_OFFSET
            + self.days as i64 * 86400
            + self.minutes as i64 * 60
            + (self.ticks / TICKS_PER_SECOND) as i64;
        let nanos = (self.ticks % TICKS_PER_SECOND) * 20_000_000;
        DateTime::from_timestamp(secs, nanos).map(|t| t.naive_utc())
    }

    pub(crate) fn read(disk: &ADF, block: u32, offset: usize) -> Self {
        DateStamp {
            days: disk.read_u32(block, offset),
            minutes: disk.read_u32(block, offset + 4),
            ticks: disk.read_u32(block, offset + 8),
        }
    }

    pub(crate) fn write(&self, disk: &mut ADF, block: u32, offset: usize) {
        disk.write_u32(block, offset, self.days);
        disk.write_u32(block, offset + 4, self.minutes);
        disk.write_u32(block, offset + 8, self.ticks);
    }
}

impl std::fmt::Display for DateStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_datetime() {
            Some(time) => write!(f, "{}", time.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "invalid date"),
        }
    }
}

/// Source of the time stamps written into modified blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(NaiveDateTime),
}

impl Clock {
    pub fn now(&self) -> DateStamp {
        match self {
            Clock::System => DateStamp::from_datetime(Utc::now().naive_utc()),
            Clock::Fixed(time) => DateStamp::from_datetime(*time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn epoch_is_day_zero() {
        let stamp = DateStamp::from_datetime(at(1978, 1, 1, 0, 0, 0));
        assert_eq!(stamp, DateStamp::default());
    }

    #[test]
    fn converts_both_ways() {
        let time = at(1985, 7, 23, 13, 45, 30);
        let stamp = DateStamp::from_datetime(time);
        assert_eq!(stamp.minutes, 13 * 60 + 45);
        assert_eq!(stamp.ticks, 30 * TICKS_PER_SECOND);
        assert_eq!(stamp.to_datetime(), Some(time));
    }

    #[test]
    fn dates_before_epoch_clamp() {
        let stamp = DateStamp::from_datetime(at(1970, 1, 1, 0, 0, 0));
        assert_eq!(stamp, DateStamp::default());
    }

    #[test]
    fn fixed_clock_is_stable() {
        let clock = Clock::Fixed(at(2000, 1, 1, 12, 0, 0));
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().days, 8035);
    }
}
