//
// Copyright (c) 2025 rustmailer.com (https://rustmailer.com)
//
// This file is part of the Bichon Email Archiving Project
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::ops::Bound;

use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::{
    modules::error::{code::ErrorCode, MailpostError, MailpostResult},
    raise_error,
};

/// 0000-01-01T00:00:00Z
pub const MIN_DATE_MILLIS: i64 = -62_167_219_200_000;
/// 9999-12-31T23:59:59.999Z
pub const MAX_DATE_MILLIS: i64 = 253_402_300_799_999;

const SECOND_MILLIS: i64 = 1_000;
const MINUTE_MILLIS: i64 = 60 * SECOND_MILLIS;
const HOUR_MILLIS: i64 = 60 * MINUTE_MILLIS;
const DAY_MILLIS: i64 = 24 * HOUR_MILLIS;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum DateResolution {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum DateOp {
    On,
    Before,
    After,
}

fn to_datetime(millis: i64) -> MailpostResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        raise_error!(
            format!("Timestamp {} ms is out of range", millis),
            ErrorCode::InvalidParameter
        )
    })
}

fn out_of_range(millis: i64, resolution: DateResolution) -> MailpostError {
    raise_error!(
        format!(
            "Cannot bucket timestamp {} ms at {:?} resolution",
            millis, resolution
        ),
        ErrorCode::InvalidParameter
    )
}

/// Start of the UTC bucket containing `millis`.
pub fn truncate(millis: i64, resolution: DateResolution) -> MailpostResult<i64> {
    let fixed = |unit: i64| {
        millis
            .checked_sub(millis.rem_euclid(unit))
            .ok_or_else(|| out_of_range(millis, resolution))
    };
    match resolution {
        DateResolution::Year | DateResolution::Month => {
            let dt = to_datetime(millis)?;
            let month = if resolution == DateResolution::Year {
                1
            } else {
                dt.month()
            };
            Utc.with_ymd_and_hms(dt.year(), month, 1, 0, 0, 0)
                .single()
                .map(|start| start.timestamp_millis())
                .ok_or_else(|| out_of_range(millis, resolution))
        }
        DateResolution::Day => fixed(DAY_MILLIS),
        DateResolution::Hour => fixed(HOUR_MILLIS),
        DateResolution::Minute => fixed(MINUTE_MILLIS),
        DateResolution::Second => fixed(SECOND_MILLIS),
    }
}

/// Adds exactly one unit of `resolution`. Years and months move the calendar
/// field (clamping to the last day of shorter months); smaller units add a
/// fixed number of milliseconds.
pub fn bucket_end(millis: i64, resolution: DateResolution) -> MailpostResult<i64> {
    let fixed = |unit: i64| {
        millis
            .checked_add(unit)
            .ok_or_else(|| out_of_range(millis, resolution))
    };
    match resolution {
        DateResolution::Year | DateResolution::Month => {
            let months = if resolution == DateResolution::Year { 12 } else { 1 };
            to_datetime(millis)?
                .checked_add_months(Months::new(months))
                .map(|end| end.timestamp_millis())
                .ok_or_else(|| out_of_range(millis, resolution))
        }
        DateResolution::Day => fixed(DAY_MILLIS),
        DateResolution::Hour => fixed(HOUR_MILLIS),
        DateResolution::Minute => fixed(MINUTE_MILLIS),
        DateResolution::Second => fixed(SECOND_MILLIS),
    }
}

/// Millisecond range of sent dates selected by `op` at `resolution`.
/// Timestamps outside years 0000 to 9999 are rejected.
pub fn date_range(
    op: DateOp,
    millis: i64,
    resolution: DateResolution,
) -> MailpostResult<(Bound<i64>, Bound<i64>)> {
    if !(MIN_DATE_MILLIS..=MAX_DATE_MILLIS).contains(&millis) {
        return Err(out_of_range(millis, resolution));
    }
    let start = truncate(millis, resolution)?;
    let upper = bucket_end(start, resolution)?;
    Ok(match op {
        DateOp::On => (Bound::Included(start), Bound::Excluded(upper)),
        DateOp::Before => (Bound::Included(MIN_DATE_MILLIS), Bound::Excluded(start)),
        DateOp::After => (Bound::Included(upper), Bound::Included(MAX_DATE_MILLIS)),
    })
}

/// Accepts RFC 3339 timestamps, `YYYY-MM-DD` dates (midnight UTC) or raw
/// milliseconds since the epoch.
pub fn parse_timestamp(input: &str) -> MailpostResult<i64> {
    let input = input.trim();
    if let Ok(millis) = input.parse::<i64>() {
        return Ok(millis);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.timestamp_millis());
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp_millis());
        }
    }
    Err(raise_error!(
        format!(
            "Cannot parse '{}' as a date; use RFC 3339, YYYY-MM-DD or epoch milliseconds",
            input
        ),
        ErrorCode::InvalidParameter
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> i64 {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn min_and_max_dates_match_calendar() {
        assert_eq!(ts("0000-01-01T00:00:00Z"), MIN_DATE_MILLIS);
        assert_eq!(ts("9999-12-31T23:59:59.999Z"), MAX_DATE_MILLIS);
    }

    #[test]
    fn truncation_per_resolution() {
        let t = ts("2020-03-15T10:42:17.250Z");
        assert_eq!(truncate(t, DateResolution::Year).unwrap(), ts("2020-01-01T00:00:00Z"));
        assert_eq!(truncate(t, DateResolution::Month).unwrap(), ts("2020-03-01T00:00:00Z"));
        assert_eq!(truncate(t, DateResolution::Day).unwrap(), ts("2020-03-15T00:00:00Z"));
        assert_eq!(truncate(t, DateResolution::Hour).unwrap(), ts("2020-03-15T10:00:00Z"));
        assert_eq!(truncate(t, DateResolution::Minute).unwrap(), ts("2020-03-15T10:42:00Z"));
        assert_eq!(truncate(t, DateResolution::Second).unwrap(), ts("2020-03-15T10:42:17Z"));
    }

    #[test]
    fn truncation_before_epoch_rounds_down() {
        let t = ts("1969-12-31T23:30:00Z");
        assert_eq!(truncate(t, DateResolution::Day).unwrap(), ts("1969-12-31T00:00:00Z"));
    }

    #[test]
    fn calendar_units_follow_month_lengths() {
        assert_eq!(
            bucket_end(ts("2020-02-01T00:00:00Z"), DateResolution::Month).unwrap(),
            ts("2020-03-01T00:00:00Z")
        );
        assert_eq!(
            bucket_end(ts("2020-01-31T00:00:00Z"), DateResolution::Month).unwrap(),
            ts("2020-02-29T00:00:00Z")
        );
        assert_eq!(
            bucket_end(ts("2020-02-29T00:00:00Z"), DateResolution::Year).unwrap(),
            ts("2021-02-28T00:00:00Z")
        );
        assert_eq!(
            bucket_end(ts("2019-12-01T00:00:00Z"), DateResolution::Month).unwrap(),
            ts("2020-01-01T00:00:00Z")
        );
    }

    #[test]
    fn fixed_units_add_milliseconds() {
        let t = ts("2020-03-15T00:00:00Z");
        assert_eq!(bucket_end(t, DateResolution::Day).unwrap(), t + DAY_MILLIS);
        assert_eq!(bucket_end(t, DateResolution::Hour).unwrap(), t + HOUR_MILLIS);
        assert_eq!(bucket_end(t, DateResolution::Minute).unwrap(), t + MINUTE_MILLIS);
        assert_eq!(bucket_end(t, DateResolution::Second).unwrap(), t + SECOND_MILLIS);
    }

    #[test]
    fn ranges_are_exclusive_per_operator() {
        let t = ts("2020-03-15T10:00:00Z");
        let day = ts("2020-03-15T00:00:00Z");
        let next = ts("2020-03-16T00:00:00Z");
        assert_eq!(
            date_range(DateOp::On, t, DateResolution::Day).unwrap(),
            (Bound::Included(day), Bound::Excluded(next))
        );
        assert_eq!(
            date_range(DateOp::Before, t, DateResolution::Day).unwrap(),
            (Bound::Included(MIN_DATE_MILLIS), Bound::Excluded(day))
        );
        assert_eq!(
            date_range(DateOp::After, t, DateResolution::Day).unwrap(),
            (Bound::Included(next), Bound::Included(MAX_DATE_MILLIS))
        );
    }

    #[test]
    fn timestamps_parse_in_several_forms() {
        assert_eq!(ts("1584266400000"), 1_584_266_400_000);
        assert_eq!(ts("2020-03-15"), ts("2020-03-15T00:00:00Z"));
        assert_eq!(ts("2020-03-15T12:00:00+02:00"), ts("2020-03-15T10:00:00Z"));
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn extreme_timestamps_are_rejected() {
        for resolution in [DateResolution::Day, DateResolution::Second, DateResolution::Year] {
            assert!(truncate(i64::MIN, resolution).is_err());
            for millis in [i64::MIN, i64::MAX, MIN_DATE_MILLIS - 1, MAX_DATE_MILLIS + 1] {
                let err = date_range(DateOp::On, millis, resolution).unwrap_err();
                assert_eq!(err.code(), ErrorCode::InvalidParameter);
            }
        }
        assert!(date_range(DateOp::Before, MIN_DATE_MILLIS, DateResolution::Day).is_ok());
    }
}
