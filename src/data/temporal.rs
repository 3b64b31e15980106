//! Temporal values: a kind plus an integer tick count
//!
//! Date-bearing kinds count ticks from the Unix epoch; time-of-day kinds count
//! ticks from midnight. MONTH counts months from year 0 (`year * 12 + month - 1`).

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::types::DataType;
use crate::{Result, WireError};

pub const NANOS_PER_SECOND: i128 = 1_000_000_000;
pub const NANOS_PER_DAY: i128 = 86_400 * NANOS_PER_SECOND;

/// Month ticks of 1970-01
pub const EPOCH_MONTH: i64 = 1970 * 12;

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Temporal wire kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemporalKind {
    Date,
    Month,
    Time,
    Minute,
    Second,
    DateTime,
    Timestamp,
    NanoTime,
    NanoTimestamp,
    DateHour,
}

impl TemporalKind {
    pub fn data_type(&self) -> DataType {
        match self {
            TemporalKind::Date => DataType::Date,
            TemporalKind::Month => DataType::Month,
            TemporalKind::Time => DataType::Time,
            TemporalKind::Minute => DataType::Minute,
            TemporalKind::Second => DataType::Second,
            TemporalKind::DateTime => DataType::DateTime,
            TemporalKind::Timestamp => DataType::Timestamp,
            TemporalKind::NanoTime => DataType::NanoTime,
            TemporalKind::NanoTimestamp => DataType::NanoTimestamp,
            TemporalKind::DateHour => DataType::DateHour,
        }
    }

    pub fn from_data_type(tag: DataType) -> Option<Self> {
        Some(match tag {
            DataType::Date => TemporalKind::Date,
            DataType::Month => TemporalKind::Month,
            DataType::Time => TemporalKind::Time,
            DataType::Minute => TemporalKind::Minute,
            DataType::Second => TemporalKind::Second,
            DataType::DateTime => TemporalKind::DateTime,
            DataType::Timestamp => TemporalKind::Timestamp,
            DataType::NanoTime => TemporalKind::NanoTime,
            DataType::NanoTimestamp => TemporalKind::NanoTimestamp,
            DataType::DateHour => TemporalKind::DateHour,
            _ => return None,
        })
    }

    pub fn is_time_of_day(&self) -> bool {
        matches!(
            self,
            TemporalKind::Time | TemporalKind::Minute | TemporalKind::Second | TemporalKind::NanoTime
        )
    }

    /// Stored as i32 on the wire (the rest are i64)
    pub fn is_narrow(&self) -> bool {
        !matches!(
            self,
            TemporalKind::Timestamp | TemporalKind::NanoTime | TemporalKind::NanoTimestamp
        )
    }

    /// Tick length in nanoseconds; MONTH has no fixed length
    fn nanos_per_tick(&self) -> Option<i128> {
        Some(match self {
            TemporalKind::Date => NANOS_PER_DAY,
            TemporalKind::Month => return None,
            TemporalKind::Time | TemporalKind::Timestamp => 1_000_000,
            TemporalKind::Minute => 60 * NANOS_PER_SECOND,
            TemporalKind::Second | TemporalKind::DateTime => NANOS_PER_SECOND,
            TemporalKind::NanoTime | TemporalKind::NanoTimestamp => 1,
            TemporalKind::DateHour => 3_600 * NANOS_PER_SECOND,
        })
    }

    /// Host resolution a decoded value of this kind is exposed with
    pub fn host_unit(&self) -> TimeUnit {
        match self {
            TemporalKind::Date => TimeUnit::Day,
            TemporalKind::Month => TimeUnit::Month,
            TemporalKind::Time | TemporalKind::Timestamp => TimeUnit::Milli,
            TemporalKind::Minute => TimeUnit::Minute,
            TemporalKind::Second | TemporalKind::DateTime => TimeUnit::Second,
            TemporalKind::NanoTime | TemporalKind::NanoTimestamp => TimeUnit::Nano,
            TemporalKind::DateHour => TimeUnit::Hour,
        }
    }
}

/// Resolution of a host-side datetime64-style value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Day,
    /// Months since 1970-01
    Month,
    Hour,
    Minute,
    Second,
    Milli,
    Micro,
    Nano,
}

impl TimeUnit {
    /// Wire kind a host value of this resolution is uploaded as
    pub fn upload_kind(&self) -> TemporalKind {
        match self {
            TimeUnit::Day => TemporalKind::Date,
            TimeUnit::Month => TemporalKind::Month,
            TimeUnit::Hour => TemporalKind::DateHour,
            TimeUnit::Minute | TimeUnit::Second => TemporalKind::DateTime,
            TimeUnit::Milli => TemporalKind::Timestamp,
            TimeUnit::Micro | TimeUnit::Nano => TemporalKind::NanoTimestamp,
        }
    }

    /// Convert host ticks into ticks of [`TimeUnit::upload_kind`]
    pub fn to_upload_ticks(&self, ticks: i64) -> Option<i64> {
        match self {
            TimeUnit::Month => ticks.checked_add(EPOCH_MONTH),
            TimeUnit::Minute => ticks.checked_mul(60),
            TimeUnit::Micro => ticks.checked_mul(1_000),
            _ => Some(ticks),
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            TimeUnit::Day => "D",
            TimeUnit::Month => "M",
            TimeUnit::Hour => "h",
            TimeUnit::Minute => "m",
            TimeUnit::Second => "s",
            TimeUnit::Milli => "ms",
            TimeUnit::Micro => "us",
            TimeUnit::Nano => "ns",
        }
    }
}

/// A temporal value of a given kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Temporal {
    pub kind: TemporalKind,
    pub ticks: i64,
}

// TemporalKind ordering only matters for the derived Ord on Temporal
impl PartialOrd for TemporalKind {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TemporalKind {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.data_type() as u8).cmp(&(other.data_type() as u8))
    }
}

impl Temporal {
    pub fn new(kind: TemporalKind, ticks: i64) -> Self {
        Self { kind, ticks }
    }

    /// The in-band null of `kind`
    pub fn null(kind: TemporalKind) -> Self {
        let ticks = if kind.is_narrow() { i32::MIN as i64 } else { i64::MIN };
        Self { kind, ticks }
    }

    pub fn is_null(&self) -> bool {
        if self.kind.is_narrow() {
            self.ticks == i32::MIN as i64
        } else {
            self.ticks == i64::MIN
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self::new(TemporalKind::Date, date.signed_duration_since(epoch()).num_days())
    }

    pub fn from_datetime(dt: NaiveDateTime) -> Result<Self> {
        let nanos = dt
            .and_utc()
            .timestamp_nanos_opt()
            .ok_or_else(|| WireError::type_mismatch(format!("{} is outside the NANOTIMESTAMP range", dt)))?;
        Ok(Self::new(TemporalKind::NanoTimestamp, nanos))
    }

    pub fn from_time(time: NaiveTime) -> Self {
        let nanos = time.num_seconds_from_midnight() as i64 * 1_000_000_000 + time.nanosecond() as i64;
        Self::new(TemporalKind::NanoTime, nanos)
    }

    pub fn month(year: i32, month: u32) -> Self {
        Self::new(TemporalKind::Month, year as i64 * 12 + month as i64 - 1)
    }

    /// Nanoseconds since the epoch (date-bearing kinds) or since midnight
    /// (time-of-day kinds)
    pub fn nanos(&self) -> Option<i128> {
        match self.kind.nanos_per_tick() {
            Some(per_tick) => Some(self.ticks as i128 * per_tick),
            None => {
                let date = month_start(self.ticks)?;
                Some(date.signed_duration_since(epoch()).num_days() as i128 * NANOS_PER_DAY)
            }
        }
    }

    /// Convert to another kind, truncating toward the earlier tick
    pub fn convert(&self, kind: TemporalKind) -> Result<Temporal> {
        if self.is_null() {
            return Ok(Temporal::null(kind));
        }
        if kind == self.kind {
            return self.checked();
        }
        if self.kind.is_time_of_day() && !kind.is_time_of_day() {
            return Err(WireError::type_mismatch(format!(
                "cannot convert {} to {}",
                self.kind.data_type(),
                kind.data_type()
            )));
        }
        let out_of_range = || {
            WireError::overflow(format!(
                "{} is outside the {} range",
                self,
                kind.data_type()
            ))
        };
        let mut nanos = self.nanos().ok_or_else(out_of_range)?;
        if kind.is_time_of_day() {
            nanos = nanos.rem_euclid(NANOS_PER_DAY);
        }
        let ticks = match kind.nanos_per_tick() {
            Some(per_tick) => nanos.div_euclid(per_tick),
            None => {
                let days = i64::try_from(nanos.div_euclid(NANOS_PER_DAY)).map_err(|_| out_of_range())?;
                let date = chrono::Duration::try_days(days)
                    .and_then(|d| epoch().checked_add_signed(d))
                    .ok_or_else(out_of_range)?;
                date.year() as i128 * 12 + date.month0() as i128
            }
        };
        let ticks = i64::try_from(ticks).map_err(|_| out_of_range())?;
        Temporal::new(kind, ticks).checked()
    }

    /// The value itself if its ticks fit the kind's wire width without
    /// landing on the null sentinel
    pub fn checked(&self) -> Result<Temporal> {
        let fits = if self.kind.is_narrow() {
            self.ticks > i32::MIN as i64 && self.ticks <= i32::MAX as i64
        } else {
            self.ticks != i64::MIN
        };
        if !fits {
            return Err(WireError::overflow(format!(
                "{} ticks are outside the {} range",
                self.ticks,
                self.kind.data_type()
            )));
        }
        Ok(*self)
    }

    pub fn to_naive_datetime(&self) -> Option<NaiveDateTime> {
        if self.is_null() {
            return None;
        }
        let nanos = self.nanos()?;
        let days = i64::try_from(nanos.div_euclid(NANOS_PER_DAY)).ok()?;
        let in_day = nanos.rem_euclid(NANOS_PER_DAY);
        let date = epoch().checked_add_signed(chrono::Duration::try_days(days)?)?;
        let time = NaiveTime::from_num_seconds_from_midnight_opt(
            (in_day / NANOS_PER_SECOND) as u32,
            (in_day % NANOS_PER_SECOND) as u32,
        )?;
        Some(date.and_time(time))
    }

    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        self.to_naive_datetime().map(|dt| dt.date())
    }

    /// Server script literal
    pub fn literal(&self) -> String {
        if self.kind == TemporalKind::DateHour && !self.is_null() {
            return format!("datehour('{}')", self);
        }
        self.to_string()
    }
}

/// First day of the month `ticks` months after year 0
fn month_start(ticks: i64) -> Option<NaiveDate> {
    let year = i32::try_from(ticks.div_euclid(12)).ok()?;
    let month = ticks.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1)
}

impl fmt::Display for Temporal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("");
        }
        let dt = match self.to_naive_datetime() {
            Some(dt) => dt,
            None => return write!(f, "{}", self.ticks),
        };
        let pattern = match self.kind {
            TemporalKind::Date => "%Y.%m.%d",
            TemporalKind::Time => "%H:%M:%S%.3f",
            TemporalKind::Minute => "%H:%Mm",
            TemporalKind::Second => "%H:%M:%S",
            TemporalKind::DateTime => "%Y.%m.%dT%H:%M:%S",
            TemporalKind::Timestamp => "%Y.%m.%dT%H:%M:%S%.3f",
            TemporalKind::NanoTime => "%H:%M:%S%.9f",
            TemporalKind::NanoTimestamp => "%Y.%m.%dT%H:%M:%S%.9f",
            TemporalKind::DateHour => "%Y.%m.%dT%H",
            TemporalKind::Month => "%Y.%mM",
        };
        write!(f, "{}", dt.format(pattern))
    }
}

/// Text of a host datetime64-style value; MONTH shows its first day
pub fn host_text(unit: TimeUnit, ticks: i64) -> String {
    let (kind, ticks) = match unit.to_upload_ticks(ticks) {
        Some(t) => (unit.upload_kind(), t),
        None => return "NaT".to_string(),
    };
    let dt = match Temporal::new(kind, ticks).to_naive_datetime() {
        Some(dt) => dt,
        None => return "NaT".to_string(),
    };
    let pattern = match unit {
        TimeUnit::Day | TimeUnit::Month => "%Y-%m-%d",
        TimeUnit::Hour => "%Y-%m-%dT%H",
        TimeUnit::Minute => "%Y-%m-%dT%H:%M",
        TimeUnit::Second => "%Y-%m-%dT%H:%M:%S",
        TimeUnit::Milli => "%Y-%m-%dT%H:%M:%S%.3f",
        TimeUnit::Micro => "%Y-%m-%dT%H:%M:%S%.6f",
        TimeUnit::Nano => "%Y-%m-%dT%H:%M:%S%.9f",
    };
    dt.format(pattern).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_literal_formats() {
        let dt = ymd(2012, 6, 13).and_hms_nano_opt(13, 30, 10, 8_007_006).unwrap();
        let nanos = Temporal::from_datetime(dt).unwrap();
        assert_eq!(nanos.literal(), "2012.06.13T13:30:10.008007006");
        assert_eq!(nanos.convert(TemporalKind::Date).unwrap().literal(), "2012.06.13");
        assert_eq!(nanos.convert(TemporalKind::Month).unwrap().literal(), "2012.06M");
        assert_eq!(nanos.convert(TemporalKind::Time).unwrap().literal(), "13:30:10.008");
        assert_eq!(nanos.convert(TemporalKind::Minute).unwrap().literal(), "13:30m");
        assert_eq!(nanos.convert(TemporalKind::Second).unwrap().literal(), "13:30:10");
        assert_eq!(nanos.convert(TemporalKind::DateTime).unwrap().literal(), "2012.06.13T13:30:10");
        assert_eq!(nanos.convert(TemporalKind::Timestamp).unwrap().literal(), "2012.06.13T13:30:10.008");
        assert_eq!(nanos.convert(TemporalKind::NanoTime).unwrap().literal(), "13:30:10.008007006");
        assert_eq!(nanos.convert(TemporalKind::DateHour).unwrap().literal(), "datehour('2012.06.13T13')");
    }

    #[test]
    fn test_month_ticks_count_from_year_zero() {
        let m = Temporal::month(2012, 6);
        assert_eq!(m.ticks, 2012 * 12 + 5);
        assert_eq!(m.to_naive_date(), Some(ymd(2012, 6, 1)));
        assert_eq!(host_text(TimeUnit::Month, m.ticks - EPOCH_MONTH), "2012-06-01");
    }

    #[test]
    fn test_pre_epoch_conversion_floors() {
        let ts = Temporal::new(TemporalKind::Timestamp, -1);
        let date = ts.convert(TemporalKind::Date).unwrap();
        assert_eq!(date.ticks, -1);
        assert_eq!(date.to_naive_date(), Some(ymd(1969, 12, 31)));
        let time = ts.convert(TemporalKind::Time).unwrap();
        assert_eq!(time.literal(), "23:59:59.999");
    }

    #[test]
    fn test_time_of_day_cannot_become_date() {
        let t = Temporal::from_time(NaiveTime::from_hms_opt(1, 2, 3).unwrap());
        assert!(t.convert(TemporalKind::Date).is_err());
        assert_eq!(t.convert(TemporalKind::Second).unwrap().ticks, 3723);
    }

    #[test]
    fn test_narrow_kinds_are_range_checked() {
        let wide = Temporal::new(TemporalKind::Date, 1 << 33);
        assert!(matches!(wide.convert(TemporalKind::Date), Err(WireError::Overflow { .. })));
        // would wrap onto the null sentinel if cut to 32 bits
        let wrapped = Temporal::new(TemporalKind::Second, i32::MIN as i64 - (1i64 << 32));
        assert!(matches!(wrapped.checked(), Err(WireError::Overflow { .. })));

        let far = Temporal::new(TemporalKind::NanoTimestamp, i64::MAX);
        assert!(far.convert(TemporalKind::Date).is_ok());
        let seconds = Temporal::new(TemporalKind::Timestamp, (i32::MAX as i64 + 1) * 1000);
        assert!(matches!(seconds.convert(TemporalKind::DateTime), Err(WireError::Overflow { .. })));
    }

    #[test]
    fn test_null_converts_to_null() {
        let null = Temporal::null(TemporalKind::Date);
        assert!(null.is_null());
        let converted = null.convert(TemporalKind::NanoTimestamp).unwrap();
        assert!(converted.is_null());
        assert_eq!(converted.ticks, i64::MIN);
    }
}
