use chrono::Duration;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

use crate::error::Error;
use crate::interval::Interval;

/// Time-bucket resolution of a metric query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    FourHours,
    SixHours,
    TwelveHours,
    OneDay,
    All,
}

impl Granularity {
    /// Every granularity, finest first.
    pub const ALL: [Granularity; 10] = [
        Granularity::OneMinute,
        Granularity::FiveMinutes,
        Granularity::FifteenMinutes,
        Granularity::ThirtyMinutes,
        Granularity::OneHour,
        Granularity::FourHours,
        Granularity::SixHours,
        Granularity::TwelveHours,
        Granularity::OneDay,
        Granularity::All,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            Granularity::OneMinute => "PT1M",
            Granularity::FiveMinutes => "PT5M",
            Granularity::FifteenMinutes => "PT15M",
            Granularity::ThirtyMinutes => "PT30M",
            Granularity::OneHour => "PT1H",
            Granularity::FourHours => "PT4H",
            Granularity::SixHours => "PT6H",
            Granularity::TwelveHours => "PT12H",
            Granularity::OneDay => "P1D",
            Granularity::All => "ALL",
        }
    }

    /// Width of one bucket. `None` for `ALL`, which is a single bucket.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Granularity::OneMinute => Some(Duration::minutes(1)),
            Granularity::FiveMinutes => Some(Duration::minutes(5)),
            Granularity::FifteenMinutes => Some(Duration::minutes(15)),
            Granularity::ThirtyMinutes => Some(Duration::minutes(30)),
            Granularity::OneHour => Some(Duration::hours(1)),
            Granularity::FourHours => Some(Duration::hours(4)),
            Granularity::SixHours => Some(Duration::hours(6)),
            Granularity::TwelveHours => Some(Duration::hours(12)),
            Granularity::OneDay => Some(Duration::days(1)),
            Granularity::All => None,
        }
    }

    /// Longest interval a single query may span at this granularity.
    /// `None` means unbounded.
    pub fn max_lookback(&self) -> Option<Duration> {
        let bucket = self.duration()?;
        if bucket <= Duration::minutes(1) {
            Some(Duration::hours(6))
        } else if bucket <= Duration::minutes(5) {
            Some(Duration::hours(24))
        } else if bucket <= Duration::minutes(15) {
            Some(Duration::days(4))
        } else if bucket <= Duration::minutes(30) {
            Some(Duration::days(7))
        } else {
            None
        }
    }

    pub fn is_valid_interval(&self, interval: &Interval) -> bool {
        match self.max_lookback() {
            Some(max) => interval.duration() <= max,
            None => true,
        }
    }

    /// Finest granularity whose lookback still covers `interval`.
    pub fn min_for(interval: &Interval) -> Granularity {
        Self::ALL
            .into_iter()
            .find(|g| g.is_valid_interval(interval))
            .unwrap_or(Granularity::OneMinute)
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.token().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidGranularity(s.to_string()))
    }
}

impl Serialize for Granularity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.token())
    }
}

impl<'de> Deserialize<'de> for Granularity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        token.parse().map_err(serde::de::Error::custom)
    }
}
