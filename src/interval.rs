use chrono::{DateTime, Duration, DurationRound, FixedOffset, SecondsFormat};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

use crate::error::Error;
use crate::granularity::Granularity;

/// Absolute time range of a query.
///
/// Rendered as `<start>/<end>` when built from two instants, or as
/// `<start>/<ISO-8601 duration>` when built from a duration. A
/// `<duration>/<end>` input is normalized to the start/duration form.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    with_duration: bool,
}

fn round_to_minute(t: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    t.duration_round(Duration::minutes(1)).unwrap_or(t)
}

fn whole_seconds(d: Duration) -> Duration {
    Duration::try_seconds(d.num_seconds()).unwrap_or(d)
}

fn out_of_range(anchor: &DateTime<FixedOffset>, duration: Duration) -> Error {
    Error::InvalidInterval {
        input: format!("{} and {}", anchor.to_rfc3339(), format_iso8601_duration(duration)),
        reason: "duration out of range".to_string(),
    }
}

impl Interval {
    pub fn between(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Self {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        Self {
            start: round_to_minute(start),
            end: round_to_minute(end),
            with_duration: false,
        }
    }

    /// Span rendered with a duration. Sub-second precision is dropped since
    /// the wire form only carries whole seconds.
    pub fn starting_from(start: DateTime<FixedOffset>, duration: Duration) -> Result<Self, Error> {
        let start = round_to_minute(start);
        let end = start
            .checked_add_signed(whole_seconds(duration))
            .ok_or_else(|| out_of_range(&start, duration))?;
        Ok(Self::spanning(start, end))
    }

    pub fn ending_at(duration: Duration, end: DateTime<FixedOffset>) -> Result<Self, Error> {
        let end = round_to_minute(end);
        let start = end
            .checked_sub_signed(whole_seconds(duration))
            .ok_or_else(|| out_of_range(&end, duration))?;
        Ok(Self::spanning(start, end))
    }

    fn spanning(a: DateTime<FixedOffset>, b: DateTime<FixedOffset>) -> Self {
        let (start, end) = if b < a { (b, a) } else { (a, b) };
        Self {
            start,
            end,
            with_duration: true,
        }
    }

    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    pub fn end(&self) -> DateTime<FixedOffset> {
        self.end
    }

    /// Absolute span, identical for every construction shape.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_valid_granularity(&self, granularity: Granularity) -> bool {
        granularity.is_valid_interval(self)
    }

    pub fn min_granularity(&self) -> Granularity {
        Granularity::min_for(self)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let start = self.start.to_rfc3339_opts(SecondsFormat::Secs, true);
        if self.with_duration {
            write!(f, "{start}/{}", format_iso8601_duration(self.duration()))
        } else {
            let end = self.end.to_rfc3339_opts(SecondsFormat::Secs, true);
            write!(f, "{start}/{end}")
        }
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| Error::InvalidInterval {
            input: value.to_string(),
            reason,
        };

        let (start, rest) = value
            .split_once('/')
            .ok_or_else(|| invalid("there is no separator '/'".to_string()))?;
        if start.is_empty() || rest.is_empty() {
            return Err(invalid("there is no start, end time or duration".to_string()));
        }

        let timestamp = |s: &str| {
            DateTime::parse_from_rfc3339(s).map_err(|e| invalid(format!("bad timestamp {s:?}: {e}")))
        };
        let duration =
            |s: &str| parse_iso8601_duration(s).map_err(|e| invalid(format!("bad duration {s:?}: {e}")));

        let relabel = |e: Error| match e {
            Error::InvalidInterval { reason, .. } => invalid(reason),
            other => other,
        };
        if start.starts_with('P') {
            Interval::ending_at(duration(start)?, timestamp(rest)?).map_err(relabel)
        } else if rest.starts_with('P') {
            Interval::starting_from(timestamp(start)?, duration(rest)?).map_err(relabel)
        } else {
            Ok(Interval::between(timestamp(start)?, timestamp(rest)?))
        }
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse an ISO-8601 duration such as `PT1H`, `P1DT12H` or `P8DT`.
///
/// Years and months have no fixed length; they are approximated as 365 and
/// 30 days.
pub fn parse_iso8601_duration(input: &str) -> Result<Duration, String> {
    let body = input
        .strip_prefix('P')
        .ok_or_else(|| "duration must start with 'P'".to_string())?;

    let mut total = Duration::zero();
    let mut num_str = String::new();
    let mut in_time = false;
    let mut components = 0;

    for c in body.chars() {
        if c.is_ascii_digit() {
            num_str.push(c);
            continue;
        }
        if c == 'T' {
            if in_time || !num_str.is_empty() {
                return Err("unexpected 'T'".to_string());
            }
            in_time = true;
            continue;
        }
        if num_str.is_empty() {
            return Err(format!("missing number before '{c}'"));
        }
        let n: i64 = num_str
            .parse()
            .map_err(|_| format!("invalid number {num_str:?}"))?;
        num_str.clear();

        let part = match (in_time, c) {
            (false, 'Y') => n.checked_mul(365).and_then(Duration::try_days),
            (false, 'M') => n.checked_mul(30).and_then(Duration::try_days),
            (false, 'W') => Duration::try_weeks(n),
            (false, 'D') => Duration::try_days(n),
            (true, 'H') => Duration::try_hours(n),
            (true, 'M') => Duration::try_minutes(n),
            (true, 'S') => Duration::try_seconds(n),
            _ => return Err(format!("unknown designator '{c}'")),
        };
        total = part
            .and_then(|p| total.checked_add(&p))
            .ok_or_else(|| "duration out of range".to_string())?;
        components += 1;
    }

    if !num_str.is_empty() {
        return Err(format!("trailing number {num_str:?} without designator"));
    }
    if components == 0 {
        return Err("duration has no components".to_string());
    }
    Ok(total)
}

/// Render a duration in the shortest ISO-8601 day/time form, e.g. `P1DT6H`.
pub fn format_iso8601_duration(duration: Duration) -> String {
    let total = duration.num_seconds().abs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || seconds > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if seconds > 0 {
            out.push_str(&format!("{seconds}S"));
        }
    }
    if out == "P" {
        out.push_str("T0S");
    }
    out
}
