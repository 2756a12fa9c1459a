//! Scalar codecs for the gateway's non-standard JSON values.
//!
//! Each type wraps a parsed value and implements serde so it can be used
//! directly as a field of a response record. Serialization is diagnostic only;
//! it is not guaranteed to round-trip.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("no layout matched timestamp {0:?}")]
    UnrecognizedTimestamp(String),
    #[error("duration {0:?} does not match [<h>h][<m>m]<s>.<ns>s")]
    UnrecognizedDuration(String),
    #[error("duration {0:?} is out of range")]
    DurationOutOfRange(String),
    #[error("{0} is not a valid number of seconds")]
    InvalidSeconds(f64),
}

/// Layouts the gateway has been seen to use, tried in order.
enum Layout {
    /// `2019-07-01T10:00:00-07:00`
    Rfc3339Offset,
    /// `2019-07-01 10:00:00 -0700`
    SpaceNumericOffset,
    /// `2019-07-01T10:00:00Z`
    Rfc3339Utc,
}

const LAYOUTS: [Layout; 3] = [
    Layout::Rfc3339Offset,
    Layout::SpaceNumericOffset,
    Layout::Rfc3339Utc,
];

impl Layout {
    fn parse(&self, s: &str) -> Option<DateTime<FixedOffset>> {
        match self {
            Layout::Rfc3339Offset => DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%:z").ok(),
            Layout::SpaceNumericOffset => DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z").ok(),
            Layout::Rfc3339Utc => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ")
                .ok()
                .map(|naive| naive.and_utc().fixed_offset()),
        }
    }
}

fn fractional_seconds() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*)\.\d+(.*)$").expect("fractional seconds pattern"))
}

/// A point in time reported by the gateway, with sub-second precision dropped.
///
/// An empty string decodes to the Unix epoch, see [`Timestamp::is_zero`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp(DateTime<FixedOffset>);

impl Timestamp {
    pub fn zero() -> Self {
        Self(DateTime::<Utc>::UNIX_EPOCH.fixed_offset())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == DateTime::<Utc>::UNIX_EPOCH
    }

    pub fn time(&self) -> DateTime<FixedOffset> {
        self.0
    }

    pub fn parse(raw: &str) -> Result<Self, CodecError> {
        if raw.is_empty() {
            return Ok(Self::zero());
        }
        let stripped = match fractional_seconds().captures(raw) {
            Some(caps) => format!("{}{}", &caps[1], &caps[2]),
            None => raw.to_string(),
        };
        LAYOUTS
            .iter()
            .find_map(|layout| layout.parse(&stripped))
            .map(Self)
            .ok_or_else(|| CodecError::UnrecognizedTimestamp(raw.to_string()))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339())
    }
}

/// IANA time zone of the site. Empty when the name could not be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeZone(Option<Tz>);

impl TimeZone {
    /// Resolves `name`, logging and yielding an empty zone on failure.
    pub fn resolve(name: &str) -> Self {
        match name.parse::<Tz>() {
            Ok(tz) => Self(Some(tz)),
            Err(e) => {
                warn!(
                    "The gateway reports timezone {:?}, but it could not be resolved: {}",
                    name, e
                );
                Self(None)
            }
        }
    }

    pub fn location(&self) -> Option<Tz> {
        self.0
    }
}

impl<'de> Deserialize<'de> for TimeZone {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::resolve(&raw))
    }
}

impl Serialize for TimeZone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(tz) => serializer.serialize_str(tz.name()),
            None => serializer.serialize_none(),
        }
    }
}

/// A JSON number of seconds, truncated toward zero. The gateway may report a
/// negative value, so the whole seconds are kept signed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct FloatSeconds(i64);

impl FloatSeconds {
    pub fn from_secs_f64(secs: f64) -> Result<Self, CodecError> {
        if !secs.is_finite() {
            return Err(CodecError::InvalidSeconds(secs));
        }
        Ok(Self(secs.trunc() as i64))
    }

    pub fn seconds(&self) -> i64 {
        self.0
    }
}

impl<'de> Deserialize<'de> for FloatSeconds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Self::from_secs_f64(secs).map_err(de::Error::custom)
    }
}

impl Serialize for FloatSeconds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

// Any single character separates seconds from nanoseconds, not only '.'.
fn structured_duration() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"((?P<hours>\d+?)h)?((?P<minutes>\d+?)m)?((?P<seconds>\d+?).)((?P<nanoseconds>\d+?)s)",
        )
        .expect("structured duration pattern")
    })
}

/// A duration written as `[<h>h][<m>m]<s>.<ns>s`, e.g. `143h54m32.539257895s`.
///
/// The nanoseconds group is added as a raw count of nanoseconds, so `32.5s`
/// is 32 seconds and 5 nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Uptime(Duration);

impl Uptime {
    pub fn parse(raw: &str) -> Result<Self, CodecError> {
        let caps = structured_duration()
            .captures(raw)
            .ok_or_else(|| CodecError::UnrecognizedDuration(raw.to_string()))?;
        let group = |name: &str| -> Result<u64, CodecError> {
            match caps.name(name) {
                Some(m) => m
                    .as_str()
                    .parse::<u64>()
                    .map_err(|_| CodecError::DurationOutOfRange(raw.to_string())),
                None => Ok(0),
            }
        };
        let whole_seconds = group("hours")?
            .checked_mul(3600)
            .zip(group("minutes")?.checked_mul(60))
            .and_then(|(h, m)| h.checked_add(m))
            .and_then(|hm| hm.checked_add(group("seconds").ok()?))
            .ok_or_else(|| CodecError::DurationOutOfRange(raw.to_string()))?;
        Duration::from_secs(whole_seconds)
            .checked_add(Duration::from_nanos(group("nanoseconds")?))
            .map(Self)
            .ok_or_else(|| CodecError::DurationOutOfRange(raw.to_string()))
    }

    pub fn duration(&self) -> Duration {
        self.0
    }
}

impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        write!(
            f,
            "{}h{}m{}.{:09}s",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60,
            self.0.subsec_nanos()
        )
    }
}

impl<'de> Deserialize<'de> for Uptime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}

impl Serialize for Uptime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
