//! Line timestamp layouts.
//!
//! A layout is detected once from a bound string given on the command line
//! and then applied to the first `width()` bytes of every candidate line.
//! Supported encodings:
//!
//! ```text
//! yyyy-MM-dd
//! yyyy-MM-dd hh:mm:ss        (or 'T' instead of ' ')
//! yyyy-MM-dd hh:mm:ss.mmm
//! hh:mm:ss
//! hh:mm:ss.mmm
//! ```

use std::fmt;

use time::format_description::FormatItem;
use time::macros::{date, format_description};
use time::{Date, PrimitiveDateTime, Time};

use crate::error::{Error, Result};

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const HMS_FORMAT: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");
const HMS_MSEC_FORMAT: &[FormatItem<'static>] =
    format_description!("[hour]:[minute]:[second].[subsecond digits:3]");

const DATE_LEN: usize = "yyyy-MM-dd".len();
const HMS_LEN: usize = "hh:mm:ss".len();
const HMS_MSEC_LEN: usize = "hh:mm:ss.mmm".len();

/// Date used for time-only layouts so that timestamps stay comparable.
const NO_DATE: Date = date!(1970-01-01);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeFormat {
    Hms,
    HmsMillis,
}

impl TimeFormat {
    fn len(self) -> usize {
        match self {
            TimeFormat::Hms => HMS_LEN,
            TimeFormat::HmsMillis => HMS_MSEC_LEN,
        }
    }

    fn items(self) -> &'static [FormatItem<'static>] {
        match self {
            TimeFormat::Hms => HMS_FORMAT,
            TimeFormat::HmsMillis => HMS_MSEC_FORMAT,
        }
    }
}

/// A point in time read from a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(PrimitiveDateTime);

impl Timestamp {
    pub fn new(date: Option<Date>, time: Option<Time>) -> Self {
        Self(PrimitiveDateTime::new(
            date.unwrap_or(NO_DATE),
            time.unwrap_or(Time::MIDNIGHT),
        ))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of applying a layout to the start of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed {
    Matched { width: usize, timestamp: Timestamp },
    /// Fewer than `width()` bytes were available.
    NeedMoreData,
    Invalid,
}

/// Fixed-width timestamp encoding shared by every stage that parses lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampLayout {
    date: bool,
    time: Option<TimeFormat>,
    width: usize,
}

impl TimestampLayout {
    /// Detect the layout of a bound string such as `2022-01-02 00:00:00`.
    pub fn detect(bound: &str) -> Result<Self> {
        let mut rest = bound;
        let mut width = 0;
        let date = match bound.get(..DATE_LEN) {
            Some(prefix) => Date::parse(prefix, DATE_FORMAT).is_ok(),
            None => false,
        };

        if date {
            width = DATE_LEN;
            rest = &bound[DATE_LEN..];
            if let Some(split) = rest.chars().next() {
                if split != ' ' && split != 'T' {
                    return Err(Error::InvalidTimestamp(format!(
                        "unsupported date-time split character: '{split}'"
                    )));
                }
                rest = &rest[1..];
                width += 1;
                if rest.is_empty() {
                    return Err(Error::InvalidTimestamp(format!(
                        "missing time after '{bound}'"
                    )));
                }
            }
        }

        let time = if rest.is_empty() && date {
            None
        } else {
            let detected = [TimeFormat::HmsMillis, TimeFormat::Hms]
                .into_iter()
                .find(|format| match rest.get(..format.len()) {
                    Some(prefix) => Time::parse(prefix, format.items()).is_ok(),
                    None => false,
                });
            match detected {
                Some(format) => {
                    width += format.len();
                    Some(format)
                }
                None => {
                    return Err(Error::InvalidTimestamp(format!(
                        "unsupported time format: {rest}"
                    )))
                }
            }
        };

        Ok(Self { date, time, width })
    }

    /// Number of bytes a timestamp in this layout occupies.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Parse a bound string, which must consist of exactly one timestamp.
    pub fn parse_bound(&self, bound: &str) -> Result<Timestamp> {
        match self.parse(bound.as_bytes()) {
            Parsed::Matched { width, timestamp } if width == bound.len() => Ok(timestamp),
            _ => Err(Error::InvalidTimestamp(format!(
                "'{bound}' does not match the layout of the other bound"
            ))),
        }
    }

    /// Parse the timestamp at the start of `line`.
    pub fn parse(&self, line: &[u8]) -> Parsed {
        if line.len() < self.width {
            return Parsed::NeedMoreData;
        }
        let text = match std::str::from_utf8(&line[..self.width]) {
            Ok(text) => text,
            Err(_) => return Parsed::Invalid,
        };

        let mut rest = text;
        let mut date = None;
        if self.date {
            match rest.get(..DATE_LEN).map(|prefix| Date::parse(prefix, DATE_FORMAT)) {
                Some(Ok(parsed)) => date = Some(parsed),
                _ => return Parsed::Invalid,
            }
            rest = &rest[DATE_LEN..];
            if self.time.is_some() {
                if !(rest.starts_with(' ') || rest.starts_with('T')) {
                    return Parsed::Invalid;
                }
                rest = &rest[1..];
            }
        }

        let mut time = None;
        if let Some(format) = self.time {
            match Time::parse(rest, format.items()) {
                Ok(parsed) => time = Some(parsed),
                Err(_) => return Parsed::Invalid,
            }
        }

        Parsed::Matched {
            width: self.width,
            timestamp: Timestamp::new(date, time),
        }
    }
}
