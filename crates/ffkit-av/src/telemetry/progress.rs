//! Progress line parsing and timemark conversion.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};

static EQUALS_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"=\s+").unwrap());

/// A point in time given either as seconds or as `[[hh:]mm:]ss[.xx]` text.
#[derive(Debug, Clone, PartialEq)]
pub enum Timemark {
    Seconds(f64),
    Text(String),
}

impl Timemark {
    /// Convert to seconds.
    pub fn to_seconds(&self) -> Result<f64> {
        match self {
            Timemark::Seconds(s) => Ok(*s),
            Timemark::Text(t) => timemark_to_seconds(t),
        }
    }
}

impl fmt::Display for Timemark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timemark::Seconds(s) => write!(f, "{s}"),
            Timemark::Text(t) => f.write_str(t),
        }
    }
}

impl From<f64> for Timemark {
    fn from(s: f64) -> Self {
        Timemark::Seconds(s)
    }
}

impl From<i32> for Timemark {
    fn from(s: i32) -> Self {
        Timemark::Seconds(s.into())
    }
}

impl From<u32> for Timemark {
    fn from(s: u32) -> Self {
        Timemark::Seconds(s.into())
    }
}

impl From<Duration> for Timemark {
    fn from(d: Duration) -> Self {
        Timemark::Seconds(d.as_secs_f64())
    }
}

impl From<&str> for Timemark {
    fn from(t: &str) -> Self {
        Timemark::Text(t.to_string())
    }
}

impl From<String> for Timemark {
    fn from(t: String) -> Self {
        Timemark::Text(t)
    }
}

/// Convert a `[[hh:]mm:]ss[.xx]` timemark to seconds.
///
/// A bare decimal is taken as seconds. Colon groups are read right to left
/// as seconds, minutes and hours.
pub fn timemark_to_seconds(timemark: &str) -> Result<f64> {
    let invalid = || Error::InvalidTimemark(timemark.to_string());
    let trimmed = timemark.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let mut groups = trimmed.rsplit(':');
    let mut seconds: f64 = groups
        .next()
        .ok_or_else(invalid)?
        .parse()
        .map_err(|_| invalid())?;

    for factor in [60.0, 3600.0] {
        match groups.next() {
            Some(group) => {
                let value: f64 = group.parse().map_err(|_| invalid())?;
                seconds += value * factor;
            }
            None => break,
        }
    }

    if groups.next().is_some() || !seconds.is_finite() {
        return Err(invalid());
    }
    Ok(seconds)
}

/// A parsed progress report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Progress {
    pub frames: u64,
    pub current_fps: f64,
    /// Current output bitrate in kbit/s.
    pub current_kbps: f64,
    /// Output size so far, in kB.
    pub target_size: u64,
    pub timemark: String,
    /// Completion percentage, when the input duration is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
}

/// Split a line into `key=value` pairs.
///
/// Returns `None` unless every token is a `key=value` pair.
pub fn parse_progress_line(line: &str) -> Option<HashMap<String, String>> {
    let collapsed = EQUALS_SPACE.replace_all(line, "=");
    let collapsed = collapsed.trim();
    if collapsed.is_empty() {
        return None;
    }

    let mut values = HashMap::new();
    for token in collapsed.split_whitespace() {
        let (key, value) = token.split_once('=')?;
        if value.contains('=') {
            return None;
        }
        values.insert(key.to_string(), value.to_string());
    }
    Some(values)
}

/// Parse the numeric prefix of a value such as `100kB` or `25.3`.
fn leading_number(value: &str) -> Option<f64> {
    let end = value
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(value.len());
    value[..end].parse().ok()
}

/// Build a progress report from a stderr line, if it is a progress line.
pub fn extract_progress(line: &str, duration: Option<f64>) -> Option<Progress> {
    let values = parse_progress_line(line)?;
    let get = |key: &str| values.get(key).map(String::as_str);

    let timemark = get("time").unwrap_or_default().to_string();
    let percent = duration.filter(|d| *d > 0.0).and_then(|d| {
        timemark_to_seconds(&timemark)
            .ok()
            .map(|seconds| seconds / d * 100.0)
    });

    Some(Progress {
        frames: get("frame").and_then(leading_number).unwrap_or(0.0) as u64,
        current_fps: get("fps").and_then(leading_number).unwrap_or(0.0),
        current_kbps: get("bitrate").and_then(leading_number).unwrap_or(0.0),
        target_size: get("size")
            .or_else(|| get("Lsize"))
            .and_then(leading_number)
            .unwrap_or(0.0) as u64,
        timemark,
        percent,
    })
}
