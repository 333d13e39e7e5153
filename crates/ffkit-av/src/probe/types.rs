//! Introspection result types.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// A value reported by ffprobe: numeric-looking values become numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProbeValue {
    Number(f64),
    Text(String),
}

impl ProbeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ProbeValue::Number(n) => Some(*n),
            ProbeValue::Text(t) => t.parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ProbeValue::Text(t) => Some(t),
            ProbeValue::Number(_) => None,
        }
    }
}

impl fmt::Display for ProbeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeValue::Number(n) => write!(f, "{n}"),
            ProbeValue::Text(t) => f.write_str(t),
        }
    }
}

/// One `[STREAM]`, `[FORMAT]` or `[CHAPTER]` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProbeSection {
    #[serde(flatten)]
    pub fields: BTreeMap<String, ProbeValue>,
    /// `TAG:*` entries with the prefix removed.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, ProbeValue>,
    /// `DISPOSITION:*` entries with the prefix removed.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub disposition: BTreeMap<String, ProbeValue>,
}

impl ProbeSection {
    pub fn get(&self, key: &str) -> Option<&ProbeValue> {
        self.fields.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ProbeValue::as_f64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ProbeValue::as_str)
    }

    /// `codec_type` of a stream block.
    pub fn codec_type(&self) -> Option<&str> {
        self.get_str("codec_type")
    }

    /// Frame rate of a stream block, from `r_frame_rate`.
    pub fn frame_rate(&self) -> Option<f64> {
        match self.get("r_frame_rate")? {
            ProbeValue::Number(n) => Some(*n),
            ProbeValue::Text(t) => parse_frame_rate(t),
        }
    }
}

/// Parse a frame rate string like "24000/1001" or "25".
fn parse_frame_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => rate.parse().ok(),
    }
}

/// Parsed ffprobe output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProbeData {
    pub streams: Vec<ProbeSection>,
    pub format: ProbeSection,
    pub chapters: Vec<ProbeSection>,
}

impl ProbeData {
    /// Container duration in seconds.
    pub fn duration(&self) -> Option<f64> {
        self.format.get_f64("duration")
    }

    /// Streams whose `codec_type` equals `kind` (`video`, `audio`, ...).
    pub fn streams_of(&self, kind: &str) -> impl Iterator<Item = &ProbeSection> + '_ {
        let kind = kind.to_string();
        self.streams
            .iter()
            .filter(move |s| s.codec_type() == Some(kind.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("24000/1001"), Some(23.976023976023978));
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("invalid"), None);
    }

    #[test]
    fn section_serializes_flat() {
        let mut section = ProbeSection::default();
        section
            .fields
            .insert("codec_name".into(), ProbeValue::Text("h264".into()));
        section.fields.insert("width".into(), ProbeValue::Number(1920.0));
        section
            .tags
            .insert("language".into(), ProbeValue::Text("eng".into()));

        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json["codec_name"], "h264");
        assert_eq!(json["width"], 1920.0);
        assert_eq!(json["tags"]["language"], "eng");
        assert!(json.get("disposition").is_none());
    }
}
