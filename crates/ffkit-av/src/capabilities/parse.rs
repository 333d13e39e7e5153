//! Parsers for the engine's `-formats`, `-codecs`, `-encoders` and `-filters`
//! listings.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([D ])([E ])\s+([^ ]+)\s+(.*)$").unwrap());
static CODEC_LEGACY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([D ])([E ])([VAS])([S ])([D ])([T ]) ([^ ]+) +(.*)$").unwrap()
});
static CODEC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([D\.])([E\.])([VAS])([I\.])([L\.])([S\.]) ([^ ]+) +(.*)$").unwrap()
});
static ENCODERS_NOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(encoders:([^\)]+)\)").unwrap());
static DECODERS_NOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(decoders:([^\)]+)\)").unwrap());
static ENCODER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([VAS\.])([F\.])([S\.])([X\.])([B\.])([D\.]) ([^ ]+) +(.*)$").unwrap()
});
static FILTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?: [T\.][S\.][C\.] )?([^ ]+) +(AA?|VV?|N|\|)->(AA?|VV?|N|\|) +(.*)$").unwrap()
});

/// Media type of a codec or encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
}

impl MediaKind {
    fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "V" => Some(MediaKind::Video),
            "A" => Some(MediaKind::Audio),
            "S" => Some(MediaKind::Subtitle),
            _ => None,
        }
    }
}

/// A container format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormatInfo {
    pub description: String,
    pub can_demux: bool,
    pub can_mux: bool,
}

/// A codec, or an encoder/decoder implementation of one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodecInfo {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub description: String,
    pub can_decode: bool,
    pub can_encode: bool,
    /// Current layout only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intra_frame_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_lossy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_lossless: Option<bool>,
    /// Legacy layout only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draw_horiz_band: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_rendering: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weird_frame_truncation: Option<bool>,
}

/// An encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncoderInfo {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub description: String,
    pub frame_mt: bool,
    pub slice_mt: bool,
    pub experimental: bool,
    pub draw_horiz_band: bool,
    pub direct_rendering: bool,
}

/// What a filter pad accepts or produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PadKind {
    Audio,
    Video,
    /// Source or sink side without pads.
    None,
    /// Number of pads depends on options.
    Dynamic,
}

/// A filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterInfo {
    pub description: String,
    pub input: PadKind,
    pub multiple_inputs: bool,
    pub output: PadKind,
    pub multiple_outputs: bool,
}

pub type Formats = BTreeMap<String, FormatInfo>;
pub type Codecs = BTreeMap<String, CodecInfo>;
pub type Encoders = BTreeMap<String, EncoderInfo>;
pub type Filters = BTreeMap<String, FilterInfo>;

/// Parse `-formats` output. Comma-separated names share one entry each.
pub fn parse_formats(text: &str) -> Formats {
    let mut formats = Formats::new();
    for line in text.lines() {
        let Some(caps) = FORMAT.captures(line) else {
            continue;
        };
        if &caps[3] == "=" {
            continue;
        }
        for name in caps[3].split(',') {
            let entry = formats.entry(name.to_string()).or_default();
            if entry.description.is_empty() {
                entry.description = caps[4].to_string();
            }
            entry.can_demux |= &caps[1] == "D";
            entry.can_mux |= &caps[2] == "E";
        }
    }
    formats
}

fn coder_names(note: &Regex, description: &str) -> Vec<String> {
    note.captures(description)
        .map(|caps| {
            caps[1]
                .split_whitespace()
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Parse `-codecs` output in either the legacy or the current layout.
///
/// `(encoders: …)` and `(decoders: …)` annotations produce additional
/// entries for each named implementation.
pub fn parse_codecs(text: &str) -> Codecs {
    let mut codecs = Codecs::new();

    for line in text.lines() {
        let (name, info) = if let Some(caps) = CODEC_LEGACY.captures(line) {
            let Some(kind) = MediaKind::from_flag(&caps[3]) else {
                continue;
            };
            let info = CodecInfo {
                kind,
                description: caps[8].to_string(),
                can_decode: &caps[1] == "D",
                can_encode: &caps[2] == "E",
                intra_frame_only: None,
                is_lossy: None,
                is_lossless: None,
                draw_horiz_band: Some(&caps[4] == "S"),
                direct_rendering: Some(&caps[5] == "D"),
                weird_frame_truncation: Some(&caps[6] == "T"),
            };
            (caps[7].to_string(), info)
        } else if let Some(caps) = CODEC.captures(line) {
            let Some(kind) = MediaKind::from_flag(&caps[3]) else {
                continue;
            };
            let info = CodecInfo {
                kind,
                description: caps[8].to_string(),
                can_decode: &caps[1] == "D",
                can_encode: &caps[2] == "E",
                intra_frame_only: Some(&caps[4] == "I"),
                is_lossy: Some(&caps[5] == "L"),
                is_lossless: Some(&caps[6] == "S"),
                draw_horiz_band: None,
                direct_rendering: None,
                weird_frame_truncation: None,
            };
            (caps[7].to_string(), info)
        } else {
            continue;
        };

        if name == "=" {
            continue;
        }

        for encoder in coder_names(&ENCODERS_NOTE, &info.description) {
            let entry = codecs.entry(encoder).or_insert_with(|| CodecInfo {
                can_decode: false,
                ..info.clone()
            });
            entry.can_encode = true;
        }
        for decoder in coder_names(&DECODERS_NOTE, &info.description) {
            let entry = codecs.entry(decoder).or_insert_with(|| CodecInfo {
                can_encode: false,
                ..info.clone()
            });
            entry.can_decode = true;
        }

        // The base entry keeps whatever an implementation with the same
        // name already recorded.
        match codecs.get_mut(&name) {
            Some(existing) => {
                existing.can_encode |= info.can_encode;
                existing.can_decode |= info.can_decode;
            }
            None => {
                codecs.insert(name, info);
            }
        }
    }

    codecs
}

/// Parse `-encoders` output.
pub fn parse_encoders(text: &str) -> Encoders {
    let mut encoders = Encoders::new();
    for line in text.lines() {
        let Some(caps) = ENCODER.captures(line) else {
            continue;
        };
        if &caps[7] == "=" {
            continue;
        }
        let Some(kind) = MediaKind::from_flag(&caps[1]) else {
            continue;
        };
        encoders.insert(
            caps[7].to_string(),
            EncoderInfo {
                kind,
                description: caps[8].to_string(),
                frame_mt: &caps[2] == "F",
                slice_mt: &caps[3] == "S",
                experimental: &caps[4] == "X",
                draw_horiz_band: &caps[5] == "B",
                direct_rendering: &caps[6] == "D",
            },
        );
    }
    encoders
}

fn pad_kind(spec: &str) -> (PadKind, bool) {
    match spec {
        "A" => (PadKind::Audio, false),
        "AA" => (PadKind::Audio, true),
        "V" => (PadKind::Video, false),
        "VV" => (PadKind::Video, true),
        "N" => (PadKind::Dynamic, true),
        _ => (PadKind::None, false),
    }
}

/// Parse `-filters` output.
pub fn parse_filters(text: &str) -> Filters {
    let mut filters = Filters::new();
    for line in text.lines() {
        let Some(caps) = FILTER.captures(line) else {
            continue;
        };
        if &caps[1] == "=" {
            continue;
        }
        let (input, multiple_inputs) = pad_kind(&caps[2]);
        let (output, multiple_outputs) = pad_kind(&caps[3]);
        filters.insert(
            caps[1].to_string(),
            FilterInfo {
                description: caps[4].to_string(),
                input,
                multiple_inputs,
                output,
                multiple_outputs,
            },
        );
    }
    filters
}
