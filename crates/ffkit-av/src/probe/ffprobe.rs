//! Parser for ffprobe's default bracketed block output.

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::{ProbeData, ProbeSection, ProbeValue};

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?$").unwrap());

fn value_for(key: &str, raw: &str) -> ProbeValue {
    if !key.starts_with("TAG:") && NUMBER.is_match(raw) {
        if let Ok(n) = raw.parse() {
            return ProbeValue::Number(n);
        }
    }
    ProbeValue::Text(raw.to_string())
}

/// Read `key=value` lines until the block's closing tag.
fn parse_block<'a>(lines: &mut impl Iterator<Item = &'a str>, name: &str) -> ProbeSection {
    let closing = format!("[/{name}]");
    let mut section = ProbeSection::default();

    for line in lines.by_ref() {
        if line.eq_ignore_ascii_case(&closing) {
            break;
        }
        if line.starts_with('[') {
            continue;
        }
        if let Some((key, raw)) = line.split_once('=') {
            if key.is_empty() {
                continue;
            }
            let value = value_for(key, raw);
            if let Some(tag) = key.strip_prefix("TAG:") {
                section.tags.insert(tag.to_string(), value);
            } else if let Some(flag) = key.strip_prefix("DISPOSITION:") {
                section.disposition.insert(flag.to_string(), value);
            } else {
                section.fields.insert(key.to_string(), value);
            }
        }
    }

    section
}

/// Parse the output of `ffprobe -show_streams -show_format`.
pub fn parse_ffprobe_output(text: &str) -> ProbeData {
    let mut data = ProbeData::default();
    let mut lines = text.lines().map(|l| l.trim_end_matches('\r'));

    while let Some(line) = lines.next() {
        let lower = line.to_ascii_lowercase();
        if lower.starts_with("[stream") {
            data.streams.push(parse_block(&mut lines, "stream"));
        } else if lower.starts_with("[chapter") {
            data.chapters.push(parse_block(&mut lines, "chapter"));
        } else if lower == "[format]" {
            data.format = parse_block(&mut lines, "format");
        }
    }

    data
}
