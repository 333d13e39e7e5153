//! Input codec information scraped from the engine's stderr header.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static INPUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"Input #[0-9]+, ([^ ]+),").unwrap());
static DURATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"Duration: ([^,]+)").unwrap());
static AUDIO: Lazy<Regex> = Lazy::new(|| Regex::new(r"Audio: (.*)").unwrap());
static VIDEO: Lazy<Regex> = Lazy::new(|| Regex::new(r"Video: (.*)").unwrap());
static OUTPUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"Output #\d+").unwrap());
static HEADER_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Stream mapping:|Press (\[q\]|ctrl-c) to stop").unwrap());

/// Codec information for one engine input.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InputCodecData {
    pub format: String,
    pub duration: String,
    pub audio: String,
    pub audio_details: Vec<String>,
    pub video: String,
    pub video_details: Vec<String>,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Header,
    Input,
    Done,
}

/// Line-driven state machine collecting [`InputCodecData`] records.
///
/// Records are returned once, when the end of the header is seen. After that
/// the extractor ignores everything.
#[derive(Debug, Default)]
pub struct CodecDataExtractor {
    state: State,
    inputs: Vec<InputCodecData>,
}

fn split_details(details: &str) -> (String, Vec<String>) {
    let parts: Vec<String> = details.split(", ").map(str::to_string).collect();
    let first = parts.first().cloned().unwrap_or_default();
    (first, parts)
}

impl CodecDataExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Feed one stderr line. Returns the records when the header ends.
    pub fn feed(&mut self, line: &str) -> Option<Vec<InputCodecData>> {
        if self.is_done() {
            return None;
        }
        let in_input = matches!(self.state, State::Input);

        if let Some(caps) = INPUT.captures(line) {
            self.state = State::Input;
            self.inputs.push(InputCodecData {
                format: caps[1].to_string(),
                ..Default::default()
            });
        } else if let (true, Some(caps)) = (in_input, DURATION.captures(line)) {
            if let Some(current) = self.inputs.last_mut() {
                current.duration = caps[1].to_string();
            }
        } else if let (true, Some(caps)) = (in_input, AUDIO.captures(line)) {
            if let Some(current) = self.inputs.last_mut() {
                (current.audio, current.audio_details) = split_details(&caps[1]);
            }
        } else if let (true, Some(caps)) = (in_input, VIDEO.captures(line)) {
            if let Some(current) = self.inputs.last_mut() {
                (current.video, current.video_details) = split_details(&caps[1]);
            }
        } else if OUTPUT.is_match(line) {
            self.state = State::Header;
        } else if HEADER_END.is_match(line) {
            self.state = State::Done;
            return Some(std::mem::take(&mut self.inputs));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "\
ffmpeg version 6.0 Copyright (c) 2000-2023 the FFmpeg developers
Input #0, matroska,webm, from 'in.mkv':
  Duration: 00:01:30.05, start: 0.000000, bitrate: 5000 kb/s
    Stream #0:0: Video: h264 (High), yuv420p(progressive), 1920x1080, 23.98 fps
    Stream #0:1(eng): Audio: aac (LC), 48000 Hz, stereo, fltp
Output #0, mp4, to 'out.mp4':
    Stream #0:0: Video: h264
Stream mapping:
  Stream #0:0 -> #0:0 (copy)
Press [q] to stop, [?] for help";

    #[test]
    fn extracts_input_records_once() {
        let mut extractor = CodecDataExtractor::new();
        let mut emitted = Vec::new();
        for line in HEADER.lines() {
            if let Some(records) = extractor.feed(line) {
                emitted.push(records);
            }
        }

        assert_eq!(emitted.len(), 1);
        let records = &emitted[0];
        assert_eq!(records.len(), 1);
        let input = &records[0];
        assert_eq!(input.format, "matroska,webm");
        assert_eq!(input.duration, "00:01:30.05");
        assert_eq!(input.video, "h264 (High)");
        assert_eq!(input.video_details[2], "1920x1080");
        assert_eq!(input.audio, "aac (LC)");
        assert_eq!(input.audio_details.len(), 4);
        assert!(extractor.is_done());
    }

    #[test]
    fn output_streams_do_not_overwrite_inputs() {
        let mut extractor = CodecDataExtractor::new();
        extractor.feed("Input #0, wav, from 'a.wav':");
        extractor.feed("    Stream #0:0: Audio: pcm_s16le, 44100 Hz, mono, s16");
        extractor.feed("Output #0, mp3, to 'a.mp3':");
        extractor.feed("    Stream #0:0: Audio: mp3, 44100 Hz, mono");
        let records = extractor.feed("Press ctrl-c to stop encoding").unwrap();
        assert_eq!(records[0].audio, "pcm_s16le");
        assert_eq!(records[0].video, "");
    }

    #[test]
    fn multiple_inputs() {
        let mut extractor = CodecDataExtractor::new();
        extractor.feed("Input #0, image2, from 'logo.png':");
        extractor.feed("Input #1, mov,mp4,m4a, from 'in.mp4':");
        extractor.feed("  Duration: 00:00:10.00, start: 0.0");
        let records = extractor.feed("Stream mapping:").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].duration, "");
        assert_eq!(records[1].format, "mov,mp4,m4a");
        assert_eq!(records[1].duration, "00:00:10.00");
        assert!(extractor.feed("Input #2, x, from 'y':").is_none());
    }
}
