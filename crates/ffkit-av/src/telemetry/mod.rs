//! Telemetry extraction from engine stderr.
//!
//! - [`TelemetryRing`]: bounded line history fed by raw output chunks
//! - [`extract_progress`]: progress line parsing
//! - [`CodecDataExtractor`]: input codec header scraping
//! - [`extract_error`]: picks the likely error message out of stderr

mod codec_data;
mod progress;
mod ring;

pub use codec_data::{CodecDataExtractor, InputCodecData};
pub use progress::{extract_progress, parse_progress_line, timemark_to_seconds, Progress, Timemark};
pub use ring::{LineCallback, TelemetryRing};

/// Extract the likely error message from full stderr text.
///
/// Lines starting with a space or `[` are informational and reset the
/// accumulated message; the lines after the last such reset are kept.
pub fn extract_error(stderr: &str) -> String {
    let mut message: Vec<&str> = Vec::new();
    for line in stderr.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with(' ') || line.starts_with('[') {
            message.clear();
        } else {
            message.push(line);
        }
    }
    message.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_tail_skips_noise() {
        let stderr = "\
ffmpeg version 6.0
  configuration: --enable-gpl
Input #0, wav, from 'a.wav':
  Duration: 00:00:01.00
[aac @ 0x55] Unknown option
Unknown encoder 'nope'
Conversion failed!";
        assert_eq!(
            extract_error(stderr),
            "Unknown encoder 'nope'\nConversion failed!"
        );
    }

    #[test]
    fn error_tail_of_quiet_stderr() {
        assert_eq!(extract_error("only line"), "only line");
        assert_eq!(extract_error("[x] noise"), "");
    }
}
