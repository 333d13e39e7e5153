//! Media introspection through ffprobe.
//!
//! ffprobe is run with `-show_streams -show_format` and its default block
//! output is parsed into [`ProbeData`].

mod ffprobe;
mod types;

pub use ffprobe::parse_ffprobe_output;
pub use types::{ProbeData, ProbeSection, ProbeValue};

use tracing::debug;

use crate::engine::Engine;
use crate::process::{Invocation, RunOptions};
use crate::session::{BoxedReader, Session, Source};
use crate::tools::Tool;
use crate::{Error, Result};

/// Where ffprobe reads from.
pub enum ProbeSource {
    Path(String),
    Stream(BoxedReader),
}

impl From<&str> for ProbeSource {
    fn from(path: &str) -> Self {
        ProbeSource::Path(path.to_string())
    }
}

impl From<String> for ProbeSource {
    fn from(path: String) -> Self {
        ProbeSource::Path(path)
    }
}

impl From<&std::path::Path> for ProbeSource {
    fn from(path: &std::path::Path) -> Self {
        ProbeSource::Path(path.display().to_string())
    }
}

/// Run ffprobe on `source` with extra options placed before it.
pub async fn ffprobe(
    engine: &Engine,
    source: impl Into<ProbeSource>,
    options: &[String],
    run: &RunOptions,
) -> Result<ProbeData> {
    let ffprobe = engine.tools().require(Tool::Ffprobe)?;

    let mut inv = Invocation::new(Tool::Ffprobe.name(), ffprobe);
    inv.options(run)
        .stdout_lines(0)
        .capture_stdout(true)
        .args(["-show_streams", "-show_format"])
        .args(options.iter().cloned());

    match source.into() {
        ProbeSource::Path(path) => {
            debug!("probing {path}");
            inv.arg(path);
        }
        ProbeSource::Stream(reader) => {
            debug!("probing stdin stream");
            inv.arg(crate::session::STDIN_TOKEN).input_boxed(reader);
        }
    }

    let captured = inv.execute().await?;
    let data = parse_ffprobe_output(&captured.stdout);
    if data.streams.is_empty() && data.format.fields.is_empty() {
        return Err(Error::parse_error(
            Tool::Ffprobe.name(),
            "no stream or format blocks in output",
        ));
    }
    Ok(data)
}

impl Session {
    /// Probe one of this session's inputs.
    ///
    /// A stream input is consumed by probing it.
    pub async fn probe(&self, index: usize, options: &[String]) -> Result<ProbeData> {
        let input = self.inputs.get(index).ok_or(Error::NoInput)?;
        let source = match input.source() {
            Source::Path(path) => ProbeSource::Path(path.clone()),
            Source::Stream(stream) => ProbeSource::Stream(
                stream
                    .take()
                    .ok_or_else(|| Error::InvalidInput("input stream already consumed".into()))?,
            ),
        };
        ffprobe(&self.engine, source, options, &self.options).await
    }
}
