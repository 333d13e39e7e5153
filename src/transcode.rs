//! Single-file transcoding as driven from the command line.

use std::sync::Arc;

use anyhow::{Context, Result};
use ffkit_av::{Engine, Event, RunOptions, Session};

/// Everything the `transcode` command can ask for.
#[derive(Debug, Clone, Default)]
pub struct TranscodeJob {
    pub inputs: Vec<String>,
    pub output: String,
    pub format: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub size: Option<String>,
    pub aspect: Option<String>,
    /// `Some` enables padding; the inner value is the pad color.
    pub autopad: Option<Option<String>>,
    pub seek: Option<String>,
    pub duration: Option<String>,
    pub video_filters: Vec<String>,
    pub audio_filters: Vec<String>,
    pub no_audio: bool,
    pub no_video: bool,
}

impl TranscodeJob {
    /// Build the session for this job.
    pub fn session(&self, engine: Arc<Engine>, options: RunOptions) -> Result<Session> {
        if self.inputs.is_empty() {
            anyhow::bail!("At least one input is required");
        }

        let mut session = Session::with_engine(engine);
        session.set_run_options(options);
        for input in &self.inputs {
            session.input(input.as_str());
        }
        if let Some(seek) = &self.seek {
            session
                .seek_input(seek.as_str())
                .context("Failed to apply input seek")?;
        }

        session.output(self.output.as_str());
        if let Some(format) = &self.format {
            session.format(format);
        }
        if let Some(duration) = &self.duration {
            session.duration(duration.as_str());
        }

        if self.no_audio {
            session.no_audio();
        } else {
            if let Some(codec) = &self.audio_codec {
                session.audio_codec(codec);
            }
            if !self.audio_filters.is_empty() {
                session.audio_filters(self.audio_filters.iter().map(String::as_str));
            }
        }

        if self.no_video {
            session.no_video();
        } else {
            if let Some(codec) = &self.video_codec {
                session.video_codec(codec);
            }
            if !self.video_filters.is_empty() {
                session.video_filters(self.video_filters.iter().map(String::as_str));
            }
            if let Some(size) = &self.size {
                session.size(size);
            }
            if let Some(aspect) = &self.aspect {
                session.aspect(aspect);
            }
            if let Some(color) = &self.autopad {
                session.autopad(color.as_deref());
            }
        }

        Ok(session)
    }
}

/// Run a session, reporting progress on stderr.
///
/// The session is consumed so that its event stream ends with the run and
/// the reporter can print everything the engine said before returning.
pub async fn run_with_progress(mut session: Session) -> Result<()> {
    let mut events = session.subscribe();
    let reporter = tokio::spawn(async move {
        let mut seen = 0usize;
        while let Some(event) = events.recv().await {
            seen += 1;
            match event {
                Event::Start { command_line } => {
                    tracing::debug!("Engine started: {}", command_line);
                }
                Event::Progress(progress) => match progress.percent {
                    Some(percent) => eprint!(
                        "\r{:>6.2}%  frame {}  {}",
                        percent, progress.frames, progress.timemark
                    ),
                    None => eprint!("\rframe {}  {}", progress.frames, progress.timemark),
                },
                Event::Stderr(line) => tracing::trace!("ffmpeg: {}", line),
                Event::CodecData(inputs) => {
                    for input in inputs {
                        tracing::info!(
                            "Input {} ({}): video {}, audio {}",
                            input.format,
                            input.duration,
                            input.video,
                            input.audio
                        );
                    }
                }
            }
        }
        seen
    });

    let result = session.run().await;
    drop(session);
    let seen = reporter.await.context("Progress reporter panicked")?;
    if seen > 0 {
        eprintln!();
    }

    result.context("Transcoding failed")?;
    Ok(())
}
