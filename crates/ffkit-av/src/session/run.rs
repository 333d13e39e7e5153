//! Running a session.

use tracing::{debug, info, warn};

use super::{Event, Output, Session, Source, Target};
use crate::capabilities::patch_experimental;
use crate::error::{Error, ProcessFailure, Result};
use crate::probe;
use crate::process::{Captured, Invocation};
use crate::telemetry::{extract_progress, CodecDataExtractor};
use crate::tools::Tool;

impl Session {
    /// Run the engine with the assembled arguments.
    ///
    /// Steps, each of which can end the run:
    /// 1. require an output with a target
    /// 2. check requested formats and codecs (unless disabled)
    /// 3. probe the first input's duration for progress percentages, when
    ///    anyone is subscribed
    /// 4. assemble arguments
    /// 5. enable experimental encoders
    /// 6. run the engine
    /// 7. update FLV metadata on flagged file outputs
    ///
    /// Nothing is spawned when steps 1 to 5 fail.
    pub async fn run(&mut self) -> Result<Captured> {
        if !self.outputs.iter().any(Output::has_target) {
            return Err(Error::NoOutput);
        }

        if self.options.validate_capabilities {
            self.engine.validate(self).await?;
        }

        let duration = if self.events.has_subscribers() {
            self.probe_duration().await
        } else {
            None
        };

        let mut args = self.build_args()?;

        match self.engine.encoders().await {
            Ok(encoders) => patch_experimental(&mut args, &encoders),
            Err(err) if self.options.validate_capabilities => return Err(err),
            Err(err) => warn!("could not list encoders, experimental flags not added: {err}"),
        }

        let captured = self.spawn_engine(args, duration).await?;
        self.write_flv_metadata(&captured).await?;
        Ok(captured)
    }

    /// Duration of the first input in seconds, if it can be probed.
    async fn probe_duration(&self) -> Option<f64> {
        let input = self.inputs.first()?;
        let path = input.path()?;
        match probe::ffprobe(&self.engine, path, &[], &self.options).await {
            Ok(data) => data.duration(),
            Err(err) => {
                warn!("could not probe duration of {path}: {err}");
                None
            }
        }
    }

    async fn spawn_engine(&mut self, args: Vec<String>, duration: Option<f64>) -> Result<Captured> {
        let ffmpeg = self.engine.tools().require(Tool::Ffmpeg)?;

        let input_stream = self.inputs.iter().find_map(|i| match i.source() {
            Source::Stream(stream) => Some(stream.clone()),
            Source::Path(_) => None,
        });
        let output_stream = self.outputs.iter().find_map(|o| match o.target() {
            Some(Target::Stream(stream)) => Some((stream.clone(), o.pipe_options())),
            _ => None,
        });
        if input_stream.as_ref().is_some_and(|s| s.is_consumed()) {
            return Err(Error::InvalidInput("input stream already consumed".into()));
        }
        if output_stream.as_ref().is_some_and(|(s, _)| s.is_consumed()) {
            return Err(Error::InvalidOutput("output stream already consumed".into()));
        }

        let mut inv = Invocation::new(Tool::Ffmpeg.name(), ffmpeg);
        inv.options(&self.options).args(args);

        if let Some(reader) = input_stream.and_then(|s| s.take()) {
            inv.input_boxed(reader);
        }
        match output_stream.and_then(|(s, pipe)| s.take().map(|w| (w, pipe))) {
            Some((writer, pipe)) => {
                inv.output(writer, pipe);
            }
            None => {
                inv.capture_stdout(true);
            }
        }

        let events = self.events.clone();
        let mut codec_data = CodecDataExtractor::new();
        inv.on_stderr_line(move |line| {
            events.send(Event::Stderr(line.to_string()));
            if !codec_data.is_done() {
                if let Some(records) = codec_data.feed(line) {
                    events.send(Event::CodecData(records));
                }
            }
            if let Some(progress) = extract_progress(line, duration) {
                events.send(Event::Progress(progress));
            }
        });

        let command_line = inv.command_line().join(" ");
        info!("running {command_line}");
        self.events.send(Event::Start { command_line });

        inv.cancel_token(self.kill.arm());
        let result = inv.execute().await;
        self.kill.disarm();

        match &result {
            Ok(_) => info!("ffmpeg finished"),
            Err(err) => warn!("ffmpeg failed: {err}"),
        }
        result
    }

    async fn write_flv_metadata(&self, captured: &Captured) -> Result<()> {
        let targets: Vec<&str> = self
            .outputs
            .iter()
            .filter(|o| o.flags().flvmeta && o.is_file())
            .filter_map(Output::path)
            .collect();
        if targets.is_empty() {
            return Ok(());
        }

        let flvtool = self.engine.tools().require(Tool::Flvtool)?;
        for target in targets {
            debug!("updating flv metadata of {target}");
            let mut inv = Invocation::new(Tool::Flvtool.name(), &flvtool);
            inv.options(&self.options).args(["-U", target]);
            if let Err(err) = inv.execute().await {
                return Err(Error::process(
                    ProcessFailure::PostProcess {
                        tool: flvtool.display().to_string(),
                        target: target.to_string(),
                        message: err.to_string(),
                    },
                    captured.stdout.clone(),
                    captured.stderr.clone(),
                ));
            }
        }
        Ok(())
    }
}
