//! The session model: a declarative description of one engine invocation.
//!
//! A [`Session`] collects inputs, outputs, filters and options through fluent
//! mutators and assembles them into an argument vector in a fixed order.
//! Running it is implemented in `run.rs`.

mod events;
mod input;
mod output;
mod run;
mod size;

pub use events::{Event, KillHandle};
use events::EventHub;
pub use input::{BoxedReader, Input, InputStream, Source};
pub(crate) use input::STDIN_TOKEN;
pub use output::{BoxedWriter, Output, OutputFlags, OutputStream, PipeOptions, Target};
pub use size::{parse_aspect, SizeData};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::args::ArgList;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::filter::{bracket_stream, make_filter_strings, Filter, FilterSpec};
use crate::process::RunOptions;
use crate::telemetry::Timemark;

/// One engine invocation under construction.
pub struct Session {
    pub(crate) inputs: Vec<Input>,
    pub(crate) outputs: Vec<Output>,
    pub(crate) global: ArgList,
    pub(crate) complex_filters: ArgList,
    current_input: Option<usize>,
    current_output: usize,
    pub(crate) options: RunOptions,
    pub(crate) engine: Arc<Engine>,
    pub(crate) events: EventHub,
    pub(crate) kill: KillHandle,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("global", &self.global)
            .field("complex_filters", &self.complex_filters)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Split `"-flag value"` strings at the first space.
fn split_options<I, S>(options: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::new();
    for option in options {
        match option.as_ref().split_once(' ') {
            Some((flag, value)) => {
                out.push(flag.to_string());
                out.push(value.to_string());
            }
            None => out.push(option.as_ref().to_string()),
        }
    }
    out
}

/// Append a `k` unit to bitrates given as bare numbers.
fn with_kilo_suffix(bitrate: &str) -> String {
    if bitrate.ends_with('k') || bitrate.ends_with('K') {
        bitrate.to_string()
    } else {
        format!("{bitrate}k")
    }
}

impl Session {
    /// Create an empty session bound to the process-wide engine.
    pub fn new() -> Self {
        Self::with_engine(Engine::global())
    }

    /// Create an empty session bound to an explicit engine.
    pub fn with_engine(engine: Arc<Engine>) -> Self {
        Self {
            inputs: Vec::new(),
            outputs: vec![Output::placeholder()],
            global: ArgList::new(),
            complex_filters: ArgList::new(),
            current_input: None,
            current_output: 0,
            options: RunOptions::default(),
            engine,
            events: EventHub::default(),
            kill: KillHandle::default(),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn run_options(&self) -> &RunOptions {
        &self.options
    }

    /// Subscribe to run events.
    ///
    /// Every subscriber receives every event of every later run. The stream
    /// ends when the session is dropped. Subscribing also enables the
    /// duration probe that feeds progress percentages.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Event> {
        self.events.subscribe()
    }

    /// A handle that kills this session's process while it runs.
    pub fn kill_handle(&self) -> KillHandle {
        self.kill.clone()
    }

    fn current_input(&mut self) -> Result<&mut Input> {
        let index = self.current_input.ok_or(Error::NoInput)?;
        self.inputs.get_mut(index).ok_or(Error::NoInput)
    }

    fn current_output(&mut self) -> &mut Output {
        &mut self.outputs[self.current_output]
    }

    // Run options

    pub fn set_run_options(&mut self, options: RunOptions) -> &mut Self {
        self.options = options;
        self
    }

    /// Scheduling priority, from -20 (highest) to 19 (lowest).
    pub fn niceness(&mut self, niceness: i32) -> &mut Self {
        self.options.niceness = niceness;
        self
    }

    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Number of captured stdout lines to keep (0 keeps everything).
    pub fn stdout_lines(&mut self, lines: usize) -> &mut Self {
        self.options.stdout_lines = lines;
        self
    }

    pub fn working_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.options.cwd = Some(dir.into());
        self
    }

    pub fn env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.options.envs.push((key.into(), value.into()));
        self
    }

    pub fn validate_capabilities(&mut self, validate: bool) -> &mut Self {
        self.options.validate_capabilities = validate;
        self
    }

    // Inputs

    /// Add a file or URI input and make it current.
    pub fn input(&mut self, source: impl Into<String>) -> &mut Self {
        self.inputs.push(Input::from_path(source.into()));
        self.current_input = Some(self.inputs.len() - 1);
        self
    }

    /// Add a live byte-stream input, fed through the engine's stdin.
    pub fn input_stream(&mut self, stream: InputStream) -> Result<&mut Self> {
        if self.inputs.iter().any(Input::is_stream) {
            return Err(Error::MultipleInputStreams);
        }
        self.inputs.push(Input::from_stream(stream));
        self.current_input = Some(self.inputs.len() - 1);
        Ok(self)
    }

    pub fn input_format(&mut self, format: &str) -> Result<&mut Self> {
        self.current_input()?.options.extend(["-f", format]);
        Ok(self)
    }

    pub fn input_fps(&mut self, fps: f64) -> Result<&mut Self> {
        self.current_input()?.options.push("-r").push(fps);
        Ok(self)
    }

    /// Read the current input at its native frame rate.
    pub fn native(&mut self) -> Result<&mut Self> {
        self.current_input()?.options.push("-re");
        Ok(self)
    }

    pub fn seek_input(&mut self, position: impl Into<Timemark>) -> Result<&mut Self> {
        let position = position.into();
        self.current_input()?.options.push("-ss").push(position);
        Ok(self)
    }

    /// Loop the current input, optionally limiting the output duration.
    pub fn loop_input(&mut self, duration: Option<Timemark>) -> Result<&mut Self> {
        self.current_input()?.options.extend(["-loop", "1"]);
        if let Some(duration) = duration {
            self.duration(duration);
        }
        Ok(self)
    }

    pub fn input_options<I, S>(&mut self, options: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let options = split_options(options);
        self.current_input()?.options.extend(options);
        Ok(self)
    }

    // Outputs

    /// Set the target of the placeholder output, or add a new output.
    pub fn output(&mut self, target: impl Into<String>) -> &mut Self {
        self.next_output().set_path(target.into());
        self
    }

    /// Write output to a live byte stream through the engine's stdout.
    pub fn output_stream(&mut self, stream: OutputStream, pipe: PipeOptions) -> Result<&mut Self> {
        if self.outputs.iter().any(Output::is_stream) {
            return Err(Error::MultipleOutputStreams);
        }
        self.next_output().set_stream(stream, pipe);
        Ok(self)
    }

    fn next_output(&mut self) -> &mut Output {
        if self.outputs[self.current_output].has_target() {
            self.outputs.push(Output::placeholder());
            self.current_output = self.outputs.len() - 1;
        }
        self.current_output()
    }

    /// Start writing at `position`.
    pub fn seek(&mut self, position: impl Into<Timemark>) -> &mut Self {
        let position = position.into();
        self.current_output().options.push("-ss").push(position);
        self
    }

    pub fn duration(&mut self, duration: impl Into<Timemark>) -> &mut Self {
        let duration = duration.into();
        self.current_output().options.push("-t").push(duration);
        self
    }

    pub fn format(&mut self, format: &str) -> &mut Self {
        self.current_output().options.extend(["-f", format]);
        self
    }

    /// Map a stream (or filter graph label) into the current output.
    pub fn map(&mut self, spec: &str) -> &mut Self {
        self.current_output()
            .options
            .push("-map")
            .push(bracket_stream(spec));
        self
    }

    /// Run the FLV metadata updater on this output after a successful run.
    pub fn update_flv_metadata(&mut self) -> &mut Self {
        self.current_output().flags.flvmeta = true;
        self
    }

    pub fn output_options<I, S>(&mut self, options: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let options = split_options(options);
        self.current_output().options.extend(options);
        self
    }

    // Audio

    pub fn no_audio(&mut self) -> &mut Self {
        let output = self.current_output();
        output.audio.clear();
        output.audio_filters.clear();
        output.audio.push("-an");
        self
    }

    pub fn audio_codec(&mut self, codec: &str) -> &mut Self {
        self.current_output().audio.extend(["-acodec", codec]);
        self
    }

    /// Audio bitrate; a bare number is taken as kbit/s.
    pub fn audio_bitrate(&mut self, bitrate: impl ToString) -> &mut Self {
        let bitrate = with_kilo_suffix(&bitrate.to_string());
        self.current_output().audio.push("-b:a").push(bitrate);
        self
    }

    pub fn audio_channels(&mut self, channels: u32) -> &mut Self {
        self.current_output().audio.push("-ac").push(channels);
        self
    }

    pub fn audio_frequency(&mut self, frequency: u32) -> &mut Self {
        self.current_output().audio.push("-ar").push(frequency);
        self
    }

    pub fn audio_quality(&mut self, quality: u32) -> &mut Self {
        self.current_output().audio.push("-aq").push(quality);
        self
    }

    pub fn audio_filters<I, F>(&mut self, filters: I) -> &mut Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FilterSpec>,
    {
        let specs: Vec<FilterSpec> = filters.into_iter().map(Into::into).collect();
        self.current_output()
            .audio_filters
            .extend(make_filter_strings(&specs));
        self
    }

    // Video

    pub fn no_video(&mut self) -> &mut Self {
        let output = self.current_output();
        output.video.clear();
        output.video_filters.clear();
        output.video.push("-vn");
        self
    }

    pub fn video_codec(&mut self, codec: &str) -> &mut Self {
        self.current_output().video.extend(["-vcodec", codec]);
        self
    }

    /// Video bitrate; a bare number is taken as kbit/s. `constant` pins the
    /// min and max rate to the same value.
    pub fn video_bitrate(&mut self, bitrate: impl ToString, constant: bool) -> &mut Self {
        let bitrate = with_kilo_suffix(&bitrate.to_string());
        let video = &mut self.current_output().video;
        video.push("-b:v").push(&bitrate);
        if constant {
            video
                .push("-maxrate")
                .push(&bitrate)
                .push("-minrate")
                .push(&bitrate)
                .extend(["-bufsize", "3M"]);
        }
        self
    }

    pub fn fps(&mut self, fps: f64) -> &mut Self {
        self.current_output().video.push("-r").push(fps);
        self
    }

    pub fn frames(&mut self, frames: u64) -> &mut Self {
        self.current_output().video.push("-vframes").push(frames);
        self
    }

    pub fn video_filters<I, F>(&mut self, filters: I) -> &mut Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FilterSpec>,
    {
        let specs: Vec<FilterSpec> = filters.into_iter().map(Into::into).collect();
        self.current_output()
            .video_filters
            .extend(make_filter_strings(&specs));
        self
    }

    // Size

    /// Output size: `WxH`, `Wx?`, `?xH` or `N%`.
    pub fn size(&mut self, size: &str) -> &mut Self {
        self.current_output().size_data.size = Some(size.to_string());
        self
    }

    /// Output aspect ratio: a decimal or `N:M`.
    pub fn aspect(&mut self, aspect: impl ToString) -> &mut Self {
        self.current_output().size_data.aspect = Some(aspect.to_string());
        self
    }

    /// Letterbox to the requested size, padding with `color` (black by
    /// default).
    pub fn autopad(&mut self, color: Option<&str>) -> &mut Self {
        self.current_output().size_data.pad = Some(color.unwrap_or("black").to_string());
        self
    }

    /// Resize so the display aspect ratio becomes the storage ratio.
    pub fn keep_display_aspect_ratio(&mut self) -> &mut Self {
        self.video_filters([
            Filter::new("scale")
                .option("w", "if(gt(sar,1),iw*sar,iw)")
                .option("h", "if(lt(sar,1),ih/sar,ih)"),
            Filter::new("setsar").value("1"),
        ])
    }

    // Global

    pub fn global_options<I, S>(&mut self, options: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.global.extend(split_options(options));
        self
    }

    /// Replace the complex filter graph, mapping the given labels to output.
    pub fn complex_filter<I, F, M, S>(&mut self, specs: I, maps: M) -> &mut Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FilterSpec>,
        M: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let specs: Vec<FilterSpec> = specs.into_iter().map(Into::into).collect();
        self.complex_filters.clear();
        self.complex_filters
            .push("-filter_complex")
            .push(make_filter_strings(&specs).join(";"));
        for map in maps {
            self.complex_filters
                .push("-map")
                .push(bracket_stream(map.as_ref()));
        }
        self
    }

    /// Assemble the engine argument vector.
    pub fn build_args(&self) -> Result<Vec<String>> {
        let mut args = Vec::new();

        for input in &self.inputs {
            args.extend(input.options.iter().cloned());
            args.push("-i".to_string());
            args.push(input.source_token().to_string());
        }

        args.extend(self.global.iter().cloned());

        if self.outputs.iter().any(Output::is_file) {
            args.push("-y".to_string());
        }

        args.extend(self.complex_filters.iter().cloned());

        for output in &self.outputs {
            let size_filters = size::size_filters(&output.size_data)?;

            args.extend(output.audio.iter().cloned());
            if !output.audio_filters.is_empty() {
                args.push("-filter:a".to_string());
                args.push(output.audio_filters.as_slice().join(","));
            }

            args.extend(output.video.iter().cloned());
            let video_filters: Vec<&str> = output
                .video_filters
                .iter()
                .map(String::as_str)
                .chain(size_filters.iter().map(String::as_str))
                .collect();
            if !video_filters.is_empty() {
                args.push("-filter:v".to_string());
                args.push(video_filters.join(","));
            }

            args.extend(output.options.iter().cloned());
            if let Some(target) = output.target_token() {
                args.push(target.to_string());
            }
        }

        Ok(args)
    }
}

impl Clone for Session {
    /// Copy the session's configuration.
    ///
    /// Inputs keep sharing stream handles. Only the first output's settings
    /// carry over, and only while it has no target yet. Subscribers and any
    /// live process stay with the original.
    fn clone(&self) -> Self {
        let mut clone = Session::with_engine(self.engine.clone());
        clone.inputs = self.inputs.clone();
        clone.current_input = self.inputs.len().checked_sub(1);
        clone.global = self.global.clone();
        clone.complex_filters = self.complex_filters.clone();
        clone.options = self.options.clone();
        if !self.outputs[0].has_target() {
            clone.outputs = vec![self.outputs[0].detached()];
        }
        clone
    }
}
