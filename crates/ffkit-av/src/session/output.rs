//! Session outputs.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncWrite;

use super::input::is_file_target;
use super::size::SizeData;
use crate::args::ArgList;

/// Boxed byte sink fed from the engine's stdout.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Token passed to the engine in place of a live output stream.
pub(crate) const STDOUT_TOKEN: &str = "pipe:1";

/// A live byte-stream output.
#[derive(Clone)]
pub struct OutputStream {
    inner: Arc<Mutex<Option<BoxedWriter>>>,
}

impl OutputStream {
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(writer)))),
        }
    }

    pub(crate) fn take(&self) -> Option<BoxedWriter> {
        self.inner.lock().take()
    }

    pub fn is_consumed(&self) -> bool {
        self.inner.lock().is_none()
    }
}

impl fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStream")
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

/// How a stream sink is treated once the engine's stdout ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeOptions {
    /// Shut the sink down after the last byte.
    pub end: bool,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self { end: true }
    }
}

/// Per-output post-processing flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputFlags {
    /// Run the FLV metadata updater on this output after a successful run.
    pub flvmeta: bool,
}

/// Where an output writes to.
#[derive(Debug, Clone)]
pub enum Target {
    Path(String),
    Stream(OutputStream),
}

/// One engine output with its per-output option lists.
#[derive(Debug, Clone, Default)]
pub struct Output {
    pub(crate) target: Option<Target>,
    pub(crate) is_file: bool,
    pub(crate) pipe: PipeOptions,
    pub(crate) flags: OutputFlags,
    pub(crate) audio: ArgList,
    pub(crate) audio_filters: ArgList,
    pub(crate) video: ArgList,
    pub(crate) video_filters: ArgList,
    pub(crate) options: ArgList,
    pub(crate) size_data: SizeData,
}

impl Output {
    /// An output with no target yet.
    pub(crate) fn placeholder() -> Self {
        Self::default()
    }

    pub(crate) fn set_path(&mut self, target: String) {
        self.is_file = is_file_target(&target);
        self.target = Some(Target::Path(target));
    }

    pub(crate) fn set_stream(&mut self, stream: OutputStream, pipe: PipeOptions) {
        self.is_file = false;
        self.pipe = pipe;
        self.target = Some(Target::Stream(stream));
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    pub fn is_file(&self) -> bool {
        self.is_file
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.target, Some(Target::Stream(_)))
    }

    pub fn flags(&self) -> OutputFlags {
        self.flags
    }

    pub fn pipe_options(&self) -> PipeOptions {
        self.pipe
    }

    /// Path of the target if it is a file or URI.
    pub fn path(&self) -> Option<&str> {
        match &self.target {
            Some(Target::Path(p)) => Some(p),
            _ => None,
        }
    }

    pub fn audio(&self) -> &ArgList {
        &self.audio
    }

    pub fn video(&self) -> &ArgList {
        &self.video
    }

    pub fn options(&self) -> &ArgList {
        &self.options
    }

    pub(crate) fn target_token(&self) -> Option<&str> {
        match &self.target {
            Some(Target::Path(p)) => Some(p),
            Some(Target::Stream(_)) => Some(STDOUT_TOKEN),
            None => None,
        }
    }

    /// Copy of this output's settings without a target, used when cloning a
    /// session whose first output is still a placeholder.
    pub(crate) fn detached(&self) -> Self {
        Self {
            target: None,
            is_file: false,
            pipe: PipeOptions::default(),
            flags: self.flags,
            audio: self.audio.clone(),
            audio_filters: self.audio_filters.clone(),
            video: self.video.clone(),
            video_filters: self.video_filters.clone(),
            options: self.options.clone(),
            size_data: self.size_data.clone(),
        }
    }
}
