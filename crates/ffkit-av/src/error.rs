//! Error types for ffkit-av.

use std::fmt;
use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or running an engine invocation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An input mutator was called before any input was added.
    #[error("no input specified")]
    NoInput,

    /// The session has no output with a target.
    #[error("no output specified")]
    NoOutput,

    /// An input source was rejected.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An output target was rejected.
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// A second live input stream was added.
    #[error("only one input stream is supported")]
    MultipleInputStreams,

    /// A second live output stream was added.
    #[error("only one output stream is supported")]
    MultipleOutputStreams,

    /// A size specification could not be parsed.
    #[error("invalid size specified: {0}")]
    InvalidSize(String),

    /// An aspect ratio could not be parsed.
    #[error("invalid aspect ratio: {0}")]
    InvalidAspect(String),

    /// A timemark could not be converted to seconds.
    #[error("invalid timemark: {0}")]
    InvalidTimemark(String),

    /// Requested formats or codecs are not supported by the engine build.
    #[error("{}", describe_unavailable(.category, .names))]
    Unavailable {
        category: Category,
        names: Vec<String>,
    },

    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// Failed to parse tool output.
    #[error("failed to parse {tool} output: {message}")]
    ParseError { tool: String, message: String },

    /// A spawned process failed. Carries whatever output was captured.
    #[error("{failure}")]
    Process {
        failure: ProcessFailure,
        stdout: String,
        stderr: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a spawned process run ended in failure.
#[derive(Debug, thiserror::Error)]
pub enum ProcessFailure {
    /// The executable could not be started.
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited with a non-zero code.
    #[error("{tool} exited with code {code}: {message}")]
    ExitCode {
        tool: String,
        code: i32,
        /// Likely error message extracted from stderr.
        message: String,
    },

    /// The process was killed by a signal.
    #[error("{tool} was killed with signal {signal}")]
    Signal { tool: String, signal: i32 },

    /// Reading the input stream failed.
    #[error("input stream error: {0}")]
    InputStream(#[source] std::io::Error),

    /// Writing to the output stream failed.
    #[error("output stream error: {0}")]
    OutputStream(#[source] std::io::Error),

    /// The configured timeout elapsed.
    #[error("process ran into a timeout ({}s)", .0.as_secs_f64())]
    Timeout(Duration),

    /// The metadata post-processor failed on an output file.
    #[error("error running {tool} on {target}: {message}")]
    PostProcess {
        tool: String,
        target: String,
        message: String,
    },
}

/// Capability category reported by [`Error::Unavailable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    InputFormat,
    OutputFormat,
    AudioCodec,
    VideoCodec,
}

impl Category {
    fn noun(self, plural: bool) -> &'static str {
        match (self, plural) {
            (Category::InputFormat, false) => "Input format",
            (Category::InputFormat, true) => "Input formats",
            (Category::OutputFormat, false) => "Output format",
            (Category::OutputFormat, true) => "Output formats",
            (Category::AudioCodec, false) => "Audio codec",
            (Category::AudioCodec, true) => "Audio codecs",
            (Category::VideoCodec, false) => "Video codec",
            (Category::VideoCodec, true) => "Video codecs",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.noun(false))
    }
}

fn describe_unavailable(category: &Category, names: &[String]) -> String {
    if names.len() == 1 {
        format!("{} {} is not available", category.noun(false), names[0])
    } else {
        format!(
            "{} {} are not available",
            category.noun(true),
            names.join(", ")
        )
    }
}

impl Error {
    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a parse error.
    pub fn parse_error(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Wrap a process failure together with the output captured so far.
    pub fn process(failure: ProcessFailure, stdout: String, stderr: String) -> Self {
        Self::Process {
            failure,
            stdout,
            stderr,
        }
    }

    /// The process failure, if this is a runtime error.
    pub fn failure(&self) -> Option<&ProcessFailure> {
        match self {
            Self::Process { failure, .. } => Some(failure),
            _ => None,
        }
    }

    /// Captured stderr text, if this is a runtime error.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Process { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}
