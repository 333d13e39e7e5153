use ffkit_av::{Engine, RunOptions, ToolPaths};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Explicit paths for ffmpeg, ffprobe and the FLV metadata tool.
    #[serde(default)]
    pub tools: ToolPaths,

    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunConfig {
    /// Scheduling priority offset for spawned engines (-20 to 19)
    #[serde(default)]
    pub niceness: i32,

    /// Kill the engine after this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Lines of stdout/stderr kept for error reports
    #[serde(default = "default_stdout_lines")]
    pub stdout_lines: usize,

    /// Working directory for spawned engines
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Check requested formats and codecs against the engine before running
    #[serde(default = "default_true")]
    pub validate_capabilities: bool,
}

fn default_stdout_lines() -> usize {
    ffkit_av::process::DEFAULT_STDOUT_LINES
}

fn default_true() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            niceness: 0,
            timeout_secs: None,
            stdout_lines: default_stdout_lines(),
            cwd: None,
            validate_capabilities: true,
        }
    }
}

impl RunConfig {
    pub fn to_run_options(&self) -> RunOptions {
        RunOptions {
            niceness: self.niceness,
            timeout: self.timeout_secs.map(Duration::from_secs),
            stdout_lines: self.stdout_lines,
            cwd: self.cwd.clone(),
            envs: Vec::new(),
            validate_capabilities: self.validate_capabilities,
        }
    }
}

impl Config {
    /// Build an engine that resolves tools with this config's overrides.
    pub fn engine(&self) -> Engine {
        Engine::new(self.tools.clone())
    }
}
