//! External tool resolution.
//!
//! Each [`Tool`] resolves to an executable path by looking, in order, at its
//! environment override, the configured override and `PATH`. Results are
//! memoized in a [`ToolCache`] until it is reset.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// An external executable this crate drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
    /// FLV metadata updater: `flvmeta`, or `flvtool2` as a fallback.
    Flvtool,
}

impl Tool {
    pub const ALL: [Tool; 3] = [Tool::Ffmpeg, Tool::Ffprobe, Tool::Flvtool];

    pub fn name(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
            Tool::Flvtool => "flvtool",
        }
    }

    /// Environment variables that override the lookup, in priority order.
    pub fn env_vars(self) -> &'static [&'static str] {
        match self {
            Tool::Ffmpeg => &["FFMPEG_PATH"],
            Tool::Ffprobe => &["FFPROBE_PATH"],
            Tool::Flvtool => &["FLVMETA_PATH", "FLVTOOL2_PATH"],
        }
    }

    /// Executable names searched on `PATH`, in priority order.
    fn executables(self) -> &'static [&'static str] {
        match self {
            Tool::Ffmpeg => &["ffmpeg"],
            Tool::Ffprobe => &["ffprobe"],
            Tool::Flvtool => &["flvmeta", "flvtool2"],
        }
    }

    fn version_arg(self) -> &'static str {
        match self {
            Tool::Ffmpeg | Tool::Ffprobe => "-version",
            Tool::Flvtool => "--version",
        }
    }
}

/// Explicit path overrides, usually from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub flvtool: Option<PathBuf>,
}

impl ToolPaths {
    fn get(&self, tool: Tool) -> Option<&Path> {
        match tool {
            Tool::Ffmpeg => self.ffmpeg.as_deref(),
            Tool::Ffprobe => self.ffprobe.as_deref(),
            Tool::Flvtool => self.flvtool.as_deref(),
        }
    }
}

/// Information about an external tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// First line of the tool's version output.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
}

/// Memoized tool lookups.
#[derive(Debug, Default)]
pub struct ToolCache {
    overrides: ToolPaths,
    resolved: Mutex<HashMap<Tool, Option<PathBuf>>>,
}

fn env_override(tool: Tool) -> Option<PathBuf> {
    tool.env_vars().iter().find_map(|var| {
        let value = std::env::var_os(var).filter(|v| !v.is_empty())?;
        let path = PathBuf::from(value);
        if path.exists() {
            Some(path)
        } else {
            debug!("{var} points to missing file {}", path.display());
            None
        }
    })
}

impl ToolCache {
    pub fn new(overrides: ToolPaths) -> Self {
        Self {
            overrides,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn overrides(&self) -> &ToolPaths {
        &self.overrides
    }

    /// Resolve a tool to an executable path, or `None` if it cannot be
    /// found. Both outcomes are cached.
    pub fn resolve(&self, tool: Tool) -> Option<PathBuf> {
        if let Some(cached) = self.resolved.lock().get(&tool) {
            return cached.clone();
        }

        let found = self.lookup(tool);
        debug!(
            "resolved {} to {}",
            tool.name(),
            found
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "nothing".to_string())
        );
        self.resolved.lock().insert(tool, found.clone());
        found
    }

    /// Resolve a tool, failing with [`Error::ToolNotFound`] if it is absent.
    pub fn require(&self, tool: Tool) -> Result<PathBuf> {
        self.resolve(tool)
            .ok_or_else(|| Error::tool_not_found(tool.name()))
    }

    /// Forget every cached lookup.
    pub fn reset(&self) {
        self.resolved.lock().clear();
    }

    fn lookup(&self, tool: Tool) -> Option<PathBuf> {
        if let Some(path) = env_override(tool) {
            return Some(path);
        }

        if let Some(path) = self.overrides.get(tool) {
            if path.exists() {
                return Some(path.to_path_buf());
            }
        }

        if let Some(path) = tool
            .executables()
            .iter()
            .find_map(|name| which::which(name).ok())
        {
            return Some(path);
        }

        // ffprobe usually ships next to ffmpeg.
        if tool == Tool::Ffprobe {
            let ffmpeg = self.resolve(Tool::Ffmpeg)?;
            let sibling = ffmpeg.with_file_name(format!("ffprobe{}", std::env::consts::EXE_SUFFIX));
            if sibling.exists() {
                return Some(sibling);
            }
        }

        None
    }

    /// Check every tool and report availability and version.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        Tool::ALL.iter().map(|tool| self.check(*tool)).collect()
    }

    /// Check a single tool by running its version command.
    pub fn check(&self, tool: Tool) -> ToolInfo {
        let path = self.resolve(tool);
        let version = path.as_ref().and_then(|path| {
            let output = Command::new(path).arg(tool.version_arg()).output().ok()?;
            if !output.status.success() {
                return None;
            }
            String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string())
        });

        ToolInfo {
            name: tool.name().to_string(),
            available: path.is_some(),
            version,
            path,
        }
    }
}
