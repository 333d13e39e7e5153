//! # ffkit-av
//!
//! Command construction and process orchestration for ffmpeg.
//!
//! This crate provides:
//! - A fluent [`Session`] model that assembles an ffmpeg argument vector
//!   from inputs, outputs, filters and options
//! - Process orchestration with streamed stdin/stdout, bounded stderr
//!   capture, timeouts and cancellation
//! - Progress, codec data and error extraction from ffmpeg's stderr
//! - Capability listings (formats, codecs, encoders, filters) with
//!   validation of a session against them
//! - Media introspection through ffprobe
//!
//! ## Example
//!
//! ```no_run
//! use ffkit_av::{Event, Session};
//!
//! # async fn demo() -> ffkit_av::Result<()> {
//! let mut session = Session::new();
//! session
//!     .input("/path/to/input.avi")
//!     .output("/path/to/output.mp4")
//!     .video_codec("libx264")
//!     .audio_codec("aac")
//!     .size("50%");
//!
//! let mut events = session.subscribe();
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         if let Event::Progress(progress) = event {
//!             println!("{:?}% done", progress.percent);
//!         }
//!     }
//! });
//!
//! session.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod capabilities;
pub mod engine;
mod error;
pub mod filter;
pub mod probe;
pub mod process;
pub mod session;
pub mod telemetry;
pub mod tools;

// Re-exports
pub use args::ArgList;
pub use engine::Engine;
pub use error::{Category, Error, ProcessFailure, Result};
pub use filter::{Filter, FilterSpec, FilterValue};
pub use probe::{ffprobe, ProbeData, ProbeSource};
pub use process::{Captured, Invocation, RunOptions};
pub use session::{Event, InputStream, KillHandle, OutputStream, PipeOptions, Session};
pub use telemetry::{InputCodecData, Progress, Timemark};
pub use tools::{Tool, ToolInfo, ToolPaths};
