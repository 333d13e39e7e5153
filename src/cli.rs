use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ffkit")]
#[command(author, version, about = "Build and run ffmpeg commands")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CapabilityKind {
    Formats,
    Codecs,
    Encoders,
    Filters,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that required external tools are available
    CheckTools,

    /// List what the installed ffmpeg supports
    Capabilities {
        #[arg(value_enum)]
        kind: CapabilityKind,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe a media file with ffprobe and display information
    Probe {
        /// File or URL to probe
        #[arg(required = true)]
        file: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Transcode one or more inputs into a single output
    Transcode {
        /// Input file or URL (repeatable)
        #[arg(short, long = "input", required = true)]
        inputs: Vec<String>,

        /// Output file or URL
        output: String,

        /// Output container format
        #[arg(short, long)]
        format: Option<String>,

        /// Video codec
        #[arg(long)]
        vcodec: Option<String>,

        /// Audio codec
        #[arg(long)]
        acodec: Option<String>,

        /// Output size: WxH, Wx?, ?xH or N%
        #[arg(short, long)]
        size: Option<String>,

        /// Output aspect ratio, as N:M or a decimal
        #[arg(long)]
        aspect: Option<String>,

        /// Pad to the requested size instead of stretching, with an optional color
        #[arg(long, num_args = 0..=1, default_missing_value = "black")]
        autopad: Option<String>,

        /// Seek the input to this position
        #[arg(long)]
        seek: Option<String>,

        /// Stop writing after this duration
        #[arg(short, long)]
        duration: Option<String>,

        /// Video filter (repeatable)
        #[arg(long = "vf")]
        video_filters: Vec<String>,

        /// Audio filter (repeatable)
        #[arg(long = "af")]
        audio_filters: Vec<String>,

        /// Drop audio
        #[arg(long)]
        no_audio: bool,

        /// Drop video
        #[arg(long)]
        no_video: bool,

        /// Print the command line without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
