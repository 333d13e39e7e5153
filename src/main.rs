mod cli;

use ffkit::config;
use ffkit::transcode::{self, TranscodeJob};
use ffkit_av::{probe, Engine, Tool};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{CapabilityKind, Cli, Commands};
use std::path::Path;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "ffkit=trace,ffkit_av=trace".to_string()
        } else {
            "ffkit=info,ffkit_av=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Capabilities { kind, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(list_capabilities(kind, json, cli.config.as_deref()))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, json, cli.config.as_deref()))
        }
        Commands::Transcode {
            inputs,
            output,
            format,
            vcodec,
            acodec,
            size,
            aspect,
            autopad,
            seek,
            duration,
            video_filters,
            audio_filters,
            no_audio,
            no_video,
            dry_run,
        } => {
            let job = TranscodeJob {
                inputs,
                output,
                format,
                video_codec: vcodec,
                audio_codec: acodec,
                size,
                aspect,
                autopad: autopad.map(Some),
                seek,
                duration,
                video_filters,
                audio_filters,
                no_audio,
                no_video,
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_transcode(job, dry_run, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("ffkit {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_engine(config_path: Option<&Path>) -> Result<(config::Config, Arc<Engine>)> {
    let config = config::load_config_or_default(config_path)?;
    let engine = Arc::new(config.engine());
    Ok((config, engine))
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let (_, engine) = load_engine(config_path)?;
    println!("Checking external tools...\n");

    let tools = engine.tools().check_all();
    let mut required_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            if tool.name != Tool::Flvtool.name() {
                required_ok = false;
            }
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if required_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to enable all features.");
    }

    Ok(())
}

async fn list_capabilities(kind: CapabilityKind, json: bool, config_path: Option<&Path>) -> Result<()> {
    let (_, engine) = load_engine(config_path)?;

    match kind {
        CapabilityKind::Formats => {
            let formats = engine.formats().await.context("Failed to list formats")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&*formats)?);
            } else {
                for (name, format) in formats.iter() {
                    let flags = format!(
                        "{}{}",
                        if format.can_demux { "D" } else { " " },
                        if format.can_mux { "E" } else { " " }
                    );
                    println!("{} {:<16} {}", flags, name, format.description);
                }
            }
        }
        CapabilityKind::Codecs => {
            let codecs = engine.codecs().await.context("Failed to list codecs")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&*codecs)?);
            } else {
                for (name, codec) in codecs.iter() {
                    println!("{:<24} {:?} {}", name, codec.kind, codec.description);
                }
            }
        }
        CapabilityKind::Encoders => {
            let encoders = engine.encoders().await.context("Failed to list encoders")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&*encoders)?);
            } else {
                for (name, encoder) in encoders.iter() {
                    let experimental = if encoder.experimental { " [experimental]" } else { "" };
                    println!(
                        "{:<24} {:?} {}{}",
                        name, encoder.kind, encoder.description, experimental
                    );
                }
            }
        }
        CapabilityKind::Filters => {
            let filters = engine.filters().await.context("Failed to list filters")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&*filters)?);
            } else {
                for (name, filter) in filters.iter() {
                    println!(
                        "{:<24} {:?}->{:?} {}",
                        name, filter.input, filter.output, filter.description
                    );
                }
            }
        }
    }

    Ok(())
}

async fn probe_file(file: &str, json: bool, config_path: Option<&Path>) -> Result<()> {
    let (config, engine) = load_engine(config_path)?;

    let data = probe::ffprobe(&engine, file, &[], &config.run.to_run_options())
        .await
        .with_context(|| format!("Failed to probe {}", file))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("File: {}", file);
    if let Some(format) = data.format.get_str("format_name") {
        println!("Container: {}", format);
    }
    if let Some(duration) = data.duration() {
        let secs = duration as u64;
        let mins = secs / 60;
        let hours = mins / 60;
        println!("Duration: {:02}:{:02}:{:02}", hours, mins % 60, secs % 60);
    }

    println!("\nStreams: {}", data.streams.len());
    for (i, stream) in data.streams.iter().enumerate() {
        print!(
            "  [{}] {} {}",
            i,
            stream.codec_type().unwrap_or("unknown"),
            stream.get_str("codec_name").unwrap_or("?")
        );
        if let (Some(width), Some(height)) = (stream.get_f64("width"), stream.get_f64("height")) {
            print!(" {}x{}", width, height);
        }
        if let Some(fps) = stream.frame_rate() {
            print!(" {:.3} fps", fps);
        }
        if let Some(channels) = stream.get_f64("channels") {
            print!(" {}ch", channels);
        }
        if let Some(lang) = stream.tags.get("language") {
            print!(" ({})", lang);
        }
        println!();
    }

    Ok(())
}

async fn run_transcode(job: TranscodeJob, dry_run: bool, config_path: Option<&Path>) -> Result<()> {
    let (config, engine) = load_engine(config_path)?;
    let session = job.session(engine.clone(), config.run.to_run_options())?;

    if dry_run {
        let args = session.build_args().context("Invalid transcode options")?;
        let program = engine
            .tools()
            .resolve(Tool::Ffmpeg)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| Tool::Ffmpeg.name().to_string());
        println!("{} {}", program, args.join(" "));
        return Ok(());
    }

    tracing::info!("Transcoding {} into {}", job.inputs.join(", "), job.output);
    transcode::run_with_progress(session).await?;
    println!("Wrote {}", job.output);
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_config(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            println!("Default config:");
            print_config(&config::Config::default());
        }
    }

    Ok(())
}

fn print_config(config: &config::Config) {
    let show = |path: &Option<std::path::PathBuf>| {
        path.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(search PATH)".to_string())
    };
    println!("  ffmpeg: {}", show(&config.tools.ffmpeg));
    println!("  ffprobe: {}", show(&config.tools.ffprobe));
    println!("  flvtool: {}", show(&config.tools.flvtool));
    println!("  Niceness: {}", config.run.niceness);
    match config.run.timeout_secs {
        Some(secs) => println!("  Timeout: {}s", secs),
        None => println!("  Timeout: none"),
    }
    println!("  Validate capabilities: {}", config.run.validate_capabilities);
}
