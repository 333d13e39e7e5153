mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./ffkit.toml",
        "~/.config/ffkit/config.toml",
        "/etc/ffkit/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.run.timeout_secs == Some(0) {
        anyhow::bail!("Run timeout cannot be 0");
    }

    if !(-20..=19).contains(&config.run.niceness) {
        anyhow::bail!(
            "Niceness {} is outside the range -20 to 19",
            config.run.niceness
        );
    }

    if let Some(cwd) = &config.run.cwd {
        if !cwd.is_dir() {
            tracing::warn!("Working directory does not exist: {:?}", cwd);
        }
    }

    for (name, path) in [
        ("ffmpeg", &config.tools.ffmpeg),
        ("ffprobe", &config.tools.ffprobe),
        ("flvtool", &config.tools.flvtool),
    ] {
        if let Some(path) = path {
            if !path.exists() {
                tracing::warn!("Configured {} path does not exist: {:?}", name, path);
            }
        }
    }

    Ok(())
}
