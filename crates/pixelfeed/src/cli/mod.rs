//! Command handlers for the `pixelfeed` binary.

pub mod batch;
pub mod config;
pub mod scan;

use clap::{Args, ValueEnum};
use pixelfeed_core::Config;
use std::path::{Path, PathBuf};

/// Supported output formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON array
    Json,
    /// One JSON object per line (newline-delimited)
    Jsonl,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Jsonl => write!(f, "jsonl"),
        }
    }
}

/// Loader overrides shared by `scan` and `batch`.
#[derive(Args, Debug, Clone, Default)]
pub struct LoaderArgs {
    /// Target height in pixels (0 keeps the source height)
    #[arg(long)]
    pub height: Option<u32>,

    /// Target width in pixels (0 keeps the source width)
    #[arg(long)]
    pub width: Option<u32>,

    /// Target channel count (0 keeps the source channels)
    #[arg(long)]
    pub channels: Option<u8>,

    /// Crop the longer side before scaling
    #[arg(long)]
    pub center_crop: bool,

    /// Shuffle discovered files with this seed
    #[arg(long)]
    pub shuffle_seed: Option<u64>,

    /// Do not derive labels
    #[arg(long)]
    pub no_labels: bool,
}

impl LoaderArgs {
    /// Apply the overrides on top of a loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(height) = self.height {
            config.loader.height = height;
        }
        if let Some(width) = self.width {
            config.loader.width = width;
        }
        if let Some(channels) = self.channels {
            config.loader.channels = channels;
        }
        if self.center_crop {
            config.loader.center_crop = true;
        }
        if let Some(seed) = self.shuffle_seed {
            config.processing.shuffle_seed = Some(seed);
        }
        if self.no_labels {
            config.labels.enabled = false;
        }
    }
}

/// Load the config from `path` when given, otherwise from the default
/// location.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

/// Fail early with a readable message when the input does not exist.
pub fn ensure_exists(path: &PathBuf) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("Input path does not exist: {}", path.display());
    }
    Ok(())
}

/// Create a progress bar for sample loading.
pub fn create_progress_bar(total: u64) -> anyhow::Result<indicatif::ProgressBar> {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
            )?
            .progress_chars("##-"),
    );
    pb.set_message("starting...");
    Ok(pb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_args_override() {
        let args = LoaderArgs {
            height: Some(64),
            channels: Some(3),
            center_crop: true,
            no_labels: true,
            ..LoaderArgs::default()
        };
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.loader.height, 64);
        assert_eq!(config.loader.width, 28);
        assert_eq!(config.loader.channels, 3);
        assert!(config.loader.center_crop);
        assert!(!config.labels.enabled);
    }

    #[test]
    fn test_load_config_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixelfeed.toml");
        std::fs::write(&path, "[loader]\nwidth = 7\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.loader.width, 7);
    }

    #[test]
    fn test_ensure_exists() {
        assert!(ensure_exists(&PathBuf::from("/definitely/not/here")).is_err());
    }
}
