use super::app_config::LogLevel;
use crate::domain::entities::{DiskCacheStrategy, TargetSize, Transform};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "pictor",
    version,
    about = "Load, transform and cache remote images",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Disk cache directory.
    #[arg(long, value_name = "PATH", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Network timeout in seconds.
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load an image through the caches and write the displayed result as PNG.
    Load {
        /// Image URL.
        url: String,

        /// Output file.
        #[arg(short, long, value_name = "PATH")]
        out: PathBuf,

        /// Transform applied in order (center-crop, circle-crop, grayscale,
        /// blur:<sigma>, rounded:<radius>[:<corners>]).
        #[arg(short, long = "transform", value_name = "TRANSFORM")]
        transforms: Vec<Transform>,

        /// Target size as WIDTHxHEIGHT.
        #[arg(short, long, value_name = "WxH")]
        size: Option<TargetSize>,

        /// Disk cache strategy.
        #[arg(long, value_enum, default_value_t = DiskCacheStrategy::Automatic)]
        strategy: DiskCacheStrategy,

        /// Bypass the memory cache.
        #[arg(long)]
        skip_memory_cache: bool,
    },

    /// Download the full image into the pictures directory.
    Download {
        /// Image URL.
        url: String,
    },

    /// Remove every cached image from memory and disk.
    ClearCache,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_load_command() {
        let args = CliArgs::parse_from([
            "pictor",
            "load",
            "https://example.com/a.png",
            "--out",
            "a.png",
            "-t",
            "circle-crop",
            "-t",
            "blur:2.5",
            "--size",
            "64x64",
            "--strategy",
            "resource",
        ]);

        let Command::Load {
            url,
            transforms,
            size,
            strategy,
            skip_memory_cache,
            ..
        } = args.command
        else {
            panic!("expected load command");
        };
        assert_eq!(url, "https://example.com/a.png");
        assert_eq!(transforms, vec![Transform::CircleCrop, Transform::Blur { sigma: 2.5 }]);
        assert_eq!(size, Some(TargetSize::new(64, 64).unwrap()));
        assert_eq!(strategy, DiskCacheStrategy::Resource);
        assert!(!skip_memory_cache);
    }

    #[test]
    fn test_invalid_transform_is_rejected() {
        let result = CliArgs::try_parse_from([
            "pictor",
            "load",
            "https://example.com/a.png",
            "--out",
            "a.png",
            "-t",
            "sharpen",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::parse_from(["pictor", "download", "https://x.test/b.jpg", "--log-level", "debug"]);
        assert_eq!(args.log_level, Some(LogLevel::Debug));
        assert!(matches!(args.command, Command::Download { .. }));
    }
}
