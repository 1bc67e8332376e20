//! Command line parsing, logging setup and run configuration

use crate::error::{AppError, AppResult};
use crate::settings::SmoothingSpeed;
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use log::LevelFilter;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;

/// Command line arguments for the loudwatch application
#[derive(Parser, Debug)]
#[command(name = "loudwatch")]
#[command(author, version, about = "Noise level monitoring with sustained-noise alerts")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (defaults to the OS config directory)
    #[arg(long, global = true)]
    pub settings_file: Option<PathBuf>,

    /// Write logs to this file instead of the default
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Monitor loudness and alert on sustained noise
    Monitor(MonitorArgs),
    /// List available audio input devices
    List(ListArgs),
    /// Show or change persisted settings
    Settings(SettingsArgs),
}

#[derive(Parser, Debug)]
pub struct MonitorArgs {
    /// Audio input device name (overrides the saved device)
    #[arg(long)]
    pub device: Option<String>,

    /// Write the event log as CSV to this path on exit
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Pick a device interactively and save it
    #[arg(long)]
    pub select: bool,
}

#[derive(Parser, Debug, Default)]
pub struct SettingsArgs {
    /// Alert threshold in dB (30 to 120)
    #[arg(long)]
    pub threshold: Option<i32>,

    /// Seconds the level must stay above threshold (0.1 to 10)
    #[arg(long)]
    pub duration: Option<f32>,

    /// Calibration offset in dB (-30 to 30)
    #[arg(long, allow_hyphen_values = true)]
    pub calibration: Option<i32>,

    /// Smoothing speed
    #[arg(long, value_enum)]
    pub smoothing: Option<SmoothingSpeed>,

    /// Restore default values (the saved device is kept)
    #[arg(long)]
    pub reset: bool,
}

impl SettingsArgs {
    pub fn has_changes(&self) -> bool {
        self.reset
            || self.threshold.is_some()
            || self.duration.is_some()
            || self.calibration.is_some()
            || self.smoothing.is_some()
    }
}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    /// Where logs go; the monitor owns the terminal so it always logs to a file
    pub fn log_path(&self) -> Option<PathBuf> {
        match (&self.log_file, &self.command) {
            (Some(path), _) => Some(path.clone()),
            (None, Commands::Monitor(_)) => {
                project_dirs().map(|dirs| dirs.cache_dir().join("loudwatch.log"))
            }
            (None, _) => None,
        }
    }

    /// Settings file in use
    pub fn settings_path(&self) -> AppResult<PathBuf> {
        match &self.settings_file {
            Some(path) => Ok(path.clone()),
            None => crate::settings::default_settings_path(),
        }
    }
}

/// OS-specific directories for this application
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "Loudwatch", "Loudwatch")
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) -> AppResult<()> {
    let mut builder = env_logger::Builder::new();

    // Keep dependencies quiet
    builder.filter_level(LevelFilter::Warn);
    builder.filter_module("loudwatch", args.log_level());

    if let Some(path) = args.log_path() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.format_timestamp_millis().init();
    Ok(())
}

/// Monitoring configuration derived from command line arguments
#[derive(Debug)]
pub struct Config {
    pub settings_path: PathBuf,
    pub device_override: Option<String>,
    pub export_path: Option<PathBuf>,
}

impl Config {
    /// Create configuration from monitor arguments
    pub fn from_monitor_args(args: &Args, monitor_args: &MonitorArgs) -> AppResult<Self> {
        if let Some(device) = &monitor_args.device && device.trim().is_empty() {
            return Err(AppError::AudioDevice("Device name must not be empty".to_string()));
        }

        if let Some(path) = &monitor_args.export && path.is_dir() {
            return Err(AppError::Settings(format!(
                "Export path is a directory: {}",
                path.display()
            )));
        }

        Ok(Config {
            settings_path: args.settings_path()?,
            device_override: monitor_args.device.clone(),
            export_path: monitor_args.export.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(parse(&["loudwatch", "list"]).log_level(), LevelFilter::Warn);
        assert_eq!(parse(&["loudwatch", "-vv", "list"]).log_level(), LevelFilter::Debug);
        assert_eq!(parse(&["loudwatch", "list", "-q"]).log_level(), LevelFilter::Error);
    }

    #[test]
    fn test_monitor_logs_to_file() {
        let args = parse(&["loudwatch", "--log-file", "/tmp/lw.log", "monitor"]);
        assert_eq!(args.log_path(), Some(PathBuf::from("/tmp/lw.log")));
        assert!(parse(&["loudwatch", "list"]).log_path().is_none());
    }

    #[test]
    fn test_settings_args() {
        let args = parse(&[
            "loudwatch",
            "settings",
            "--threshold",
            "90",
            "--calibration",
            "-5",
            "--smoothing",
            "fast",
        ]);
        let Commands::Settings(s) = args.command else {
            panic!("expected settings command");
        };
        assert_eq!(s.threshold, Some(90));
        assert_eq!(s.calibration, Some(-5));
        assert_eq!(s.smoothing, Some(SmoothingSpeed::Fast));
        assert!(s.has_changes());
        assert!(!SettingsArgs::default().has_changes());
    }

    #[test]
    fn test_config_from_monitor_args() {
        let args = parse(&[
            "loudwatch",
            "--settings-file",
            "/tmp/lw-settings.json",
            "monitor",
            "--device",
            "USB Mic",
            "--export",
            "/tmp/events.csv",
        ]);
        let Commands::Monitor(m) = &args.command else {
            panic!("expected monitor command");
        };
        let config = Config::from_monitor_args(&args, m).unwrap();
        assert_eq!(config.settings_path, PathBuf::from("/tmp/lw-settings.json"));
        assert_eq!(config.device_override.as_deref(), Some("USB Mic"));
        assert_eq!(config.export_path, Some(PathBuf::from("/tmp/events.csv")));
    }

    #[test]
    fn test_config_rejects_blank_device() {
        let args = parse(&["loudwatch", "monitor", "--device", " "]);
        let Commands::Monitor(m) = &args.command else {
            panic!("expected monitor command");
        };
        assert!(Config::from_monitor_args(&args, m).is_err());
    }
}
