mod app;
mod audio;
mod config;
mod constants;
mod detector;
mod error;
mod events;
mod history;
mod level;
mod notify;
mod settings;
mod smoothing;
mod state;
mod ui;

use app::ExitCode;
use clap::Parser;
use config::{Args, Commands, ListArgs, SettingsArgs};
use dialoguer::{Select, theme::ColorfulTheme};
use error::AppResult;
use log::{error, info};
use settings::{Settings, SettingsStore};

fn list_devices(args: &Args, list_args: &ListArgs) -> AppResult<()> {
    let devices = audio::list_input_devices()?;

    if devices.is_empty() {
        println!("No audio input devices found.");
        return Ok(());
    }

    let mut store = SettingsStore::load(args.settings_path()?);

    if !list_args.select {
        let selected = audio::select_device(&devices, store.settings().device());
        for device in &devices {
            let marker = if Some(device) == selected { "*" } else { " " };
            println!("{} {}", marker, device.label);
        }
        return Ok(());
    }

    // Interactive selection
    let labels: Vec<&str> = devices.iter().map(|d| d.label.as_str()).collect();
    let default = store
        .settings()
        .device()
        .and_then(|id| devices.iter().position(|d| d.id == id))
        .unwrap_or(0);
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select an audio input device")
        .items(&labels)
        .default(default)
        .interact()?;

    let device = &devices[selection];
    store.update(|s| s.device_id = device.id.clone());
    info!("Saved input device {}", device.id);
    println!("{}", device.label);

    Ok(())
}

fn print_settings(settings: &Settings) {
    println!("Threshold:    {} dB", settings.threshold_db);
    println!("Duration:     {} s", settings.duration_threshold_sec);
    println!("Calibration:  {:+} dB", settings.calibration_offset_db);
    println!("Smoothing:    {}", settings.smoothing_speed.name());
    println!(
        "Device:       {}",
        settings.device().unwrap_or("(first available)")
    );
}

fn edit_settings(args: &Args, settings_args: &SettingsArgs) -> AppResult<()> {
    let mut store = SettingsStore::load(args.settings_path()?);

    if settings_args.reset {
        store.reset();
    }
    if settings_args.has_changes() {
        store.update(|s| {
            if let Some(threshold) = settings_args.threshold {
                s.threshold_db = threshold;
            }
            if let Some(duration) = settings_args.duration {
                s.duration_threshold_sec = duration;
            }
            if let Some(calibration) = settings_args.calibration {
                s.calibration_offset_db = calibration;
            }
            if let Some(smoothing) = settings_args.smoothing {
                s.smoothing_speed = smoothing;
            }
        });
        // A fresh file still gets written even when values equal the defaults
        store.persist()?;
    }

    println!("Settings file: {}", store.path().display());
    print_settings(store.settings());
    Ok(())
}

async fn run(args: Args) -> AppResult<ExitCode> {
    match &args.command {
        Commands::Monitor(monitor_args) => {
            let config = config::Config::from_monitor_args(&args, monitor_args)?;
            let app = app::App::new_with_config(config)?;
            let run_result = app.run().await;
            run_result.result?;
            Ok(run_result.exit_code)
        }
        Commands::List(list_args) => {
            list_devices(&args, list_args)?;
            Ok(ExitCode::Success)
        }
        Commands::Settings(settings_args) => {
            edit_settings(&args, settings_args)?;
            Ok(ExitCode::Success)
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = config::init_logging(&args) {
        eprintln!("Logging setup error: {}", e);
    }

    let exit_code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::Error
        }
    };
    std::process::exit(exit_code as i32);
}
