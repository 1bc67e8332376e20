//! User-tunable settings and their persistence
//!
//! Settings are stored as a flat JSON record in a file named after a fixed
//! storage key inside the OS config directory.

use crate::constants::settings::*;
use crate::constants::smoothing;
use crate::error::{AppError, AppResult};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Named smoothing preset controlling EMA responsiveness and UI refresh cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingSpeed {
    Slow,
    #[default]
    Medium,
    Fast,
}

impl SmoothingSpeed {
    /// EMA coefficient
    pub fn alpha(self) -> f32 {
        self.preset().0
    }

    /// Minimum time between display updates
    pub fn refresh_interval_ms(self) -> u64 {
        self.preset().1
    }

    fn preset(self) -> (f32, u64) {
        match self {
            SmoothingSpeed::Slow => smoothing::SLOW,
            SmoothingSpeed::Medium => smoothing::MEDIUM,
            SmoothingSpeed::Fast => smoothing::FAST,
        }
    }

    /// Next preset, wrapping around
    pub fn next(self) -> Self {
        match self {
            SmoothingSpeed::Slow => SmoothingSpeed::Medium,
            SmoothingSpeed::Medium => SmoothingSpeed::Fast,
            SmoothingSpeed::Fast => SmoothingSpeed::Slow,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SmoothingSpeed::Slow => "slow",
            SmoothingSpeed::Medium => "medium",
            SmoothingSpeed::Fast => "fast",
        }
    }
}

/// Persisted user settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub threshold_db: i32,
    pub duration_threshold_sec: f32,
    pub calibration_offset_db: i32,
    pub smoothing_speed: SmoothingSpeed,
    pub device_id: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threshold_db: DEFAULT_THRESHOLD_DB,
            duration_threshold_sec: DEFAULT_DURATION_SEC,
            calibration_offset_db: DEFAULT_CALIBRATION_OFFSET_DB,
            smoothing_speed: SmoothingSpeed::default(),
            device_id: String::new(),
        }
    }
}

impl Settings {
    /// Force every field into its allowed range
    pub fn clamp(&mut self) {
        self.threshold_db = self.threshold_db.clamp(MIN_THRESHOLD_DB, MAX_THRESHOLD_DB);
        self.duration_threshold_sec = if self.duration_threshold_sec.is_finite() {
            self.duration_threshold_sec
                .clamp(MIN_DURATION_SEC, MAX_DURATION_SEC)
        } else {
            DEFAULT_DURATION_SEC
        };
        self.calibration_offset_db = self
            .calibration_offset_db
            .clamp(MIN_CALIBRATION_OFFSET_DB, MAX_CALIBRATION_OFFSET_DB);
    }

    /// Persisted device, if one has been chosen
    pub fn device(&self) -> Option<&str> {
        if self.device_id.is_empty() {
            None
        } else {
            Some(&self.device_id)
        }
    }
}

/// Default location of the settings file
pub fn default_settings_path() -> AppResult<PathBuf> {
    let dirs = crate::config::project_dirs()
        .ok_or_else(|| AppError::Settings("Failed to determine config directory".to_string()))?;
    Ok(dirs.config_dir().join(format!("{}.json", STORAGE_KEY)))
}

/// Loads settings once and persists the full record on every change
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// Load settings from `path`, falling back to defaults when the file is
    /// missing or unreadable
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match read_settings(&path) {
            Ok(Some(settings)) => {
                info!("Loaded settings from {}", path.display());
                settings
            }
            Ok(None) => {
                debug!("No settings at {}, using defaults", path.display());
                Settings::default()
            }
            Err(e) => {
                warn!("Ignoring unreadable settings at {}: {}", path.display(), e);
                Settings::default()
            }
        };
        Self { path, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply a change, clamp it, and persist immediately.
    ///
    /// Persistence failures are logged; the in-memory change is kept.
    pub fn update(&mut self, change: impl FnOnce(&mut Settings)) -> &Settings {
        let before = self.settings.clone();
        change(&mut self.settings);
        self.settings.clamp();
        if self.settings != before && let Err(e) = self.persist() {
            error!("Failed to save settings to {}: {}", self.path.display(), e);
        }
        &self.settings
    }

    /// Restore defaults, keeping the selected device
    pub fn reset(&mut self) -> &Settings {
        self.update(|s| {
            let device_id = std::mem::take(&mut s.device_id);
            *s = Settings {
                device_id,
                ..Settings::default()
            };
        })
    }

    /// Write the full settings record
    pub fn persist(&self) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.path, json)?;
        debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

fn read_settings(path: &Path) -> AppResult<Option<Settings>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut settings: Settings = serde_json::from_str(&raw)?;
    settings.clamp();
    Ok(Some(settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join("loudwatch-tests")
            .join(format!("{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.threshold_db, 80);
        assert_eq!(s.duration_threshold_sec, 2.0);
        assert_eq!(s.calibration_offset_db, 0);
        assert_eq!(s.smoothing_speed, SmoothingSpeed::Medium);
        assert_eq!(s.device(), None);
    }

    #[test]
    fn test_smoothing_presets() {
        assert_eq!(SmoothingSpeed::Slow.alpha(), 0.10);
        assert_eq!(SmoothingSpeed::Slow.refresh_interval_ms(), 1000);
        assert_eq!(SmoothingSpeed::Medium.alpha(), 0.25);
        assert_eq!(SmoothingSpeed::Medium.refresh_interval_ms(), 700);
        assert_eq!(SmoothingSpeed::Fast.alpha(), 0.60);
        assert_eq!(SmoothingSpeed::Fast.refresh_interval_ms(), 400);
        assert_eq!(SmoothingSpeed::Fast.next(), SmoothingSpeed::Slow);
    }

    #[test]
    fn test_clamp() {
        let mut s = Settings {
            threshold_db: 500,
            duration_threshold_sec: 0.0,
            calibration_offset_db: -99,
            ..Settings::default()
        };
        s.clamp();
        assert_eq!(s.threshold_db, 120);
        assert_eq!(s.duration_threshold_sec, 0.1);
        assert_eq!(s.calibration_offset_db, -30);

        s.duration_threshold_sec = f32::NAN;
        s.clamp();
        assert_eq!(s.duration_threshold_sec, 2.0);
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["thresholdDb"], 80);
        assert_eq!(json["durationThresholdSec"], 2.0);
        assert_eq!(json["calibrationOffsetDb"], 0);
        assert_eq!(json["smoothingSpeed"], "medium");
        assert_eq!(json["deviceId"], "");
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let s: Settings = serde_json::from_str(r#"{"thresholdDb": 95}"#).unwrap();
        assert_eq!(s.threshold_db, 95);
        assert_eq!(s.smoothing_speed, SmoothingSpeed::Medium);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let store = SettingsStore::load(temp_path());
        assert_eq!(store.settings(), &Settings::default());
    }

    #[test]
    fn test_load_corrupt_file_uses_defaults() {
        let path = temp_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();
        let store = SettingsStore::load(&path);
        assert_eq!(store.settings(), &Settings::default());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_clamps_out_of_range_values() {
        let path = temp_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"thresholdDb": 5, "calibrationOffsetDb": 45}"#).unwrap();
        let store = SettingsStore::load(&path);
        assert_eq!(store.settings().threshold_db, 30);
        assert_eq!(store.settings().calibration_offset_db, 30);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_update_persists_every_change() {
        let path = temp_path();
        let mut store = SettingsStore::load(&path);
        store.update(|s| {
            s.threshold_db = 95;
            s.smoothing_speed = SmoothingSpeed::Fast;
            s.device_id = "USB Mic".to_string();
        });

        let reloaded = SettingsStore::load(&path);
        assert_eq!(reloaded.settings().threshold_db, 95);
        assert_eq!(reloaded.settings().smoothing_speed, SmoothingSpeed::Fast);
        assert_eq!(reloaded.settings().device(), Some("USB Mic"));

        store.update(|s| s.threshold_db += 100);
        let reloaded = SettingsStore::load(&path);
        assert_eq!(reloaded.settings().threshold_db, 120);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_in_range_duration_is_kept_exactly() {
        let path = temp_path();
        let mut store = SettingsStore::load(&path);
        store.update(|s| s.duration_threshold_sec = 2.55);
        assert_eq!(store.settings().duration_threshold_sec, 2.55);

        let reloaded = SettingsStore::load(&path);
        assert_eq!(reloaded.settings().duration_threshold_sec, 2.55);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_reset_keeps_device() {
        let path = temp_path();
        let mut store = SettingsStore::load(&path);
        store.update(|s| {
            s.threshold_db = 40;
            s.device_id = "Built-in".to_string();
        });
        let s = store.reset();
        assert_eq!(s.threshold_db, 80);
        assert_eq!(s.device(), Some("Built-in"));
        let _ = fs::remove_file(&path);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn clamp_keeps_fields_in_range(
            threshold in any::<i32>(),
            duration in any::<f32>(),
            offset in any::<i32>(),
        ) {
            let mut s = Settings {
                threshold_db: threshold,
                duration_threshold_sec: duration,
                calibration_offset_db: offset,
                ..Settings::default()
            };
            s.clamp();
            prop_assert!((30..=120).contains(&s.threshold_db));
            prop_assert!((0.1..=10.0).contains(&s.duration_threshold_sec));
            prop_assert!((-30..=30).contains(&s.calibration_offset_db));
        }
    }
}
