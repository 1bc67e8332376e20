//! Loudness estimation and dB band classification

use crate::constants::audio::{CALIBRATION_BASELINE_DB, RMS_FLOOR};
use ratatui::style::Color;

/// Root mean square of a sample buffer; 0 for an empty buffer
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Convert RMS amplitude to the uncalibrated display scale.
///
/// Silence (RMS at or below the floor) maps to 0 rather than a large negative number.
pub fn base_db(rms: f64) -> f64 {
    if rms > RMS_FLOOR {
        20.0 * rms.log10() + CALIBRATION_BASELINE_DB
    } else {
        0.0
    }
}

/// Estimate the instantaneous calibrated loudness of one sample buffer.
///
/// Returns a non-negative integer reading; the calibration offset is applied
/// before clamping so a negative offset can never produce a negative value.
pub fn estimate_db(samples: &[f32], calibration_offset_db: i32) -> i32 {
    let db = (base_db(rms(samples)) + f64::from(calibration_offset_db))
        .max(0.0)
        .round();
    // NaN only arises from non-finite samples
    if db.is_nan() { 0 } else { db as i32 }
}

/// Named loudness category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbBand {
    WhisperQuiet,
    QuietLibrary,
    NormalConversation,
    BusyRestaurant,
    VacuumTraffic,
    HearingDamage,
}

impl DbBand {
    /// Classify a reading by fixed breakpoints
    pub fn classify(db: i32) -> Self {
        match db {
            i32::MIN..=29 => DbBand::WhisperQuiet,
            30..=39 => DbBand::QuietLibrary,
            40..=59 => DbBand::NormalConversation,
            60..=79 => DbBand::BusyRestaurant,
            80..=99 => DbBand::VacuumTraffic,
            _ => DbBand::HearingDamage,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DbBand::WhisperQuiet => "Whisper Quiet",
            DbBand::QuietLibrary => "Quiet Library",
            DbBand::NormalConversation => "Normal Conversation",
            DbBand::BusyRestaurant => "Busy Restaurant",
            DbBand::VacuumTraffic => "Vacuum / Traffic",
            DbBand::HearingDamage => "Potential Hearing Damage!",
        }
    }

    /// Colour used for this band in the level bar and event log
    pub fn color(self) -> Color {
        match self {
            DbBand::WhisperQuiet | DbBand::QuietLibrary | DbBand::NormalConversation => Color::Green,
            DbBand::BusyRestaurant => Color::Yellow,
            DbBand::VacuumTraffic => Color::LightRed,
            DbBand::HearingDamage => Color::Red,
        }
    }
}

/// Label for a reading
pub fn db_label(db: i32) -> &'static str {
    DbBand::classify(db).label()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: f32) -> Vec<f32> {
        vec![value; crate::constants::audio::SAMPLE_BUFFER_LEN]
    }

    #[test]
    fn test_silence_is_zero() {
        assert_eq!(estimate_db(&constant(0.0), 0), 0);
        assert_eq!(estimate_db(&constant(0.0), 30), 30);
        assert_eq!(estimate_db(&constant(0.0), -30), 0);
        assert_eq!(estimate_db(&[], 0), 0);
    }

    #[test]
    fn test_full_scale_reads_baseline() {
        // RMS 1.0 is 0 dBFS
        assert_eq!(estimate_db(&constant(1.0), 0), 80);
        assert_eq!(estimate_db(&constant(-1.0), 0), 80);
        assert_eq!(estimate_db(&constant(1.0), -5), 75);
    }

    #[test]
    fn test_known_amplitudes() {
        // 0.1 RMS is -20 dBFS
        assert_eq!(estimate_db(&constant(0.1), 0), 60);
        // sqrt(10) RMS is +10 dBFS
        assert_eq!(estimate_db(&constant(10f32.sqrt()), 0), 90);
    }

    #[test]
    fn test_rms_of_alternating_signal() {
        let samples: Vec<f32> = (0..512).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        assert!((rms(&samples) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_below_floor_is_silence() {
        assert_eq!(base_db(1e-7), 0.0);
        assert_eq!(base_db(0.0), 0.0);
    }

    #[test]
    fn test_non_finite_samples_do_not_panic() {
        assert_eq!(estimate_db(&[f32::NAN; 4], 0), 0);
    }

    #[test]
    fn test_band_breakpoints() {
        assert_eq!(db_label(0), "Whisper Quiet");
        assert_eq!(db_label(29), "Whisper Quiet");
        assert_eq!(db_label(30), "Quiet Library");
        assert_eq!(db_label(45), "Normal Conversation");
        assert_eq!(db_label(79), "Busy Restaurant");
        assert_eq!(db_label(90), "Vacuum / Traffic");
        assert_eq!(db_label(100), "Potential Hearing Damage!");
        assert_eq!(db_label(140), "Potential Hearing Damage!");
    }
}
