//! Application constants and configuration values

/// Audio capture and loudness estimation constants
pub mod audio {
    /// Samples analysed per tick
    pub const SAMPLE_BUFFER_LEN: usize = 512;
    /// Offset mapping dBFS onto a 0-120 dB display scale
    pub const CALIBRATION_BASELINE_DB: f64 = 80.0;
    /// RMS at or below this reads as silence
    pub const RMS_FLOOR: f64 = 1e-6;
    /// Upper end of the display scale
    pub const MAX_DISPLAY_DB: f32 = 120.0;
    /// Buffer size for audio streams
    pub const BUFFER_SIZE: cpal::BufferSize = cpal::BufferSize::Default;
}

/// Settings ranges and defaults
pub mod settings {
    /// Storage key the settings file is named after
    pub const STORAGE_KEY: &str = "loudwatch-settings";

    pub const DEFAULT_THRESHOLD_DB: i32 = 80;
    pub const MIN_THRESHOLD_DB: i32 = 30;
    pub const MAX_THRESHOLD_DB: i32 = 120;

    pub const DEFAULT_DURATION_SEC: f32 = 2.0;
    pub const MIN_DURATION_SEC: f32 = 0.1;
    pub const MAX_DURATION_SEC: f32 = 10.0;

    pub const DEFAULT_CALIBRATION_OFFSET_DB: i32 = 0;
    pub const MIN_CALIBRATION_OFFSET_DB: i32 = -30;
    pub const MAX_CALIBRATION_OFFSET_DB: i32 = 30;
}

/// Smoothing presets: (alpha, display refresh interval in ms)
pub mod smoothing {
    pub const SLOW: (f32, u64) = (0.10, 1000);
    pub const MEDIUM: (f32, u64) = (0.25, 700);
    pub const FAST: (f32, u64) = (0.60, 400);
}

/// Sustained event detection timing
pub mod detector {
    /// Extra time after qualification during which the peak keeps climbing
    pub const FINALIZE_DELAY_MS: u64 = 1000;
    /// Minimum spacing between notifications
    pub const COOLDOWN_MS: u64 = 7000;
    /// Notification title
    pub const NOTIFY_TITLE: &str = "Sustained Noise Detected!";
    /// Maximum number of events kept in the log
    pub const EVENT_LOG_CAPACITY: usize = 50;
}

/// Long-horizon trend aggregation
pub mod session {
    /// Interval between trend points
    pub const INTERVAL_MS: u64 = 30_000;
    /// 4 hours at 30s resolution
    pub const CAPACITY: usize = 480;
}

/// UI display constants
pub mod ui {
    /// Tick interval in milliseconds (~60Hz)
    pub const TICK_INTERVAL_MS: u64 = 16;
    /// Live history length
    pub const HISTORY_CAPACITY: usize = 100;
    /// How long a notification banner stays visible
    pub const BANNER_MS: u64 = 5000;
    /// Bar width calculation accounts for borders
    pub const BAR_BORDER_WIDTH: usize = 2;
}
