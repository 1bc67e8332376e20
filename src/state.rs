//! Monitoring pipeline state and the per-tick analysis step

use crate::constants::ui::{BANNER_MS, HISTORY_CAPACITY};
use crate::detector::{DetectorParams, DetectorPhase, EventDetector};
use crate::events::{EventLog, SharedEventLog, SoundEvent};
use crate::history::{BoundedBuffer, SessionAggregator, SharedSession};
use crate::level::estimate_db;
use crate::notify::{self, Notification, Notifier};
use crate::settings::{Settings, SmoothingSpeed};
use crate::smoothing::Smoother;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;

/// Milliseconds since the monitor process started
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    start: Instant,
}

impl Clock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// State that outlives a single monitoring session
#[derive(Clone)]
pub struct SharedState {
    pub event_log: SharedEventLog,
    pub session: SharedSession,
    pub notifier: Arc<dyn Notifier>,
}

impl SharedState {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            event_log: Arc::new(Mutex::new(EventLog::new())),
            session: Arc::new(Mutex::new(SessionAggregator::new())),
            notifier,
        }
    }

    /// Copy of the event log, newest first
    pub fn events(&self) -> Vec<SoundEvent> {
        self.event_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Copy of the session trend, oldest first
    pub fn trend(&self) -> Vec<i32> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .trend()
            .to_vec()
    }
}

/// Result of one analysis tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub current_db: i32,
    /// Smoothed value, present only when due for display
    pub display_db: Option<f32>,
    pub event: Option<SoundEvent>,
}

/// Turns sample buffers into readings, display values and events
pub struct Monitor {
    smoother: Smoother,
    detector: EventDetector,
    history: BoundedBuffer<i32>,
    shared: SharedState,
}

impl Monitor {
    pub fn new(shared: SharedState, speed: SmoothingSpeed) -> Self {
        Self {
            smoother: Smoother::new(speed),
            detector: EventDetector::new(),
            history: BoundedBuffer::new(HISTORY_CAPACITY),
            shared,
        }
    }

    /// Analyse one sample buffer taken at `now_ms`
    pub fn tick(&mut self, samples: &[f32], now_ms: u64, settings: &Settings) -> TickOutcome {
        let current_db = estimate_db(samples, settings.calibration_offset_db);

        self.smoother.set_speed(settings.smoothing_speed);
        let display_db = self.smoother.update(current_db, now_ms);
        if display_db.is_some() {
            self.history.push(current_db);
        }

        self.shared
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .observe(current_db);

        let event = self
            .detector
            .update(current_db, now_ms, DetectorParams::from(settings))
            .map(|emission| {
                notify::deliver_emission(&emission, &self.shared.event_log, self.shared.notifier.as_ref())
            });

        TickOutcome {
            current_db,
            display_db,
            event,
        }
    }

    /// Monitoring stopped: let any qualified episode finish on its own
    pub fn stop(&mut self, now_ms: u64) -> Option<JoinHandle<SoundEvent>> {
        let detached = self.detector.detach_pending(now_ms)?;
        Some(notify::spawn_detached(
            detached,
            Arc::clone(&self.shared.event_log),
            Arc::clone(&self.shared.notifier),
        ))
    }

    /// Start over on a new input device; the notification cooldown carries over
    pub fn reset_for_device(&mut self) {
        self.smoother.reset();
        self.history.clear();
        self.detector.reset_episode();
    }

    pub fn phase(&self, now_ms: u64) -> DetectorPhase {
        self.detector.phase(now_ms)
    }

    pub fn history(&self) -> &BoundedBuffer<i32> {
        &self.history
    }

    #[cfg(test)]
    pub fn smoothed_db(&self) -> f32 {
        self.smoother.smoothed()
    }

    #[cfg(test)]
    pub fn shared(&self) -> &SharedState {
        &self.shared
    }
}

/// Values the UI shows between ticks
pub struct AppState {
    pub device_name: String,
    pub monitoring: bool,
    pub current_db: i32,
    pub display_db: f32,
    pub status: String,
    banner: Option<(Notification, u64)>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            device_name: String::from("(none)"),
            monitoring: false,
            current_db: 0,
            display_db: 0.0,
            status: String::new(),
            banner: None,
        }
    }

    pub fn apply(&mut self, outcome: &TickOutcome) {
        self.current_db = outcome.current_db;
        if let Some(display) = outcome.display_db {
            self.display_db = display;
        }
    }

    pub fn show_banner(&mut self, notification: Notification, now_ms: u64) {
        self.banner = Some((notification, now_ms));
    }

    /// The latest notification while it is still fresh
    pub fn banner(&self, now_ms: u64) -> Option<&Notification> {
        self.banner
            .as_ref()
            .filter(|(_, shown)| now_ms.saturating_sub(*shown) < BANNER_MS)
            .map(|(n, _)| n)
    }

    /// Device gone or paused: nothing to read
    pub fn clear_reading(&mut self) {
        self.current_db = 0;
        self.display_db = 0.0;
    }
}
