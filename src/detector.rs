//! Sustained loud event detection
//!
//! An episode starts on the first reading strictly above the threshold and is
//! broken by any reading at or below it. Once an episode has lasted the
//! configured duration and the notification cooldown has elapsed, the
//! detector qualifies it and waits a further grace period so the captured
//! peak can keep climbing. The event is emitted when that delay expires.

use crate::constants::detector::{COOLDOWN_MS, FINALIZE_DELAY_MS};
use crate::settings::Settings;
use log::debug;

/// Observable detector phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorPhase {
    Idle,
    /// Above threshold, not yet qualified
    Sustaining,
    /// Qualified, waiting out the peak-capture delay
    Finalizing,
    /// Inside the cooldown after the last notification
    Cooling,
}

/// Parameters read from settings on every tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorParams {
    pub threshold_db: i32,
    pub duration_threshold_sec: f32,
}

impl DetectorParams {
    fn duration_threshold_ms(&self) -> u64 {
        (f64::from(self.duration_threshold_sec) * 1000.0).round() as u64
    }
}

impl From<&Settings> for DetectorParams {
    fn from(settings: &Settings) -> Self {
        Self {
            threshold_db: settings.threshold_db,
            duration_threshold_sec: settings.duration_threshold_sec,
        }
    }
}

/// A qualified episode waiting for its emission time
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingEmission {
    fire_at_ms: u64,
    duration_threshold_sec: f32,
}

/// A finished episode ready to be recorded and announced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emission {
    pub peak_db: i32,
    pub duration_threshold_sec: f32,
    pub fired_at_ms: u64,
}

/// Snapshot of a pending emission handed off when monitoring stops
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetachedEmission {
    pub delay_ms: u64,
    pub peak_db: i32,
    pub duration_threshold_sec: f32,
}

/// Sustained-threshold state machine
#[derive(Debug, Default)]
pub struct EventDetector {
    loud_start_ms: Option<u64>,
    event_peak_db: i32,
    last_notify_ms: Option<u64>,
    pending: Option<PendingEmission>,
    alerting: bool,
}

impl EventDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one reading; returns an emission when one fires at `now_ms`
    pub fn update(&mut self, current_db: i32, now_ms: u64, params: DetectorParams) -> Option<Emission> {
        if current_db > params.threshold_db {
            self.alerting = true;
            let start = *self.loud_start_ms.get_or_insert(now_ms);
            self.event_peak_db = self.event_peak_db.max(current_db);

            let sustained_ms = now_ms.saturating_sub(start);
            if self.pending.is_none()
                && sustained_ms >= params.duration_threshold_ms()
                && self.cooldown_elapsed(now_ms)
            {
                debug!(
                    "Sustained episode qualified after {} ms at {} dB",
                    sustained_ms, current_db
                );
                self.pending = Some(PendingEmission {
                    fire_at_ms: now_ms + FINALIZE_DELAY_MS,
                    duration_threshold_sec: params.duration_threshold_sec,
                });
            }
        } else {
            self.loud_start_ms = None;
            self.alerting = false;
            if self.pending.is_none() {
                self.event_peak_db = 0;
            }
        }

        self.poll(now_ms)
    }

    /// Fire the pending emission if its delay has elapsed
    pub fn poll(&mut self, now_ms: u64) -> Option<Emission> {
        let pending = self.pending.filter(|p| now_ms >= p.fire_at_ms)?;
        self.pending = None;
        self.last_notify_ms = Some(now_ms);
        Some(Emission {
            peak_db: std::mem::take(&mut self.event_peak_db),
            duration_threshold_sec: pending.duration_threshold_sec,
            fired_at_ms: now_ms,
        })
    }

    /// Take a pending emission out of the detector so it can complete on its
    /// own after monitoring stops. The peak is frozen at its current value and
    /// the cooldown is counted from the scheduled fire time.
    pub fn detach_pending(&mut self, now_ms: u64) -> Option<DetachedEmission> {
        let pending = self.pending.take()?;
        self.last_notify_ms = Some(pending.fire_at_ms.max(now_ms));
        Some(DetachedEmission {
            delay_ms: pending.fire_at_ms.saturating_sub(now_ms),
            peak_db: std::mem::take(&mut self.event_peak_db),
            duration_threshold_sec: pending.duration_threshold_sec,
        })
    }

    /// Forget the current episode; the cooldown is preserved
    pub fn reset_episode(&mut self) {
        self.loud_start_ms = None;
        self.event_peak_db = 0;
        self.pending = None;
        self.alerting = false;
    }

    fn cooldown_elapsed(&self, now_ms: u64) -> bool {
        self.last_notify_ms
            .is_none_or(|last| now_ms.saturating_sub(last) > COOLDOWN_MS)
    }

    pub fn phase(&self, now_ms: u64) -> DetectorPhase {
        if self.pending.is_some() {
            DetectorPhase::Finalizing
        } else if self.loud_start_ms.is_some() {
            DetectorPhase::Sustaining
        } else if !self.cooldown_elapsed(now_ms) {
            DetectorPhase::Cooling
        } else {
            DetectorPhase::Idle
        }
    }

    /// Whether the latest reading was above threshold
    #[cfg(test)]
    pub fn is_alerting(&self) -> bool {
        self.alerting
    }

    #[cfg(test)]
    pub fn loud_start_ms(&self) -> Option<u64> {
        self.loud_start_ms
    }

    #[cfg(test)]
    pub fn event_peak_db(&self) -> i32 {
        self.event_peak_db
    }
}
