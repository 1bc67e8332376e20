//! Audio level smoothing for stable display

use crate::settings::SmoothingSpeed;

/// Applies exponential smoothing to loudness readings.
///
/// The average runs on every reading; only the display emission is rate
/// limited by the preset's refresh interval.
pub struct Smoother {
    smoothed_db: f32,
    last_display_update_ms: Option<u64>,
    speed: SmoothingSpeed,
}

impl Smoother {
    /// Create a new smoother starting from silence
    pub fn new(speed: SmoothingSpeed) -> Self {
        Self {
            smoothed_db: 0.0,
            last_display_update_ms: None,
            speed,
        }
    }

    /// Switch preset; the running average is kept
    pub fn set_speed(&mut self, speed: SmoothingSpeed) {
        self.speed = speed;
    }

    /// Feed one reading.
    /// Returns the smoothed value when it is due for display
    pub fn update(&mut self, current_db: i32, now_ms: u64) -> Option<f32> {
        let alpha = self.speed.alpha();
        self.smoothed_db = alpha * current_db as f32 + (1.0 - alpha) * self.smoothed_db;

        let due = match self.last_display_update_ms {
            Some(last) => now_ms.saturating_sub(last) > self.speed.refresh_interval_ms(),
            None => true,
        };
        if due {
            self.last_display_update_ms = Some(now_ms);
            Some(self.smoothed_db)
        } else {
            None
        }
    }

    /// Get the current smoothed value
    #[cfg(test)]
    pub fn smoothed(&self) -> f32 {
        self.smoothed_db
    }

    /// Forget history, e.g. after switching input device
    pub fn reset(&mut self) {
        self.smoothed_db = 0.0;
        self.last_display_update_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_update_is_displayed() {
        let mut smoother = Smoother::new(SmoothingSpeed::Medium);
        let shown = smoother.update(80, 0);
        assert_eq!(shown, Some(20.0));
    }

    #[test]
    fn test_display_is_throttled_but_average_is_not() {
        let mut smoother = Smoother::new(SmoothingSpeed::Fast);
        assert!(smoother.update(100, 0).is_some());

        // Within the 400ms window nothing is emitted, yet the average moves
        let before = smoother.smoothed();
        assert!(smoother.update(100, 16).is_none());
        assert!(smoother.smoothed() > before);
        assert!(smoother.update(100, 400).is_none());

        let shown = smoother.update(100, 401);
        assert_eq!(shown, Some(smoother.smoothed()));
    }

    #[test]
    fn test_refresh_interval_follows_speed() {
        let mut smoother = Smoother::new(SmoothingSpeed::Slow);
        smoother.update(50, 0);
        assert!(smoother.update(50, 900).is_none());
        smoother.set_speed(SmoothingSpeed::Fast);
        assert!(smoother.update(50, 901).is_some());
    }

    #[test]
    fn test_reset() {
        let mut smoother = Smoother::new(SmoothingSpeed::Fast);
        smoother.update(90, 0);
        smoother.reset();
        assert_eq!(smoother.smoothed(), 0.0);
        assert!(smoother.update(0, 1).is_some());
    }
}
