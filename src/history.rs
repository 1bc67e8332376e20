//! Bounded trend buffers and the periodic session aggregator

use crate::constants::session;
use log::debug;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fixed-capacity buffer that evicts its oldest entry when full
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Copy> BoundedBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, dropping the oldest beyond capacity
    pub fn push(&mut self, value: T) {
        if self.capacity == 0 {
            return;
        }
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(value);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Values oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Reduces readings into one peak per fixed interval
#[derive(Debug)]
pub struct SessionAggregator {
    peak_db: i32,
    buffer: BoundedBuffer<i32>,
}

impl Default for SessionAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self {
            peak_db: 0,
            buffer: BoundedBuffer::new(session::CAPACITY),
        }
    }

    /// Track a reading towards the current interval's peak
    pub fn observe(&mut self, db: i32) {
        self.peak_db = self.peak_db.max(db);
    }

    /// Close the current interval: record its peak and start over
    pub fn flush(&mut self) -> i32 {
        let peak = std::mem::take(&mut self.peak_db);
        self.buffer.push(peak);
        peak
    }

    /// Peak of the interval in progress
    #[cfg(test)]
    pub fn current_peak(&self) -> i32 {
        self.peak_db
    }

    pub fn trend(&self) -> &BoundedBuffer<i32> {
        &self.buffer
    }
}

/// Aggregator shared between the tick loop and the interval timer
pub type SharedSession = Arc<Mutex<SessionAggregator>>;

/// Flush the aggregator every interval for the rest of the process lifetime
pub async fn run_session_timer(aggregator: SharedSession) {
    let period = Duration::from_millis(session::INTERVAL_MS);
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        interval.tick().await;
        let peak = aggregator.lock().unwrap_or_else(|e| e.into_inner()).flush();
        debug!("Session trend point: {} dB", peak);
    }
}
