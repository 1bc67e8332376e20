//! Notification dispatch and emission delivery

use crate::constants::detector::NOTIFY_TITLE;
use crate::detector::{DetachedEmission, Emission};
use crate::error::{AppError, AppResult};
use crate::events::{SharedEventLog, SoundEvent};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A notification as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

/// Receives sustained-noise notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str) -> AppResult<()>;
}

/// Forwards notifications to the UI over a channel
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, title: &str, body: &str) -> AppResult<()> {
        self.tx
            .send(Notification {
                title: title.to_string(),
                body: body.to_string(),
            })
            .map_err(|_| AppError::Notification("notification receiver closed".to_string()))
    }
}

/// Writes notifications to the application log
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) -> AppResult<()> {
        info!("{}: {}", title, body);
        Ok(())
    }
}

/// Hands every notification to each inner notifier, even after one fails
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

impl Notifier for FanoutNotifier {
    fn notify(&self, title: &str, body: &str) -> AppResult<()> {
        let mut result = Ok(());
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(title, body) {
                result = Err(e);
            }
        }
        result
    }
}

/// Body text for a sustained-noise notification
pub fn notification_body(peak_db: i32, duration_threshold_sec: f32) -> String {
    format!(
        "Level reached {} dB for {}+ sec.",
        peak_db, duration_threshold_sec
    )
}

/// Record an event for the captured peak, then announce it.
///
/// The event is logged even if the notifier fails.
pub fn deliver(
    peak_db: i32,
    duration_threshold_sec: f32,
    log: &SharedEventLog,
    notifier: &dyn Notifier,
) -> SoundEvent {
    let event = SoundEvent::new(peak_db);
    log.lock()
        .unwrap_or_else(|e| e.into_inner())
        .record(event.clone());
    info!("Sound event: {} dB ({})", event.db, event.label);

    let body = notification_body(peak_db, duration_threshold_sec);
    if let Err(e) = notifier.notify(NOTIFY_TITLE, &body) {
        warn!("Could not show notification: {}", e);
    }
    event
}

/// Deliver an emission produced by the detector on a tick
pub fn deliver_emission(
    emission: &Emission,
    log: &SharedEventLog,
    notifier: &dyn Notifier,
) -> SoundEvent {
    deliver(
        emission.peak_db,
        emission.duration_threshold_sec,
        log,
        notifier,
    )
}

/// Complete a detached emission after its remaining delay on a
/// fire-and-forget task
pub fn spawn_detached(
    detached: DetachedEmission,
    log: SharedEventLog,
    notifier: Arc<dyn Notifier>,
) -> tokio::task::JoinHandle<SoundEvent> {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(detached.delay_ms)).await;
        deliver(
            detached.peak_db,
            detached.duration_threshold_sec,
            &log,
            notifier.as_ref(),
        )
    })
}
