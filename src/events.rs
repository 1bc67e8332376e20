//! Sound event records, the bounded event log, and CSV export

use crate::constants::detector::EVENT_LOG_CAPACITY;
use crate::error::AppResult;
use crate::level::db_label;
use chrono::Local;
use log::info;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// One recorded sustained loud episode
#[derive(Debug, Clone, PartialEq)]
pub struct SoundEvent {
    pub id: Uuid,
    pub timestamp: String,
    pub db: i32,
    pub label: String,
}

impl SoundEvent {
    /// Record a captured peak now
    pub fn new(db: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            db,
            label: db_label(db).to_string(),
        }
    }
}

/// Newest-first log of events, oldest evicted past capacity
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<SoundEvent>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, event: SoundEvent) {
        self.events.push_front(event);
        self.events.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events newest first
    pub fn iter(&self) -> impl Iterator<Item = &SoundEvent> {
        self.events.iter()
    }

    #[cfg(test)]
    pub fn latest(&self) -> Option<&SoundEvent> {
        self.events.front()
    }

    /// Render the log as CSV, newest first
    pub fn write_csv<W: Write>(&self, mut out: W) -> AppResult<()> {
        writeln!(out, "Timestamp,Level (dB),Description")?;
        for event in &self.events {
            writeln!(
                out,
                "{},{},{}",
                quote(&event.timestamp),
                event.db,
                quote(&event.label)
            )?;
        }
        out.flush()?;
        Ok(())
    }

    #[cfg(test)]
    pub fn to_csv(&self) -> AppResult<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Write the CSV to a file, replacing it
    pub fn export_csv(&self, path: &Path) -> AppResult<()> {
        let file = File::create(path)?;
        self.write_csv(BufWriter::new(file))?;
        info!("Exported {} events to {}", self.len(), path.display());
        Ok(())
    }
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Event log shared with deferred emissions
pub type SharedEventLog = Arc<Mutex<EventLog>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn event(db: i32, timestamp: &str) -> SoundEvent {
        SoundEvent {
            id: Uuid::new_v4(),
            timestamp: timestamp.to_string(),
            db,
            label: db_label(db).to_string(),
        }
    }

    #[test]
    fn test_new_event_is_labelled() {
        let e = SoundEvent::new(90);
        assert_eq!(e.db, 90);
        assert_eq!(e.label, "Vacuum / Traffic");
        assert_eq!(e.timestamp.len(), "2024-01-01 00:00:00".len());
        assert_ne!(e.id, SoundEvent::new(90).id);
    }

    #[test]
    fn test_log_is_newest_first_and_bounded() {
        let mut log = EventLog::new();
        for db in 0..60 {
            log.record(event(db, "t"));
        }
        assert_eq!(log.len(), EVENT_LOG_CAPACITY);
        assert_eq!(log.latest().map(|e| e.db), Some(59));
        assert_eq!(log.iter().last().map(|e| e.db), Some(10));
    }

    #[test]
    fn test_csv_format() {
        let mut log = EventLog::new();
        log.record(event(85, "2024-05-01 10:00:00"));
        log.record(event(104, "2024-05-01 10:05:00"));
        let csv = log.to_csv().unwrap();
        assert_eq!(
            csv,
            "Timestamp,Level (dB),Description\n\
             \"2024-05-01 10:05:00\",104,\"Potential Hearing Damage!\"\n\
             \"2024-05-01 10:00:00\",85,\"Vacuum / Traffic\"\n"
        );
    }

    #[test]
    fn test_csv_escapes_quotes() {
        let mut log = EventLog::new();
        let mut e = event(70, "now");
        e.label = "a \"loud\" one".to_string();
        log.record(e);
        let csv = log.to_csv().unwrap();
        assert!(csv.ends_with("\"now\",70,\"a \"\"loud\"\" one\"\n"));
    }

    #[test]
    fn test_export_empty_log() {
        let path = std::env::temp_dir().join(format!("loudwatch-{}.csv", Uuid::new_v4()));
        EventLog::new().export_csv(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "Timestamp,Level (dB),Description\n");
        let _ = std::fs::remove_file(&path);
    }
}
