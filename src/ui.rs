//! UI rendering and layout utilities

use crate::constants::audio::MAX_DISPLAY_DB;
use crate::detector::DetectorPhase;
use crate::events::SoundEvent;
use crate::level::DbBand;
use crate::notify::Notification;
use crate::settings::Settings;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Sparkline},
};

/// Everything one frame needs
pub struct UiState<'a> {
    pub device_name: &'a str,
    pub monitoring: bool,
    pub current_db: i32,
    pub display_db: f32,
    pub settings: &'a Settings,
    pub phase: DetectorPhase,
    pub status: &'a str,
    pub banner: Option<&'a Notification>,
    pub history: &'a [u64],
    pub trend: &'a [u64],
    pub events: &'a [SoundEvent],
}

/// dB value at a bar position
fn db_at(i: usize, width: usize) -> i32 {
    (i as f32 / width.max(1) as f32 * MAX_DISPLAY_DB) as i32
}

/// Create a gradient bar showing audio levels, coloured by dB band
pub fn create_gradient_bar(width: usize, ratio: f64) -> Line<'static> {
    let filled = (ratio * width as f64) as usize;
    let partial_fill = (ratio * width as f64) - filled as f64;
    let mut spans = Vec::new();

    for i in 0..width {
        let color = DbBand::classify(db_at(i, width)).color();

        let ch = if i < filled {
            '█'
        } else if i == filled && partial_fill > 0.0 {
            // Partial fill characters for smoother appearance
            match (partial_fill * 8.0) as usize {
                0..=1 => '░',
                2..=3 => '▒',
                4..=5 => '▓',
                _ => '█',
            }
        } else {
            '░'
        };
        spans.push(Span::styled(ch.to_string(), Style::default().fg(color)));
    }

    Line::from(spans)
}

/// Create dB scale labels with threshold indicator
pub fn create_db_labels(width: usize, threshold_db: i32) -> Line<'static> {
    if width == 0 {
        return Line::default();
    }
    let threshold_ratio = (threshold_db as f32 / MAX_DISPLAY_DB).clamp(0.0, 1.0);
    let threshold_pos = (threshold_ratio * (width - 1) as f32).round() as usize;
    let marks = [0, 30, 60, 90, 120];

    let mut spans = Vec::new();
    let mut i = 0;
    while i < width {
        if i == threshold_pos {
            spans.push(Span::styled("▲", Style::default().fg(Color::White)));
            i += 1;
            continue;
        }

        let mark = marks.iter().find(|&&m| {
            let pos = ((m as f32 / MAX_DISPLAY_DB) * (width - 1) as f32).round() as usize;
            pos == i
        });
        let color = DbBand::classify(db_at(i, width)).color();
        match mark {
            // Only print a label if it fits before the marker and the edge
            Some(m) => {
                let text = m.to_string();
                let end = i + text.len();
                if end <= width && !(i..end).contains(&threshold_pos) {
                    i = end;
                    spans.push(Span::styled(text, Style::default().fg(color)));
                } else {
                    i += 1;
                    spans.push(Span::raw(" "));
                }
            }
            None => {
                i += 1;
                spans.push(Span::raw(" "));
            }
        }
    }

    Line::from(spans)
}

fn phase_text(phase: DetectorPhase) -> (&'static str, Color) {
    match phase {
        DetectorPhase::Idle => ("Listening", Color::Green),
        DetectorPhase::Sustaining => ("Loud - timing", Color::Yellow),
        DetectorPhase::Finalizing => ("Capturing peak", Color::Red),
        DetectorPhase::Cooling => ("Cooling down", Color::Cyan),
    }
}

/// Render the complete UI
pub fn render_ui(f: &mut Frame, state: &UiState) {
    let size = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Length(5),
            Constraint::Length(5),
            Constraint::Min(3),
        ])
        .split(size);

    // Device
    let device_title = if state.monitoring { "Device" } else { "Device (stopped)" };
    let device_block = Block::default().title(device_title).borders(Borders::ALL);
    let device_text = Paragraph::new(state.device_name).block(device_block);
    f.render_widget(device_text, chunks[0]);

    // Settings
    let s = state.settings;
    let settings_text = Paragraph::new(format!(
        "Threshold {} dB | Duration {:.1}s | Calibration {:+} dB | Smoothing {}",
        s.threshold_db,
        s.duration_threshold_sec,
        s.calibration_offset_db,
        s.smoothing_speed.name()
    ))
    .block(
        Block::default()
            .title("Settings  [+/-] [ [/] ] [</>] [s] [d]evice [p]ause [e]xport [q]uit")
            .borders(Borders::ALL),
    );
    f.render_widget(settings_text, chunks[1]);

    // Level bar with labels
    let db_ratio = (state.display_db / MAX_DISPLAY_DB).clamp(0.0, 1.0) as f64;
    let bar_width =
        (chunks[2].width as usize).saturating_sub(crate::constants::ui::BAR_BORDER_WIDTH);
    let bar_line = create_gradient_bar(bar_width, db_ratio);
    let label_line = create_db_labels(bar_width, s.threshold_db);
    let band = DbBand::classify(state.display_db.round() as i32);
    let gauge = Paragraph::new(vec![bar_line, label_line]).block(
        Block::default()
            .title(format!(
                "Level: {:.0} dB - {} (Raw: {} dB)",
                state.display_db,
                band.label(),
                state.current_db
            ))
            .borders(Borders::ALL),
    );
    f.render_widget(gauge, chunks[2]);

    // Alert banner or status
    let (phase, phase_color) = phase_text(state.phase);
    let alert_line = match state.banner {
        Some(n) => Line::from(vec![
            Span::styled(
                format!("{} ", n.title),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
            Span::raw(n.body.clone()),
        ]),
        None => Line::from(vec![
            Span::styled(phase, Style::default().fg(phase_color)),
            Span::raw(format!("  {}", state.status)),
        ]),
    };
    let alert = Paragraph::new(alert_line).block(Block::default().title("Status").borders(Borders::ALL));
    f.render_widget(alert, chunks[3]);

    // Short-horizon history
    let history = Sparkline::default()
        .block(Block::default().title("Recent").borders(Borders::ALL))
        .data(state.history)
        .max(MAX_DISPLAY_DB as u64)
        .style(Style::default().fg(Color::Cyan));
    f.render_widget(history, chunks[4]);

    // Session trend, newest points on the right
    let trend_width = (chunks[5].width as usize).saturating_sub(crate::constants::ui::BAR_BORDER_WIDTH);
    let trend_start = state.trend.len().saturating_sub(trend_width);
    let trend = Sparkline::default()
        .block(Block::default().title("Session peaks (30s)").borders(Borders::ALL))
        .data(&state.trend[trend_start..])
        .max(MAX_DISPLAY_DB as u64)
        .style(Style::default().fg(Color::Magenta));
    f.render_widget(trend, chunks[5]);

    // Event log
    let items: Vec<ListItem> = state
        .events
        .iter()
        .map(|e| {
            ListItem::new(Line::from(vec![
                Span::raw(format!("{}  ", e.timestamp)),
                Span::styled(
                    format!("{:>3} dB  ", e.db),
                    Style::default().fg(DbBand::classify(e.db).color()),
                ),
                Span::raw(e.label.clone()),
            ]))
        })
        .collect();
    let events = List::new(items).block(
        Block::default()
            .title(format!("Events ({})", state.events.len()))
            .borders(Borders::ALL),
    );
    f.render_widget(events, chunks[6]);
}
