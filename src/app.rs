//! Main application logic and orchestration

use crate::audio::{self, CaptureSession, MonitorSession};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::history::run_session_timer;
use crate::events::SoundEvent;
use crate::notify::{ChannelNotifier, FanoutNotifier, LogNotifier, Notification, Notifier};
use crate::settings::SettingsStore;
use crate::state::{AppState, Clock, Monitor, SharedState};
use crate::ui;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{debug, error, info, warn};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Exit codes for the application
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
}

/// Result of an interactive run
pub struct RunResult {
    pub result: AppResult<()>,
    pub exit_code: ExitCode,
}

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    Quit,
    Threshold(i32),
    Duration(f32),
    Calibration(i32),
    CycleSmoothing,
    NextDevice,
    ToggleMonitoring,
    Export,
}

fn action_for(key: KeyEvent) -> Option<Action> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::Quit),
        KeyCode::Char('+') | KeyCode::Char('=') => Some(Action::Threshold(1)),
        KeyCode::Char('-') => Some(Action::Threshold(-1)),
        KeyCode::Char(']') => Some(Action::Duration(0.1)),
        KeyCode::Char('[') => Some(Action::Duration(-0.1)),
        KeyCode::Char('>') | KeyCode::Char('.') => Some(Action::Calibration(1)),
        KeyCode::Char('<') | KeyCode::Char(',') => Some(Action::Calibration(-1)),
        KeyCode::Char('s') => Some(Action::CycleSmoothing),
        KeyCode::Char('d') => Some(Action::NextDevice),
        KeyCode::Char('p') => Some(Action::ToggleMonitoring),
        KeyCode::Char('e') => Some(Action::Export),
        _ => None,
    }
}

/// Next duration threshold for a key step, kept on the 0.1 s grid
fn step_duration(current: f32, step: f32) -> f32 {
    ((current + step) * 10.0).round() / 10.0
}

/// The single active capture session and the pipeline it feeds
struct Monitoring<S: CaptureSession = MonitorSession> {
    session: Option<S>,
    monitor: Monitor,
}

impl<S: CaptureSession> Monitoring<S> {
    fn new(monitor: Monitor) -> Self {
        Self {
            session: None,
            monitor,
        }
    }

    /// Start capturing; on failure nothing changes and monitoring stays off
    fn start(&mut self, device_id: Option<&str>) -> AppResult<&S> {
        if self.session.is_some() {
            return Err(AppError::AudioDevice("A monitoring session is already active".to_string()));
        }
        let session = S::open(device_id)?;
        Ok(self.session.insert(session))
    }

    /// Release the device; a qualified episode still completes in the background
    fn stop(&mut self, now_ms: u64) -> Option<JoinHandle<SoundEvent>> {
        let pending = self.monitor.stop(now_ms);
        if pending.is_some() {
            info!("Pending sound event will be delivered after monitoring stopped");
        }
        if let Some(session) = self.session.take() {
            session.stop();
        }
        pending
    }

    /// Tear down the current session fully before acquiring the next device
    fn switch(&mut self, device_id: &str, now_ms: u64) -> AppResult<&S> {
        self.stop(now_ms);
        self.monitor.reset_for_device();
        self.start(Some(device_id))
    }
}

/// Stop capturing and write the requested export. A qualified episode is
/// awaited first so it is part of the file.
async fn shutdown<S: CaptureSession>(
    monitoring: &mut Monitoring<S>,
    shared: &SharedState,
    now_ms: u64,
    export_path: Option<&Path>,
) -> AppResult<()> {
    let pending = monitoring.stop(now_ms);
    if let Some(path) = export_path {
        if let Some(handle) = pending
            && let Err(e) = handle.await
        {
            warn!("Pending sound event was lost: {}", e);
        }
        export_events(shared, path)?;
    }
    Ok(())
}

/// Main application struct
pub struct App {
    config: Config,
    store: SettingsStore,
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
}

impl App {
    /// Initialize the application with configuration
    pub fn new_with_config(config: Config) -> AppResult<Self> {
        let store = SettingsStore::load(&config.settings_path);

        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(App {
            config,
            store,
            terminal,
        })
    }

    /// Run the main application loop
    pub async fn run(mut self) -> RunResult {
        let result = self.run_loop().await;
        if let Err(e) = self.cleanup() {
            warn!("Failed to restore terminal: {}", e);
        }
        let exit_code = if result.is_ok() {
            ExitCode::Success
        } else {
            ExitCode::Error
        };
        RunResult { result, exit_code }
    }

    async fn run_loop(&mut self) -> AppResult<()> {
        let clock = Clock::start();
        let (channel, mut notifications) = ChannelNotifier::new();
        let notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier), Arc::new(channel)];
        let shared = SharedState::new(Arc::new(FanoutNotifier::new(notifiers)));
        tokio::spawn(run_session_timer(Arc::clone(&shared.session)));

        let mut monitoring: Monitoring = Monitoring::new(Monitor::new(
            shared.clone(),
            self.store.settings().smoothing_speed,
        ));
        let mut app_state = AppState::new();

        let initial_device = self.initial_device();
        self.start_monitoring(&mut monitoring, &mut app_state, initial_device.as_deref());

        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let cancelled = Arc::clone(&cancelled);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancelled.store(true, Ordering::SeqCst);
                }
            });
        }

        let mut interval = tokio::time::interval(Duration::from_millis(crate::constants::ui::TICK_INTERVAL_MS));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut samples = Vec::with_capacity(crate::constants::audio::SAMPLE_BUFFER_LEN);

        while !cancelled.load(Ordering::SeqCst) {
            interval.tick().await;
            let now = clock.now_ms();

            if let Some(session) = &monitoring.session {
                session.read_samples(&mut samples);
                let outcome = monitoring.monitor.tick(&samples, now, self.store.settings());
                app_state.apply(&outcome);
            }
            drain_notifications(&mut notifications, &mut app_state, now);

            self.draw(&monitoring, &app_state, &shared, now)?;

            while crossterm::event::poll(Duration::from_millis(0))? {
                let Event::Key(key) = crossterm::event::read()? else {
                    continue;
                };
                let Some(action) = action_for(key) else {
                    continue;
                };
                if action == Action::Quit {
                    cancelled.store(true, Ordering::SeqCst);
                    break;
                }
                self.handle_action(action, &mut monitoring, &mut app_state, &shared, now);
            }
        }

        shutdown(
            &mut monitoring,
            &shared,
            clock.now_ms(),
            self.config.export_path.as_deref(),
        )
        .await
    }

    /// Device override, then the saved device if present, then the first available
    fn initial_device(&self) -> Option<String> {
        if let Some(device) = &self.config.device_override {
            return Some(device.clone());
        }
        match audio::list_input_devices() {
            Ok(devices) => audio::select_device(&devices, self.store.settings().device())
                .map(|d| d.id.clone()),
            Err(e) => {
                warn!("Could not enumerate input devices: {}", e);
                None
            }
        }
    }

    fn start_monitoring(&mut self, monitoring: &mut Monitoring, app_state: &mut AppState, device_id: Option<&str>) {
        match monitoring.start(device_id) {
            Ok(session) => {
                let device = session.device().clone();
                app_state.monitoring = true;
                app_state.status = format!("Monitoring {}", device.label);
                app_state.device_name = device.label;
                self.store.update(|s| s.device_id = device.id);
            }
            Err(e) => self.report_start_failure(app_state, e),
        }
    }

    fn report_start_failure(&self, app_state: &mut AppState, e: AppError) {
        error!("Could not start monitoring: {}", e);
        app_state.monitoring = false;
        app_state.clear_reading();
        app_state.status = format!("Not monitoring: {}", e);
    }

    fn handle_action(
        &mut self,
        action: Action,
        monitoring: &mut Monitoring,
        app_state: &mut AppState,
        shared: &SharedState,
        now: u64,
    ) {
        match action {
            Action::Quit => {}
            Action::Threshold(step) => {
                self.store.update(|s| s.threshold_db += step);
            }
            Action::Duration(step) => {
                self.store
                    .update(|s| s.duration_threshold_sec = step_duration(s.duration_threshold_sec, step));
            }
            Action::Calibration(step) => {
                self.store.update(|s| s.calibration_offset_db += step);
            }
            Action::CycleSmoothing => {
                self.store.update(|s| s.smoothing_speed = s.smoothing_speed.next());
            }
            Action::NextDevice => self.next_device(monitoring, app_state, now),
            Action::ToggleMonitoring => {
                if monitoring.session.is_some() {
                    monitoring.stop(now);
                    app_state.monitoring = false;
                    app_state.clear_reading();
                    app_state.status = "Monitoring stopped".to_string();
                } else {
                    monitoring.monitor.reset_for_device();
                    let device = self.store.settings().device().map(str::to_string);
                    self.start_monitoring(monitoring, app_state, device.as_deref());
                }
            }
            Action::Export => {
                let path = default_export_path();
                app_state.status = match export_events(shared, &path) {
                    Ok(()) => format!("Exported events to {}", path.display()),
                    Err(e) => {
                        error!("Export failed: {}", e);
                        format!("Export failed: {}", e)
                    }
                };
            }
        }
    }

    fn next_device(&mut self, monitoring: &mut Monitoring, app_state: &mut AppState, now: u64) {
        let devices = match audio::list_input_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Could not enumerate input devices: {}", e);
                app_state.status = format!("Could not list devices: {}", e);
                return;
            }
        };
        let current = monitoring.session.as_ref().map(|s| s.device().id.clone());
        let Some(next) = audio::next_device(&devices, current.as_deref()).cloned() else {
            app_state.status = "No input devices available".to_string();
            return;
        };

        info!("Switching input device to {}", next.label);
        match monitoring.switch(&next.id, now) {
            Ok(_) => {
                app_state.monitoring = true;
                app_state.clear_reading();
                app_state.device_name = next.label.clone();
                app_state.status = format!("Monitoring {}", next.label);
                self.store.update(|s| s.device_id = next.id);
            }
            Err(e) => self.report_start_failure(app_state, e),
        }
    }

    fn draw(&mut self, monitoring: &Monitoring, app_state: &AppState, shared: &SharedState, now: u64) -> AppResult<()> {
        let history: Vec<u64> = monitoring
            .monitor
            .history()
            .iter()
            .map(|&db| db.max(0) as u64)
            .collect();
        let trend: Vec<u64> = shared.trend().into_iter().map(|db| db.max(0) as u64).collect();
        let events = shared.events();

        let ui_state = ui::UiState {
            device_name: &app_state.device_name,
            monitoring: app_state.monitoring,
            current_db: app_state.current_db,
            display_db: app_state.display_db,
            settings: self.store.settings(),
            phase: monitoring.monitor.phase(now),
            status: &app_state.status,
            banner: app_state.banner(now),
            history: &history,
            trend: &trend,
            events: &events,
        };
        self.terminal.draw(|f| ui::render_ui(f, &ui_state))?;
        Ok(())
    }

    /// Restore terminal state
    fn cleanup(&mut self) -> AppResult<()> {
        disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

fn drain_notifications(rx: &mut UnboundedReceiver<Notification>, app_state: &mut AppState, now: u64) {
    while let Ok(notification) = rx.try_recv() {
        if let Err(e) = execute!(io::stdout(), crossterm::style::Print('\x07')) {
            debug!("Could not ring terminal bell: {}", e);
        }
        app_state.show_banner(notification, now);
    }
}

/// Timestamped CSV file in the current directory
fn default_export_path() -> PathBuf {
    PathBuf::from(format!(
        "loudwatch-events-{}.csv",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ))
}

fn export_events(shared: &SharedState, path: &Path) -> AppResult<()> {
    shared
        .event_log
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .export_csv(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::InputDevice;
    use crate::constants::audio::SAMPLE_BUFFER_LEN;
    use crate::detector::DetectorPhase;
    use crate::notify::testing::RecordingNotifier;
    use crate::settings::{Settings, SmoothingSpeed};
    use std::cell::RefCell;

    const MISSING_DEVICE: &str = "no-such-device";

    thread_local! {
        static CALLS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    fn calls() -> Vec<String> {
        CALLS.with(|c| c.borrow().clone())
    }

    fn record(call: String) {
        CALLS.with(|c| c.borrow_mut().push(call));
    }

    /// Capture that plays a constant tone and records its lifecycle
    struct FakeCapture {
        device: InputDevice,
    }

    impl CaptureSession for FakeCapture {
        fn open(device_id: Option<&str>) -> AppResult<Self> {
            let id = device_id.unwrap_or("Built-in");
            if id == MISSING_DEVICE {
                record(format!("open-failed {}", id));
                return Err(AppError::AudioDevice(format!("Device not found: {}", id)));
            }
            record(format!("open {}", id));
            Ok(Self {
                device: InputDevice {
                    id: id.to_string(),
                    label: id.to_string(),
                },
            })
        }

        fn device(&self) -> &InputDevice {
            &self.device
        }

        fn read_samples(&self, out: &mut Vec<f32>) {
            out.clear();
            out.resize(SAMPLE_BUFFER_LEN, 0.5);
        }

        fn stop(self) {
            record(format!("stop {}", self.device.id));
        }
    }

    fn monitoring() -> (Monitoring<FakeCapture>, SharedState) {
        CALLS.with(|c| c.borrow_mut().clear());
        let shared = SharedState::new(Arc::new(RecordingNotifier::default()));
        let monitor = Monitor::new(shared.clone(), SmoothingSpeed::Medium);
        (Monitoring::new(monitor), shared)
    }

    /// Threshold below the fake tone, which reads 74 dB
    fn sensitive() -> Settings {
        Settings {
            threshold_db: 60,
            ..Settings::default()
        }
    }

    fn run_ticks(monitoring: &mut Monitoring<FakeCapture>, from: u64, to: u64) {
        let settings = sensitive();
        let mut samples = Vec::new();
        for now in (from..=to).step_by(16) {
            if let Some(session) = &monitoring.session {
                session.read_samples(&mut samples);
                monitoring.monitor.tick(&samples, now, &settings);
            }
        }
    }

    #[test]
    fn test_second_session_is_rejected() {
        let (mut m, _) = monitoring();
        assert_eq!(m.start(Some("USB Mic")).unwrap().device().id, "USB Mic");
        assert!(matches!(m.start(Some("Webcam")), Err(AppError::AudioDevice(_))));
        assert_eq!(m.session.as_ref().map(|s| s.device().id.as_str()), Some("USB Mic"));
        assert_eq!(calls(), vec!["open USB Mic"]);
    }

    #[test]
    fn test_switch_stops_before_starting() {
        let (mut m, _) = monitoring();
        m.start(Some("Built-in")).unwrap();
        run_ticks(&mut m, 0, 500);
        assert!(!m.monitor.history().is_empty());

        m.switch("USB Mic", 600).unwrap();
        assert_eq!(calls(), vec!["open Built-in", "stop Built-in", "open USB Mic"]);
        assert!(m.monitor.history().is_empty());
    }

    #[test]
    fn test_failed_start_leaves_pipeline_untouched() {
        let (mut m, _) = monitoring();
        m.start(Some("Built-in")).unwrap();
        run_ticks(&mut m, 0, 1000);
        m.stop(1000);

        let history = m.monitor.history().to_vec();
        let phase = m.monitor.phase(1000);
        assert!(m.start(Some(MISSING_DEVICE)).is_err());
        assert!(m.session.is_none());
        assert_eq!(m.monitor.history().to_vec(), history);
        assert_eq!(m.monitor.phase(1000), phase);
    }

    #[test]
    fn test_failed_switch_leaves_monitoring_off() {
        let (mut m, _) = monitoring();
        m.start(Some("Built-in")).unwrap();
        assert!(m.switch(MISSING_DEVICE, 100).is_err());
        assert!(m.session.is_none());
        assert_eq!(
            calls(),
            vec!["open Built-in", "stop Built-in", "open-failed no-such-device"]
        );
    }

    #[tokio::test]
    async fn test_shutdown_export_includes_pending_event() {
        let (mut m, shared) = monitoring();
        m.start(None).unwrap();
        run_ticks(&mut m, 0, 2100);
        assert_eq!(m.monitor.phase(2100), DetectorPhase::Finalizing);

        let path = std::env::temp_dir()
            .join("loudwatch-tests")
            .join(format!("{}.csv", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        shutdown(&mut m, &shared, 2100, Some(path.as_path())).await.unwrap();

        let csv = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].ends_with(",74,\"Busy Restaurant\""));
        assert!(m.session.is_none());
        assert_eq!(calls(), vec!["open Built-in", "stop Built-in"]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_duration_steps_stay_on_grid() {
        let mut duration = 2.0;
        for _ in 0..15 {
            duration = step_duration(duration, 0.1);
        }
        assert_eq!(duration, 3.5);
        for _ in 0..30 {
            duration = step_duration(duration, -0.1);
        }
        assert_eq!(duration, 0.5);
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_key_bindings() {
        assert_eq!(action_for(press(KeyCode::Esc)), Some(Action::Quit));
        assert_eq!(action_for(press(KeyCode::Char('q'))), Some(Action::Quit));
        assert_eq!(
            action_for(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Action::Quit)
        );
        assert_eq!(action_for(press(KeyCode::Char('c'))), None);
        assert_eq!(action_for(press(KeyCode::Char('+'))), Some(Action::Threshold(1)));
        assert_eq!(action_for(press(KeyCode::Char('['))), Some(Action::Duration(-0.1)));
        assert_eq!(action_for(press(KeyCode::Char('<'))), Some(Action::Calibration(-1)));
        assert_eq!(action_for(press(KeyCode::Char('s'))), Some(Action::CycleSmoothing));
        assert_eq!(action_for(press(KeyCode::Char('d'))), Some(Action::NextDevice));
        assert_eq!(action_for(press(KeyCode::Char('p'))), Some(Action::ToggleMonitoring));
        assert_eq!(action_for(press(KeyCode::Char('e'))), Some(Action::Export));
    }

    #[test]
    fn test_key_release_is_ignored() {
        let mut key = press(KeyCode::Char('q'));
        key.kind = KeyEventKind::Release;
        assert_eq!(action_for(key), None);
    }

    #[test]
    fn test_export_path_is_csv() {
        let path = default_export_path();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("csv"));
    }
}
