use std::collections::BTreeSet;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crossterm::event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::engine::Engine;
use crate::layer::{Keymap, Position};

/// Wall-clock source for the engine's timestamps and deadlines.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Hand-advanced clock for tests. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<SystemTime>>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Unified event type consumed by the runner
#[derive(Clone, Debug)]
pub enum EngineEvent {
    Key {
        key: String,
        ctrl: bool,
        alt: bool,
        meta: bool,
    },
    CompositionStart,
    CompositionUpdate(String),
    CompositionEnd(String),
    /// A space seen on the raw-input channel rather than as a key event.
    RawSpace,
    Matrix {
        pressed: BTreeSet<Position>,
        keymap: Arc<Keymap>,
    },
    Focus(bool),
    Resize,
    Tick,
}

impl EngineEvent {
    pub fn key(key: impl Into<String>) -> Self {
        EngineEvent::Key {
            key: key.into(),
            ctrl: false,
            alt: false,
            meta: false,
        }
    }
}

/// Translate a crossterm key press into the DOM-style key names the engine
/// classifies. Releases and repeats map to `None`.
pub fn key_event_from_crossterm(key: KeyEvent) -> Option<EngineEvent> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    let name = match key.code {
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Backspace => "Backspace".to_string(),
        KeyCode::Enter => "Enter".to_string(),
        KeyCode::Tab => "Tab".to_string(),
        KeyCode::Esc => "Escape".to_string(),
        _ => "Unidentified".to_string(),
    };
    Some(EngineEvent::Key {
        key: name,
        ctrl: key.modifiers.contains(KeyModifiers::CONTROL),
        alt: key.modifiers.contains(KeyModifiers::ALT),
        meta: key.modifiers.intersects(KeyModifiers::SUPER | KeyModifiers::META),
    })
}

/// Source of front-end events (keyboard, resize, etc.)
pub trait EngineEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<EngineEvent, RecvTimeoutError>;
}

/// Send `Tick` on `tx` every `interval` until the receiver goes away, so
/// timers keep firing while input arrives faster than the runner timeout.
pub fn spawn_ticks(tx: Sender<EngineEvent>, interval: Duration) {
    std::thread::spawn(move || loop {
        if tx.send(EngineEvent::Tick).is_err() {
            break;
        }
        std::thread::sleep(interval);
    });
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<EngineEvent>,
}

impl CrosstermEventSource {
    /// Terminal events interleaved with a `Tick` every `tick_every`.
    pub fn new(tick_every: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        spawn_ticks(tx.clone(), tick_every);

        std::thread::spawn(move || loop {
            let ev = match event::read() {
                Ok(CtEvent::Key(key)) => key_event_from_crossterm(key),
                Ok(CtEvent::Resize(_, _)) => Some(EngineEvent::Resize),
                Ok(CtEvent::FocusGained) => Some(EngineEvent::Focus(true)),
                Ok(CtEvent::FocusLost) => Some(EngineEvent::Focus(false)),
                Ok(_) => None,
                Err(_) => break,
            };
            if let Some(ev) = ev {
                if tx.send(ev).is_err() {
                    break;
                }
            }
        });

        Self { rx }
    }
}

impl EngineEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<EngineEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<EngineEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<EngineEvent>) -> Self {
        Self { rx }
    }
}

impl EngineEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<EngineEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the application one event/tick at a time
pub struct Runner<E: EngineEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: EngineEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> EngineEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                EngineEvent::Tick
            }
        }
    }
}

/// Route one event into the engine. `Resize` is a front-end concern and is
/// ignored here.
pub fn dispatch(engine: &mut Engine, event: EngineEvent) {
    match event {
        EngineEvent::Key {
            key,
            ctrl,
            alt,
            meta,
        } => engine.process_key_event(&key, ctrl, alt, meta),
        EngineEvent::CompositionStart => engine.process_composition_start(),
        EngineEvent::CompositionUpdate(data) => engine.process_composition_update(&data),
        EngineEvent::CompositionEnd(data) => engine.process_composition_end(&data),
        EngineEvent::RawSpace => engine.process_raw_space(),
        EngineEvent::Matrix { pressed, keymap } => engine.process_matrix_frame(&pressed, &keymap),
        EngineEvent::Focus(focused) => engine.set_window_focused(focused),
        EngineEvent::Tick => engine.poll(),
        EngineEvent::Resize => {}
    }
}
