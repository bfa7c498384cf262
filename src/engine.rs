//! The typing-test engine: owns the current [`TestState`] snapshot, gates
//! incoming events, drives the countdown and one-second timers, and applies
//! word generation that finishes on worker threads.
//!
//! Every command is a short synchronous handler. Work that may be slow
//! (language loading, word generation) runs on a worker thread and reports
//! back over a channel; [`Engine::poll`] applies whatever has arrived.
//! Each regeneration bumps a sequence counter, and a completion is applied
//! only while its captured sequence value is still the newest.

use std::collections::BTreeSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use log::{debug, info, trace, warn};

use crate::config::{EnginePolicy, Preferences, TestConfig};
use crate::error::EngineError;
use crate::language::{quote_to_words, Quote, WordSource};
use crate::layer::{resolve_effective_layer, Keymap, Position};
use crate::metrics;
use crate::result::{build_result, elapsed_ms, TestResult};
use crate::runtime::Clock;
use crate::session::{Status, TestState};
use crate::typing_policy::{
    append_input, apply_backspace, apply_composition_end, apply_composition_start,
    apply_composition_update, apply_submit, apply_tick, classify_key, transition, EventKind,
    KeyClass,
};

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

/// Words (and the quote they came from) for a fresh run.
#[derive(Debug)]
struct Seed {
    words: Vec<String>,
    quote: Option<Quote>,
}

#[derive(Debug)]
enum LanguageOutcome {
    Loaded(Result<Seed, EngineError>),
    Failed(EngineError),
}

#[derive(Debug)]
enum Completion {
    Words {
        seq: u64,
        outcome: Result<Seed, EngineError>,
    },
    Language {
        seq: u64,
        lang_seq: u64,
        language: String,
        outcome: LanguageOutcome,
    },
}

/// Resolves once the engine has applied (or given up on) a language switch.
///
/// The value is the requested language on success, the default language on
/// failure, or whatever language was current when a newer request
/// superseded this one. It can be taken once.
#[derive(Debug)]
pub struct LanguageHandle {
    rx: Receiver<String>,
}

impl LanguageHandle {
    /// The resolved language, if the engine has applied the switch.
    pub fn resolved(&self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

fn generate(
    source: &dyn WordSource,
    config: &TestConfig,
    language: &str,
    policy: &EnginePolicy,
) -> Result<Seed, EngineError> {
    match config {
        TestConfig::Words { word_count, .. } => Ok(Seed {
            words: source.generate_words(*word_count, config.options(), language)?,
            quote: None,
        }),
        TestConfig::Time { .. } => Ok(Seed {
            words: source.generate_words(
                policy.time_mode_initial_words,
                config.options(),
                language,
            )?,
            quote: None,
        }),
        TestConfig::Quote { quote_length } => {
            let quote = source.select_quote(*quote_length, language)?;
            Ok(Seed {
                words: quote_to_words(&quote),
                quote: Some(quote),
            })
        }
    }
}

pub struct Engine {
    source: Arc<dyn WordSource>,
    clock: Arc<dyn Clock>,
    policy: EnginePolicy,

    state: TestState,
    config: TestConfig,
    language: String,
    language_loading: bool,

    base_layer: u8,
    effective_layer: u8,
    window_focused: bool,
    composing: bool,

    seq: u64,
    lang_seq: u64,
    in_flight: usize,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    language_waiters: Vec<(u64, Sender<String>)>,

    countdown_deadline: Option<SystemTime>,
    next_snapshot_at: Option<SystemTime>,
    last_submit_at: Option<SystemTime>,
}

impl Engine {
    /// Build an engine from stored preferences. The starting language is
    /// loaded synchronously, falling back to the policy default.
    pub fn new(source: Arc<dyn WordSource>, clock: Arc<dyn Clock>, prefs: &Preferences) -> Self {
        let (tx, rx) = mpsc::channel();
        let mut engine = Self {
            source,
            clock,
            policy: prefs.policy.clone(),
            state: TestState::new(Vec::new(), None),
            config: prefs.test.clone(),
            language: prefs.language.clone(),
            language_loading: false,
            base_layer: 0,
            effective_layer: 0,
            window_focused: true,
            composing: false,
            seq: 0,
            lang_seq: 0,
            in_flight: 0,
            tx,
            rx,
            language_waiters: Vec::new(),
            countdown_deadline: None,
            next_snapshot_at: None,
            last_submit_at: None,
        };

        match engine.source.load_language(&engine.language) {
            Ok(()) => match engine.generate_now() {
                Ok(seed) => engine.install(TestState::new(seed.words, seed.quote)),
                Err(e) => warn!("unable to generate words for `{}`: {e}", engine.language),
            },
            Err(e) => {
                warn!("unable to load language `{}`: {e}", engine.language);
                engine.fall_back_to_default();
            }
        }
        engine
    }

    // --- accessors ---

    pub fn state(&self) -> &TestState {
        &self.state
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn is_language_loading(&self) -> bool {
        self.language_loading
    }

    pub fn base_layer(&self) -> u8 {
        self.base_layer
    }

    pub fn effective_layer(&self) -> u8 {
        self.effective_layer
    }

    pub fn window_focused(&self) -> bool {
        self.window_focused
    }

    fn elapsed_ms(&self) -> f64 {
        let end = self.state.end_time.unwrap_or_else(|| self.clock.now());
        elapsed_ms(self.state.start_time, end)
    }

    /// Live WPM from correct characters over elapsed time.
    pub fn wpm(&self) -> f64 {
        metrics::raw_wpm(self.state.correct_chars, self.elapsed_ms())
    }

    pub fn accuracy(&self) -> f64 {
        metrics::accuracy(self.state.correct_chars, self.state.incorrect_chars)
    }

    /// Whole seconds since the run started, frozen once it finishes.
    pub fn elapsed_seconds(&self) -> u64 {
        (self.elapsed_ms() / 1000.0).floor() as u64
    }

    /// Seconds left in a timed test; `None` outside time mode.
    pub fn remaining_seconds(&self) -> Option<u64> {
        self.config
            .duration_secs()
            .map(|duration| duration.saturating_sub(self.elapsed_seconds()))
    }

    /// Time left before a pending countdown lets input through.
    pub fn countdown_remaining(&self) -> Option<Duration> {
        self.countdown_deadline
            .map(|deadline| deadline.duration_since(self.clock.now()).unwrap_or_default())
    }

    pub fn result(&self) -> Option<TestResult> {
        self.state
            .has_finished()
            .then(|| build_result(&self.state, &self.config, &self.language, self.clock.now()))
    }

    // --- input ---

    /// Scoring input fires due timers first, so a timed test that has run
    /// out drops the key and snapshots never see later keystrokes.
    pub fn process_key_event(&mut self, key: &str, ctrl: bool, alt: bool, meta: bool) {
        self.tick();
        if !self.window_focused {
            trace!("dropping key `{key}`: window not focused");
            return;
        }
        let class = classify_key(key, ctrl, alt, meta);
        let kind = match class {
            KeyClass::Char(_) => EventKind::Char,
            KeyClass::Submit => EventKind::Submit,
            KeyClass::Backspace => EventKind::Backspace,
            KeyClass::Ignored => {
                trace!("ignoring key `{key}` (ctrl={ctrl} alt={alt} meta={meta})");
                return;
            }
        };
        if !self.accepts(kind) {
            return;
        }

        let now = self.clock.now();
        match class {
            KeyClass::Char(c) => {
                let next = append_input(&self.state, &c.to_string(), self.auto_finish(), now);
                self.publish(next);
            }
            KeyClass::Submit => self.submit(now),
            KeyClass::Backspace => {
                if let Some(next) = apply_backspace(&self.state) {
                    self.publish(next);
                }
            }
            KeyClass::Ignored => {}
        }
    }

    pub fn process_composition_start(&mut self) {
        if !self.window_focused || !self.accepts(EventKind::CompositionStart) {
            return;
        }
        self.composing = true;
        let next = apply_composition_start(&self.state);
        self.publish(next);
    }

    pub fn process_composition_update(&mut self, data: &str) {
        if !self.window_focused || !self.accepts(EventKind::CompositionUpdate) {
            return;
        }
        let next = apply_composition_update(&self.state, data);
        self.publish(next);
    }

    pub fn process_composition_end(&mut self, data: &str) {
        self.tick();
        self.composing = false;
        let kind = if data.is_empty() {
            EventKind::CompositionCancel
        } else {
            EventKind::CompositionCommit
        };
        if !self.window_focused || !self.accepts(kind) {
            return;
        }
        let next = apply_composition_end(&self.state, data, self.auto_finish(), self.clock.now());
        self.publish(next);
    }

    /// A space delivered through the raw text channel by IMEs that swallow
    /// the key event. Dropped while composing or when a submit was accepted
    /// within the guard window.
    pub fn process_raw_space(&mut self) {
        self.tick();
        if !self.window_focused {
            return;
        }
        if self.composing {
            trace!("dropping raw space during composition");
            return;
        }
        let now = self.clock.now();
        let guard = Duration::from_millis(self.policy.raw_space_guard_ms);
        if let Some(last) = self.last_submit_at {
            if now.duration_since(last).map_or(true, |since| since < guard) {
                trace!("dropping raw space inside the duplicate guard");
                return;
            }
        }
        if self.accepts(EventKind::Submit) {
            self.submit(now);
        }
    }

    /// Recompute the effective layer. Never touches the test state.
    pub fn process_matrix_frame(&mut self, pressed: &BTreeSet<Position>, keymap: &Keymap) {
        let layer = resolve_effective_layer(pressed, keymap, self.base_layer);
        if layer != self.effective_layer {
            trace!("effective layer {} -> {layer}", self.effective_layer);
            self.effective_layer = layer;
        }
    }

    // --- commands ---

    pub fn restart(&mut self) {
        let status = transition(self.state.status, EventKind::Restart).unwrap_or(Status::Waiting);
        debug!("restart");
        self.reseed(status, true);
    }

    pub fn restart_with_countdown(&mut self) {
        let status = transition(self.state.status, EventKind::RestartWithCountdown)
            .unwrap_or(Status::Countdown);
        debug!("restart with {}ms countdown", self.policy.countdown_ms);
        self.reseed(status, true);
    }

    pub fn set_config(&mut self, config: TestConfig) {
        debug!("config -> {config:?}");
        self.config = config;
        self.reseed(Status::Waiting, false);
    }

    pub fn set_base_layer(&mut self, layer: u8) {
        debug!("base layer -> {layer}");
        self.base_layer = layer;
        self.effective_layer = layer;
        self.reseed(Status::Waiting, false);
    }

    pub fn set_window_focused(&mut self, focused: bool) {
        self.window_focused = focused;
    }

    /// Switch languages on a worker thread. The previous words stay in place
    /// until the new list arrives.
    pub fn set_language(&mut self, language: &str) -> LanguageHandle {
        self.lang_seq += 1;
        self.seq += 1;
        self.language_loading = true;
        self.countdown_deadline = None;
        self.install(self.reused(Status::Waiting));

        let (waiter, rx) = mpsc::channel();
        self.language_waiters.push((self.lang_seq, waiter));

        let (seq, lang_seq) = (self.seq, self.lang_seq);
        let language = language.to_string();
        let source = Arc::clone(&self.source);
        let config = self.config.clone();
        let policy = self.policy.clone();
        let tx = self.tx.clone();
        self.in_flight += 1;
        debug!("loading language `{language}` (seq {seq})");
        std::thread::spawn(move || {
            let outcome = match source.load_language(&language) {
                Ok(()) => LanguageOutcome::Loaded(generate(&*source, &config, &language, &policy)),
                Err(e) => LanguageOutcome::Failed(e),
            };
            let _ = tx.send(Completion::Language {
                seq,
                lang_seq,
                language,
                outcome,
            });
        });

        LanguageHandle { rx }
    }

    // --- timers and completions ---

    /// Fire any timers that are due: the countdown and the one-second
    /// snapshots of a running test.
    pub fn tick(&mut self) {
        let now = self.clock.now();

        if let Some(deadline) = self.countdown_deadline {
            if now >= deadline {
                self.countdown_deadline = None;
                if let Some(status) = transition(self.state.status, EventKind::CountdownElapsed) {
                    debug!("countdown elapsed");
                    let mut next = self.state.clone();
                    next.status = status;
                    self.publish(next);
                }
            }
        }

        while let Some(at) = self.next_snapshot_at {
            if at > now || !self.accepts(EventKind::Tick) {
                break;
            }
            self.next_snapshot_at = Some(at + SNAPSHOT_INTERVAL);
            let next = apply_tick(
                &self.state,
                at,
                self.policy.wpm_history_cap,
                self.config.duration_secs(),
            );
            if next.has_finished() {
                debug!("time is up");
            }
            self.publish(next);
        }
    }

    /// Apply finished background work, then fire due timers.
    pub fn poll(&mut self) {
        while let Ok(completion) = self.rx.try_recv() {
            self.complete(completion);
        }
        self.tick();
    }

    /// Block until every dispatched job has reported back or `timeout`
    /// passes. Returns whether nothing is left in flight.
    pub fn settle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight > 0 {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(left) {
                Ok(completion) => self.complete(completion),
                Err(_) => break,
            }
        }
        self.in_flight == 0
    }

    // --- internals ---

    fn accepts(&self, kind: EventKind) -> bool {
        let allowed = transition(self.state.status, kind).is_some();
        if !allowed {
            trace!("dropping {kind:?} while {}", self.state.status);
        }
        allowed
    }

    fn auto_finish(&self) -> bool {
        !self.config.is_time()
    }

    fn submit(&mut self, now: SystemTime) {
        let mut next = apply_submit(&self.state, !self.config.is_time(), now);
        self.last_submit_at = Some(now);

        if self.config.is_time() && next.remaining_words() < self.policy.low_water_mark {
            match self.source.generate_words(
                self.policy.extension_batch,
                self.config.options(),
                &self.language,
            ) {
                Ok(more) => {
                    debug!("extending word list by {}", more.len());
                    next.words.extend(more);
                }
                Err(e) => warn!("unable to extend word list: {e}"),
            }
        }
        self.publish(next);
    }

    /// Swap in the next snapshot and start or stop the snapshot timer on
    /// run boundaries.
    fn publish(&mut self, next: TestState) {
        let before = self.state.status;
        if before != Status::Running && next.status == Status::Running {
            debug!("run started");
            self.next_snapshot_at = next.start_time.map(|t| t + SNAPSHOT_INTERVAL);
        }
        if before != Status::Finished && next.status == Status::Finished {
            debug!(
                "run finished: {} correct, {} incorrect",
                next.correct_chars, next.incorrect_chars
            );
            self.next_snapshot_at = None;
        }
        self.state = next;
    }

    /// Replace the state wholesale, clearing every run-scoped timer.
    fn install(&mut self, state: TestState) {
        self.next_snapshot_at = None;
        self.last_submit_at = None;
        self.composing = false;
        if state.status != Status::Countdown {
            self.countdown_deadline = None;
        }
        self.state = state;
    }

    fn reused(&self, status: Status) -> TestState {
        TestState::with_status(
            status,
            self.state.words.clone(),
            self.state.current_quote.clone(),
        )
    }

    fn generate_now(&self) -> Result<Seed, EngineError> {
        generate(&*self.source, &self.config, &self.language, &self.policy)
    }

    /// Start a new run in `status`. Regenerates in place when `prefer_sync`
    /// and the language is resident, otherwise reuses the current words and
    /// replaces them from a worker.
    fn reseed(&mut self, status: Status, prefer_sync: bool) {
        self.seq += 1;
        self.countdown_deadline = (status == Status::Countdown)
            .then(|| self.clock.now() + Duration::from_millis(self.policy.countdown_ms));

        if prefer_sync && self.source.is_loaded(&self.language) {
            match self.generate_now() {
                Ok(seed) => {
                    self.install(TestState::with_status(status, seed.words, seed.quote));
                    return;
                }
                Err(e) => {
                    warn!("unable to generate words: {e}");
                    self.install(self.reused(status));
                    return;
                }
            }
        }

        self.install(self.reused(status));
        self.spawn_words();
    }

    fn spawn_words(&mut self) {
        let seq = self.seq;
        let source = Arc::clone(&self.source);
        let config = self.config.clone();
        let language = self.language.clone();
        let policy = self.policy.clone();
        let tx = self.tx.clone();
        self.in_flight += 1;
        trace!("generating words (seq {seq})");
        std::thread::spawn(move || {
            let outcome = generate(&*source, &config, &language, &policy);
            let _ = tx.send(Completion::Words { seq, outcome });
        });
    }

    /// Status a freshly generated list lands in: a pending countdown keeps
    /// counting, anything else starts over in `Waiting`.
    fn landing_status(&self) -> Status {
        match self.state.status {
            Status::Countdown => Status::Countdown,
            _ => Status::Waiting,
        }
    }

    fn complete(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match completion {
            Completion::Words { seq, outcome } => {
                if seq != self.seq {
                    debug!("discarding stale word list (seq {seq}, current {})", self.seq);
                    return;
                }
                match outcome {
                    Ok(seed) => {
                        let status = self.landing_status();
                        self.install(TestState::with_status(status, seed.words, seed.quote));
                    }
                    Err(e) => warn!("unable to generate words: {e}"),
                }
            }
            Completion::Language {
                seq,
                lang_seq,
                language,
                outcome,
            } => {
                let resolved = self.complete_language(seq, lang_seq, language, outcome);
                self.language_waiters.retain(|(waiting_for, waiter)| {
                    if *waiting_for == lang_seq {
                        let _ = waiter.send(resolved.clone());
                        false
                    } else {
                        true
                    }
                });
            }
        }
    }

    fn complete_language(
        &mut self,
        seq: u64,
        lang_seq: u64,
        language: String,
        outcome: LanguageOutcome,
    ) -> String {
        if lang_seq != self.lang_seq {
            debug!("discarding superseded language load `{language}`");
            return self.language.clone();
        }
        self.language_loading = false;

        match outcome {
            LanguageOutcome::Failed(e) => {
                warn!("unable to load language `{language}`: {e}");
                self.fall_back_to_default();
            }
            LanguageOutcome::Loaded(seed) => {
                let seed = if seq == self.seq {
                    seed
                } else {
                    // A newer rebuild was generated for the old language.
                    self.seq += 1;
                    generate(&*self.source, &self.config, &language, &self.policy)
                };
                match seed {
                    Ok(seed) => {
                        info!("language switched to `{language}`");
                        self.language = language;
                        let status = self.landing_status();
                        self.install(TestState::with_status(status, seed.words, seed.quote));
                    }
                    Err(e) => {
                        warn!("unable to generate words for `{language}`: {e}");
                        self.fall_back_to_default();
                    }
                }
            }
        }
        self.language.clone()
    }

    /// Switch to the default language and rebuild synchronously.
    fn fall_back_to_default(&mut self) {
        let fallback = self.policy.default_language.clone();
        warn!("falling back to `{fallback}`");
        self.language = fallback;
        self.seq += 1;
        self.countdown_deadline = None;

        let seeded = self
            .source
            .load_language(&self.language)
            .and_then(|()| self.generate_now());
        match seeded {
            Ok(seed) => self.install(TestState::new(seed.words, seed.quote)),
            Err(e) => {
                warn!("default language `{}` unusable: {e}", self.language);
                self.install(self.reused(Status::Waiting));
            }
        }
    }
}
