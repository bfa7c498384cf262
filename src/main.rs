mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{DisableFocusChange, EnableFocusChange},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use keytest::{
    config::{ConfigStore, FileConfigStore, Preferences, QuoteLength, TestConfig},
    engine::Engine,
    language::{available_languages, BundledWordSource},
    metrics::{is_personal_best, trim_results},
    result::TestResult,
    runtime::{
        dispatch, CrosstermEventSource, EngineEvent, EngineEventSource, FixedTicker, Runner,
        SystemClock, Ticker,
    },
};
use log::info;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    sync::Arc,
    time::Duration,
};

const TICK_RATE_MS: u64 = 100;
const HISTORY_LIMIT: usize = 50;

/// typing speed test for the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A typing speed test with words, timed and quote modes, live WPM and accuracy, and a WPM chart of every run."
)]
pub struct Cli {
    /// number of words to use in test
    #[clap(short = 'w', long, conflicts_with_all = ["time", "quote"])]
    words: Option<usize>,

    /// number of seconds to run test
    #[clap(short = 's', long, conflicts_with = "quote")]
    time: Option<u64>,

    /// type a quote of the given length instead of random words
    #[clap(short = 'q', long, value_enum)]
    quote: Option<QuoteLength>,

    /// language to pull words from
    #[clap(short = 'l', long)]
    language: Option<String>,

    /// add capitalisation and punctuation to generated words
    #[clap(long)]
    punctuation: bool,

    /// mix numbers into generated words
    #[clap(long)]
    numbers: bool,

    /// count down before each test
    #[clap(long)]
    countdown: bool,

    /// store these settings as the new defaults
    #[clap(long)]
    save: bool,
}

impl Cli {
    /// Overlay the command line on stored preferences.
    fn apply(&self, mut prefs: Preferences) -> Preferences {
        let stored = prefs.test.options();
        let punctuation = self.punctuation || stored.punctuation;
        let numbers = self.numbers || stored.numbers;

        prefs.test = match (&self.quote, &self.time, &self.words, &prefs.test) {
            (Some(quote_length), _, _, _) => TestConfig::Quote {
                quote_length: *quote_length,
            },
            (None, Some(duration), _, _) | (None, None, None, TestConfig::Time { duration, .. }) => {
                TestConfig::Time {
                    duration: *duration,
                    punctuation,
                    numbers,
                }
            }
            (None, None, Some(word_count), _)
            | (None, None, None, TestConfig::Words { word_count, .. }) => TestConfig::Words {
                word_count: *word_count,
                punctuation,
                numbers,
            },
            (None, None, None, TestConfig::Quote { .. }) => prefs.test.clone(),
        };
        if let Some(language) = &self.language {
            prefs.language = language.clone();
        }
        prefs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    pub engine: Engine,
    /// Finished runs of this session, newest first.
    pub history: Vec<TestResult>,
    pub last_result: Option<(TestResult, bool)>,
    pub countdown: bool,
}

impl App {
    pub fn new(engine: Engine, countdown: bool) -> Self {
        Self {
            engine,
            history: Vec::new(),
            last_result: None,
            countdown,
        }
    }

    pub fn restart(&mut self, countdown: bool) {
        if countdown {
            self.engine.restart_with_countdown();
        } else {
            self.engine.restart();
        }
        self.last_result = None;
    }

    pub fn handle(&mut self, event: EngineEvent) -> Flow {
        if let EngineEvent::Key { key, ctrl, .. } = &event {
            match (key.as_str(), *ctrl) {
                ("Escape", _) | ("c", true) => return Flow::Quit,
                ("Tab", _) => {
                    self.restart(self.countdown);
                    return Flow::Continue;
                }
                ("r", true) => {
                    self.restart(true);
                    return Flow::Continue;
                }
                _ => {}
            }
        }

        if self.engine.state().has_finished() {
            if let EngineEvent::Key {
                key,
                ctrl: false,
                alt: false,
                meta: false,
            } = &event
            {
                match key.as_str() {
                    "l" => self.next_language(),
                    "p" | "n" => self.toggle_option(key == "p"),
                    _ => {}
                }
                return Flow::Continue;
            }
        }

        dispatch(&mut self.engine, event);
        self.record_if_finished();
        Flow::Continue
    }

    fn next_language(&mut self) {
        let languages = available_languages();
        let next = languages
            .iter()
            .position(|l| l == self.engine.language())
            .map_or(0, |i| (i + 1) % languages.len());
        if let Some(language) = languages.get(next) {
            // the binary only reads the outcome through `Engine::language`
            let _ = self.engine.set_language(language);
            self.last_result = None;
        }
    }

    fn toggle_option(&mut self, toggle_punctuation: bool) {
        let mut config = self.engine.config().clone();
        if let TestConfig::Words {
            punctuation,
            numbers,
            ..
        }
        | TestConfig::Time {
            punctuation,
            numbers,
            ..
        } = &mut config
        {
            if toggle_punctuation {
                *punctuation = !*punctuation;
            } else {
                *numbers = !*numbers;
            }
            self.engine.set_config(config);
            self.last_result = None;
        }
    }

    fn record_if_finished(&mut self) {
        if self.last_result.is_some() {
            return;
        }
        if let Some(result) = self.engine.result() {
            let personal_best = is_personal_best(&result, &self.history);
            info!(
                "finished {} {}: {} wpm, {}% acc{}",
                result.mode,
                result.mode2,
                result.wpm,
                result.accuracy,
                if personal_best { " (personal best)" } else { "" }
            );
            self.history.insert(0, result.clone());
            trim_results(&mut self.history, HISTORY_LIMIT);
            self.last_result = Some((result, personal_best));
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("off")).init();

    let store = FileConfigStore::new();
    let prefs = cli.apply(store.load());
    if cli.save {
        store.save(&prefs)?;
        info!("saved preferences to {}", store.path().display());
    }

    let engine = Engine::new(
        Arc::new(BundledWordSource::new()),
        Arc::new(SystemClock),
        &prefs,
    );
    let mut app = App::new(engine, cli.countdown);
    if cli.countdown {
        app.restart(true);
    }

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let runner = Runner::new(
        CrosstermEventSource::new(Duration::from_millis(TICK_RATE_MS)),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let outcome = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    outcome
}

fn start_tui<B: Backend, E: EngineEventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<E, T>,
) -> Result<(), Box<dyn Error>> {
    loop {
        terminal.draw(|f| ui(app, f))?;
        if app.handle(runner.step()) == Flow::Quit {
            break;
        }
    }
    Ok(())
}

fn ui(app: &App, f: &mut Frame) {
    f.render_widget(app, f.area());
}
