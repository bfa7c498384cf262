pub mod charting;

use itertools::Itertools;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Axis, Chart, Dataset, GraphType, Paragraph, Widget, Wrap},
};

use keytest::{session::Status, TestState};

use crate::App;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;
/// Upcoming words shown past the cursor; time mode keeps far more in memory.
const LOOKAHEAD_WORDS: usize = 40;

struct Styles {
    bold: Style,
    correct: Style,
    incorrect: Style,
    pending: Style,
    cursor: Style,
    composing: Style,
}

impl Default for Styles {
    fn default() -> Self {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let pending = bold.add_modifier(Modifier::DIM);
        Self {
            bold,
            correct: bold.fg(Color::Green),
            incorrect: bold.fg(Color::Red),
            pending,
            cursor: pending.add_modifier(Modifier::UNDERLINED),
            composing: Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::ITALIC),
        }
    }
}

/// Spans for the word being typed: typed characters coloured by position,
/// the live IME buffer, then what is left of the target.
fn current_word_spans<'a>(state: &'a TestState, word: &'a str, styles: &Styles) -> Vec<Span<'a>> {
    let target: Vec<char> = word.chars().collect();
    let mut spans: Vec<Span> = state
        .current_input
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let style = if target.get(i) == Some(&c) {
                styles.correct
            } else {
                styles.incorrect
            };
            Span::styled(c.to_string(), style)
        })
        .collect();

    if !state.composition_text.is_empty() {
        spans.push(Span::styled(
            state.composition_text.as_str(),
            styles.composing,
        ));
    }

    let typed = state.current_input.chars().count();
    let mut rest = target.iter().skip(typed);
    if let Some(next) = rest.next() {
        spans.push(Span::styled(next.to_string(), styles.cursor));
        spans.push(Span::styled(rest.collect::<String>(), styles.pending));
    }
    spans
}

fn word_spans<'a>(state: &'a TestState, styles: &Styles) -> Vec<Span<'a>> {
    let done = state.word_results.iter().map(|r| {
        let style = if r.correct {
            styles.correct
        } else {
            styles.incorrect
        };
        vec![Span::styled(r.word.as_str(), style)]
    });

    let current = state
        .current_word()
        .map(|word| current_word_spans(state, word, styles));

    let upcoming = state
        .words
        .iter()
        .skip(state.current_word_index + 1)
        .take(LOOKAHEAD_WORDS)
        .map(|w| vec![Span::styled(w.as_str(), styles.pending)]);

    Itertools::intersperse(done.chain(current).chain(upcoming), vec![Span::raw(" ")])
        .flatten()
        .collect()
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let engine = &self.engine;
        let state = engine.state();
        let styles = Styles::default();

        match state.status {
            Status::Countdown => {
                let secs = engine
                    .countdown_remaining()
                    .map_or(0, |left| left.as_secs() + u64::from(left.subsec_nanos() > 0));
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([
                        Constraint::Percentage(45),
                        Constraint::Length(1),
                        Constraint::Min(0),
                    ])
                    .split(area);
                Paragraph::new(Span::styled(format!("starting in {secs}"), styles.bold))
                    .alignment(Alignment::Center)
                    .render(chunks[1], buf);
            }
            Status::Waiting | Status::Running => {
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .horizontal_margin(HORIZONTAL_MARGIN)
                    .vertical_margin(VERTICAL_MARGIN)
                    .constraints([
                        Constraint::Percentage(30),
                        Constraint::Length(1),
                        Constraint::Length(1),
                        Constraint::Min(1),
                        Constraint::Length(1),
                    ])
                    .split(area);

                let progress = match engine.remaining_seconds() {
                    Some(left) => format!("{left}s"),
                    None => format!("{}/{}", state.current_word_index, state.words.len()),
                };
                let mut stats = format!(
                    "{progress}   {} wpm   {}% acc",
                    engine.wpm(),
                    engine.accuracy()
                );
                if engine.is_language_loading() {
                    stats.push_str("   loading…");
                }
                Paragraph::new(Span::styled(stats, styles.pending))
                    .alignment(Alignment::Center)
                    .render(chunks[1], buf);

                Paragraph::new(Line::from(word_spans(state, &styles)))
                    .wrap(Wrap { trim: true })
                    .render(chunks[3], buf);

                Paragraph::new(Span::styled(
                    format!(
                        "{} {}   {}   layer {}",
                        engine.config().mode(),
                        engine.config().mode2(),
                        engine.language(),
                        engine.effective_layer()
                    ),
                    Style::default().add_modifier(Modifier::ITALIC),
                ))
                .alignment(Alignment::Center)
                .render(chunks[4], buf);
            }
            Status::Finished => {
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .horizontal_margin(HORIZONTAL_MARGIN)
                    .vertical_margin(VERTICAL_MARGIN)
                    .constraints([
                        Constraint::Min(1),    // chart
                        Constraint::Length(1), // stats
                        Constraint::Length(1), // personal best
                        Constraint::Length(1), // padding
                        Constraint::Length(1), // legend
                    ])
                    .split(area);

                let Some((result, personal_best)) = &self.last_result else {
                    return;
                };

                let points = charting::wpm_points(&result.wpm_history);
                let (overall_duration, highest_wpm) = charting::compute_chart_params(&points);
                let datasets = vec![Dataset::default()
                    .marker(ratatui::symbols::Marker::Braille)
                    .style(Style::default().fg(Color::Magenta))
                    .graph_type(GraphType::Line)
                    .data(&points)];

                Chart::new(datasets)
                    .x_axis(
                        Axis::default()
                            .title("seconds")
                            .bounds([1.0, overall_duration])
                            .labels(vec![
                                Span::styled("1", styles.bold),
                                Span::styled(
                                    charting::format_label(overall_duration),
                                    styles.bold,
                                ),
                            ]),
                    )
                    .y_axis(
                        Axis::default()
                            .title("wpm")
                            .bounds([0.0, highest_wpm])
                            .labels(vec![
                                Span::styled("0", styles.bold),
                                Span::styled(charting::format_label(highest_wpm), styles.bold),
                            ]),
                    )
                    .render(chunks[0], buf);

                Paragraph::new(Span::styled(
                    format!(
                        "{} wpm   {} raw   {}% acc   {}% consistency   {:.1}s",
                        result.wpm,
                        result.raw_wpm,
                        result.accuracy,
                        result.consistency,
                        result.test_duration_secs
                    ),
                    styles.bold,
                ))
                .alignment(Alignment::Center)
                .render(chunks[1], buf);

                if *personal_best {
                    Paragraph::new(Span::styled(
                        "new personal best",
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::ITALIC),
                    ))
                    .alignment(Alignment::Center)
                    .render(chunks[2], buf);
                }

                Paragraph::new(Span::styled(
                    "(tab) retry / (ctrl+r) countdown / (l)anguage / (p)unctuation / (n)umbers / (esc)ape",
                    Style::default().add_modifier(Modifier::ITALIC),
                ))
                .render(chunks[4], buf);
            }
        }
    }
}
