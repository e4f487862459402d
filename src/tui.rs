use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use miette::IntoDiagnostic;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table, Wrap};
use ratatui::{Frame, Terminal};

use crate::app::{
    CheckResult, ClearResult, FetchResult, InfoResult, ListResult, ProgressEvent, ProgressSink,
    ProgressSinkKind, ValidateResult,
};
use crate::error::ManifestError;
use crate::validate::Severity;

const EVENTS_MAX: usize = 8;
const SPINNER: &[char] = &['|', '/', '-', '\\'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolve,
    Fetch,
    Verify,
    Store,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Resolve => "Resolve",
            Phase::Fetch => "Fetch",
            Phase::Verify => "Verify",
            Phase::Store => "Store",
        }
    }

    fn index(self) -> usize {
        match self {
            Phase::Resolve => 0,
            Phase::Fetch => 1,
            Phase::Verify => 2,
            Phase::Store => 3,
        }
    }
}

const PHASES: &[Phase] = &[Phase::Resolve, Phase::Fetch, Phase::Verify, Phase::Store];

#[derive(Debug)]
struct AppState {
    status: String,
    phase: Phase,
    latency_ms: Option<u128>,
    events: VecDeque<String>,
    started: Instant,
    request_count: u64,
}

pub struct Tui {
    kind: ProgressSinkKind,
    state: Arc<Mutex<AppState>>,
}

struct TuiProgress {
    state: Arc<Mutex<AppState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            if let Some((phase, payload)) = parse_phase(&message) {
                state.phase = phase;
                state.status = payload.to_string();
            } else if let Some(latency) = parse_latency(&message) {
                state.latency_ms = Some(latency);
            } else {
                state.status = message.clone();
            }

            if message.starts_with("manifest.request") {
                state.request_count = state.request_count.saturating_add(1);
            }

            if state.events.len() >= EVENTS_MAX {
                state.events.pop_front();
            }
            state.events.push_back(message);
        }
    }
}

impl Tui {
    pub fn new(kind: ProgressSinkKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(AppState {
                status: "ready".to_string(),
                phase: Phase::Resolve,
                latency_ms: None,
                events: VecDeque::new(),
                started: Instant::now(),
                request_count: 0,
            })),
        }
    }

    /// Runs an operation on a worker thread while drawing progress. Pressing
    /// `q` abandons the screen and aborts.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, ManifestError> + Send + 'static,
        R: Send + 'static,
    {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let kind = self.kind;
        let mut tick = 0usize;
        let outcome = loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_progress(frame, kind, &state, tick))
                    .into_diagnostic()?;
            }

            if let Ok(result) = rx.try_recv() {
                handle.join().ok();
                break result.map_err(miette::Report::new);
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if key.kind == KeyEventKind::Press && matches!(key.code, KeyCode::Char('q')) {
                        break Err(miette::Report::msg("aborted"));
                    }
                }
            }

            tick = tick.wrapping_add(1);
        };

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
        outcome
    }

    pub fn finish_validate(&mut self, result: &ValidateResult) -> miette::Result<()> {
        let header = Row::new(vec!["severity", "location", "field", "message"])
            .style(Style::default().add_modifier(Modifier::BOLD));
        let rows: Vec<Row> = result
            .issues
            .iter()
            .map(|issue| {
                let color = match issue.severity {
                    Severity::Error => Color::Red,
                    Severity::Warning => Color::Yellow,
                };
                Row::new(vec![
                    issue.severity.to_string(),
                    issue.location.clone(),
                    issue.field.clone().unwrap_or_default(),
                    issue.message.clone(),
                ])
                .style(Style::default().fg(color))
            })
            .collect();

        let title = format!(
            " {}: {} collection(s), {} channel(s), {} error(s), {} warning(s) ",
            result.manifest, result.collections, result.channels, result.errors, result.warnings
        );
        self.result_screen(title, header, rows, &[15, 25, 15, 45])
    }

    pub fn finish_list(&mut self, result: &ListResult) -> miette::Result<()> {
        let header = Row::new(vec!["id", "name", "format", "source"])
            .style(Style::default().add_modifier(Modifier::BOLD));
        let mut rows: Vec<Row> = result
            .collections
            .iter()
            .map(|entry| {
                Row::new(vec![
                    entry.id.clone(),
                    entry.name.clone(),
                    entry.format.clone(),
                    entry.source.clone(),
                ])
            })
            .collect();
        for channel in &result.channels {
            rows.push(
                Row::new(vec![
                    channel.id.clone(),
                    channel.name.clone(),
                    "channel".to_string(),
                    String::new(),
                ])
                .style(Style::default().fg(Color::Cyan)),
            );
        }

        let title = format!(
            " {} collection(s), {} channel(s) ",
            result.collections.len(),
            result.channels.len()
        );
        self.result_screen(title, header, rows, &[18, 30, 10, 42])
    }

    pub fn finish_info(&mut self, result: &InfoResult) -> miette::Result<()> {
        let mut lines = vec![
            field_line("type", &result.entry_type),
            field_line("id", &result.id),
            field_line("name", &result.name),
            field_line("description", &result.description),
        ];
        if let Some(source) = &result.source {
            lines.push(field_line("source", source));
        }
        if let Some(directory) = &result.directory {
            lines.push(field_line("directory", directory));
        }
        if let Some(base_url) = &result.base_url {
            lines.push(field_line("base_url", base_url));
        }
        if let Some(format) = &result.format {
            lines.push(field_line("format", format));
        }

        self.text_screen(format!(" {} ", result.id), lines)
    }

    pub fn finish_check(&mut self, result: &CheckResult) -> miette::Result<()> {
        let header = Row::new(vec!["id", "field", "status", "url"])
            .style(Style::default().add_modifier(Modifier::BOLD));
        let rows: Vec<Row> = result
            .probes
            .iter()
            .map(|probe| {
                let status = probe
                    .status
                    .map(|code| code.to_string())
                    .or_else(|| probe.message.clone())
                    .unwrap_or_else(|| "?".to_string());
                let color = if probe.ok { Color::Green } else { Color::Red };
                Row::new(vec![
                    probe.id.clone(),
                    probe.field.clone(),
                    status,
                    probe.url.clone(),
                ])
                .style(Style::default().fg(color))
            })
            .collect();

        let title = format!(
            " {} probe(s), {} failure(s) ",
            result.probes.len(),
            result.failures
        );
        self.result_screen(title, header, rows, &[18, 10, 12, 60])
    }

    pub fn finish_fetch(&mut self, result: &FetchResult) -> miette::Result<()> {
        let mut lines = vec![
            field_line("source", &result.source),
            field_line("action", &result.action),
            field_line("format_version", &result.format_version.to_string()),
            field_line("collections", &result.collections.to_string()),
            field_line("project", &result.project_path),
        ];
        if let Some(cache) = &result.cache_path {
            lines.push(field_line("cache", cache));
        }
        self.text_screen(" manifest fetched ".to_string(), lines)
    }

    pub fn finish_clear(&mut self, result: &ClearResult) -> miette::Result<()> {
        let status = if result.cleared { "yes" } else { "no" };
        let lines = vec![field_line("cleared", status)];
        self.text_screen(" project store cleared ".to_string(), lines)
    }

    pub fn confirm_clear(&mut self) -> miette::Result<bool> {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;

        let confirmed = loop {
            terminal
                .draw(|frame| {
                    let block = Block::default().borders(Borders::ALL).title("Confirm");
                    let text = Paragraph::new(vec![
                        Line::from("Clear project manifest store?"),
                        Line::from("Press y to confirm, n to cancel."),
                    ])
                    .alignment(Alignment::Center)
                    .block(block);
                    frame.render_widget(text, frame.area());
                })
                .into_diagnostic()?;

            if event::poll(Duration::from_millis(100)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    match key.code {
                        KeyCode::Char('y') | KeyCode::Char('Y') => break true,
                        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => break false,
                        _ => {}
                    }
                }
            }
        };

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
        Ok(confirmed)
    }

    fn result_screen(
        &mut self,
        title: String,
        header: Row<'static>,
        rows: Vec<Row<'static>>,
        widths_pct: &[u16],
    ) -> miette::Result<()> {
        let widths: Vec<Constraint> = widths_pct
            .iter()
            .map(|pct| Constraint::Percentage(*pct))
            .collect();
        self.dismissable(move |frame| {
            let area = frame.area();
            let table = Table::new(rows.clone(), widths.clone())
                .header(header.clone())
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(title.clone())
                        .title_bottom(" press q to close "),
                );
            frame.render_widget(table, area);
        })
    }

    fn text_screen(&mut self, title: String, lines: Vec<Line<'static>>) -> miette::Result<()> {
        self.dismissable(move |frame| {
            let paragraph = Paragraph::new(lines.clone())
                .wrap(Wrap { trim: false })
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(title.clone())
                        .title_bottom(" press q to close "),
                );
            frame.render_widget(paragraph, frame.area());
        })
    }

    fn dismissable<F>(&mut self, mut draw: F) -> miette::Result<()>
    where
        F: FnMut(&mut Frame<'_>),
    {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        loop {
            terminal.draw(&mut draw).into_diagnostic()?;
            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if key.kind == KeyEventKind::Press
                        && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc | KeyCode::Enter)
                    {
                        break;
                    }
                }
            }
        }

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
        Ok(())
    }
}

fn draw_progress(frame: &mut Frame<'_>, kind: ProgressSinkKind, state: &AppState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(4),
        ])
        .split(frame.area());

    let mut phase_spans = Vec::new();
    for (i, phase) in PHASES.iter().enumerate() {
        if i > 0 {
            phase_spans.push(Span::raw(" → "));
        }
        let style = if phase.index() == state.phase.index() {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else if phase.index() < state.phase.index() {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        phase_spans.push(Span::styled(phase.label(), style));
    }
    let phases = Paragraph::new(Line::from(phase_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" biokb {} ", kind_label(kind))),
    );
    frame.render_widget(phases, chunks[0]);

    let spinner = SPINNER[tick % SPINNER.len()];
    let mut status = format!(
        "{spinner} {}  elapsed {:.1}s  requests {}",
        state.status,
        state.started.elapsed().as_secs_f64(),
        state.request_count,
    );
    if let Some(latency) = state.latency_ms {
        status.push_str(&format!("  last latency {latency}ms"));
    }
    let status = Paragraph::new(status).block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, chunks[1]);

    let events: Vec<Line> = state
        .events
        .iter()
        .map(|event| Line::from(event.clone()))
        .collect();
    let events = Paragraph::new(events).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" events (q aborts) "),
    );
    frame.render_widget(events, chunks[2]);
}

fn kind_label(kind: ProgressSinkKind) -> &'static str {
    match kind {
        ProgressSinkKind::Validate => "validate",
        ProgressSinkKind::List => "list",
        ProgressSinkKind::Info => "info",
        ProgressSinkKind::Check => "check",
        ProgressSinkKind::Fetch => "fetch",
    }
}

fn field_line(name: &str, value: &str) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("{name:>14}: "),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(value.to_string()),
    ])
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let rest = message.strip_prefix("phase=")?;
    let (name, payload) = rest.split_once(';')?;
    let phase = match name.trim() {
        "Resolve" => Phase::Resolve,
        "Fetch" => Phase::Fetch,
        "Verify" => Phase::Verify,
        "Store" => Phase::Store,
        _ => return None,
    };
    Some((phase, payload.trim()))
}

fn parse_latency(message: &str) -> Option<u128> {
    let idx = message.find("latency_ms=")?;
    message[idx + "latency_ms=".len()..]
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}
