mod browser;
mod clipboard;

use std::{io, time::Duration};

use color_eyre::Result;
use crossterm::{
    event::{self, DisableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use keyjar_core::{manager::KeyManager, storage::RecordStore};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, List, ListItem, ListState, Paragraph},
    Frame, Terminal,
};

use browser::{apply, reload, AddForm, Browser, FormField, Status};
use clipboard::SystemClipboard;

const MASK: &str = "••••••••";

/// Interactive key browser: type to filter, Enter to reveal, Ctrl-Y to copy,
/// Ctrl-N to add, Del to delete, Esc to quit.
pub async fn launch<S: RecordStore>(keys: &KeyManager<S>) -> Result<()> {
    // A failed first load leaves an empty list with the error in the footer.
    let mut browser = Browser::new(Vec::new());
    reload(&mut browser, keys).await;
    let mut clipboard = SystemClipboard::default();

    // Guard restores the terminal even if we early-return.
    let _guard = TerminalGuard::enter()?;
    let mut terminal = _guard.terminal()?;

    loop {
        terminal.draw(|frame| render(frame, &browser))?;

        if !event::poll(Duration::from_millis(150))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        let action = browser.on_key(key);
        if apply(&mut browser, keys, &mut clipboard, action).await {
            break;
        }
    }

    Ok(())
}

fn render(frame: &mut Frame, browser: &Browser) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let search = Paragraph::new(Line::from(vec![
        Span::styled("Search: ", Style::default().fg(Color::Cyan)),
        Span::raw(browser.query.as_str()),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(Span::styled(
                "keyjar",
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            )),
    );
    frame.render_widget(search, chunks[0]);

    match &browser.form {
        Some(form) => render_form(frame, form, chunks[1]),
        None => render_list(frame, browser, chunks[1]),
    }

    let footer = match &browser.status {
        Some(status) => {
            let (text, color) = match status {
                Status::Info(text) => (text, Color::Green),
                Status::Warning(text) => (text, Color::Yellow),
                Status::Error(text) => (text, Color::Red),
            };
            Line::from(Span::styled(text.as_str(), Style::default().fg(color)))
        }
        None if browser.form.is_some() => help(&[
            ("Tab", "switch field"),
            ("Enter", "save"),
            ("Esc", "cancel"),
        ]),
        None => help(&[
            ("Enter", "reveal/hide"),
            ("^Y", "copy"),
            ("^N", "add"),
            ("Del", "delete"),
            ("Esc", "quit"),
        ]),
    };
    let footer =
        Paragraph::new(footer).block(Block::default().borders(Borders::ALL).title("Controls"));
    frame.render_widget(footer, chunks[2]);
}

fn render_list(frame: &mut Frame, browser: &Browser, area: Rect) {
    let visible = browser.visible();
    let title = if browser.records.is_empty() {
        "No API keys stored. Press Ctrl-N to add one.".to_string()
    } else if visible.is_empty() {
        "No matching keys found.".to_string()
    } else {
        format!("Stored API keys ({}/{})", visible.len(), browser.records.len())
    };
    let items: Vec<ListItem> = visible
        .iter()
        .map(|r| {
            let (value, style) = match browser.value_for(&r.service) {
                None => (MASK.to_string(), Style::default().fg(Color::DarkGray)),
                Some(Ok(value)) => (value, Style::default().fg(Color::Green)),
                Some(Err(placeholder)) => (placeholder, Style::default().fg(Color::Red)),
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<24}", r.service),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::styled(value, style),
            ]))
        })
        .collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("> ");
    let mut state = ListState::default().with_selected(if visible.is_empty() {
        None
    } else {
        Some(browser.selected)
    });
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_form(frame: &mut Frame, form: &AddForm, area: Rect) {
    let field = |label: &'static str, value: String, focused: bool| {
        let label_style = if focused {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Cyan)
        };
        let cursor = if focused { "_" } else { "" };
        Line::from(vec![
            Span::styled(label, label_style),
            Span::raw(value),
            Span::raw(cursor),
        ])
    };
    let lines = vec![
        field(
            "Service: ",
            form.service.clone(),
            form.focus == FormField::Service,
        ),
        field(
            "API key: ",
            "•".repeat(form.key.chars().count()),
            form.focus == FormField::Key,
        ),
    ];
    let form = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title("Add API key"),
    );
    frame.render_widget(form, area);
}

fn help(keys: &[(&'static str, &'static str)]) -> Line<'static> {
    let mut spans = Vec::with_capacity(keys.len() * 2);
    for (key, label) in keys {
        spans.push(Span::styled(*key, Style::default().fg(Color::Cyan)));
        spans.push(Span::raw(format!(" {label}  ")));
    }
    Line::from(spans)
}

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        // Enter alternate screen to avoid polluting the shell buffer.
        execute!(io::stdout(), EnterAlternateScreen)?;
        Ok(Self)
    }

    fn terminal(&self) -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
        let backend = CrosstermBackend::new(io::stdout());
        Ok(Terminal::new(backend)?)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        // Best-effort cleanup; errors are logged but not propagated from Drop.
        if let Err(err) = disable_raw_mode() {
            eprintln!("failed to disable raw mode: {err}");
        }
        if let Err(err) = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture) {
            eprintln!("failed to restore terminal: {err}");
        }
    }
}
