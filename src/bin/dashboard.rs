//! Minimal terminal snapshot printer for per-cycle JSONL reports.
//! A terminal renderer is out of scope for the engine itself; this binary
//! is a demonstration consumer, not part of the strategy hot path.
//!
//! Usage: dashboard <report_dir>
//! Keys: [q/Esc] quit

use std::io::{self, stdout};
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event as CEvent, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Cell, Paragraph, Row, Table};

const BORDER: Style = Style::new().fg(Color::DarkGray);
const POLL_INTERVAL: Duration = Duration::from_secs(2);

struct App {
    report_dir: String,
    lines: Vec<String>,
    last_poll: Instant,
}

impl App {
    fn new(report_dir: String) -> Self {
        let mut app = Self {
            report_dir,
            lines: Vec::new(),
            last_poll: Instant::now() - POLL_INTERVAL,
        };
        app.reload();
        app
    }

    fn reload(&mut self) {
        self.last_poll = Instant::now();
        self.lines.clear();

        let Ok(entries) = std::fs::read_dir(&self.report_dir) else {
            return;
        };
        let mut files: Vec<_> = entries.flatten().map(|e| e.path()).collect();
        files.sort();

        for path in files {
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Ok(contents) = std::fs::read_to_string(&path) else {
                continue;
            };
            let tail: Vec<&str> = contents.lines().rev().take(20).collect();
            for line in tail.into_iter().rev() {
                self.lines.push(line.to_string());
            }
        }
        // Keep only the most recent 200 lines across all files.
        let len = self.lines.len();
        if len > 200 {
            self.lines.drain(0..len - 200);
        }
    }
}

fn draw(app: &App, frame: &mut Frame) {
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(10),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    Paragraph::new(format!(" dashboard | watching {}", app.report_dir))
        .style(Style::default().fg(Color::Black).bg(Color::Cyan))
        .render(header_area, frame.buffer_mut());

    let rows: Vec<Row> = app
        .lines
        .iter()
        .rev()
        .map(|l| Row::new(vec![Cell::from(l.as_str())]))
        .collect();
    let widths = [Constraint::Percentage(100)];
    Table::new(rows, widths)
        .block(Block::bordered().title("recent events").border_style(BORDER))
        .render(body_area, frame.buffer_mut());

    Paragraph::new(" [q/Esc] Quit")
        .style(Style::default().fg(Color::Black).bg(Color::DarkGray))
        .render(footer_area, frame.buffer_mut());
}

fn main() -> io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let report_dir = if args.len() > 1 {
        args[1].clone()
    } else {
        eprintln!("Usage: dashboard <report_dir>");
        std::process::exit(1);
    };

    enable_raw_mode()?;
    execute!(stdout(), EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(report_dir);

    loop {
        if app.last_poll.elapsed() >= POLL_INTERVAL {
            app.reload();
        }

        terminal.draw(|frame| draw(&app, frame))?;

        if event::poll(Duration::from_millis(250))? {
            if let CEvent::Key(key) = event::read()? {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    break;
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(stdout(), LeaveAlternateScreen)?;
    Ok(())
}
