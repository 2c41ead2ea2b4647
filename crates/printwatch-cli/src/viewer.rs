use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use printwatch_core::{Coordinator, CoordinatorStatus, DeviceIdentity, PrinterClient, Snapshot, SnapshotStore};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};
use ratatui::Terminal;

const GAUGE_HEIGHT: u16 = 3;

struct ViewerState {
    host: String,
    latest: Option<Arc<Snapshot>>,
    status: Option<CoordinatorStatus>,
}

/// Dashboard for one device. Redraws whenever the coordinator publishes;
/// `r` requests a refresh, `q` quits.
pub async fn run_viewer<C, S>(coordinator: &Coordinator<C, S>, host: &str) -> Result<()>
where
    C: PrinterClient + 'static,
    S: SnapshotStore + 'static,
{
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut published = coordinator.subscribe();
    let mut state = ViewerState {
        host: host.to_string(),
        latest: published.borrow_and_update().clone(),
        status: Some(coordinator.status()),
    };

    let run_result = async {
        loop {
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        KeyCode::Char('r') => {
                            let coordinator = coordinator.clone();
                            tokio::spawn(async move {
                                let _ = coordinator.refresh().await;
                            });
                        }
                        _ => {}
                    }
                }
            }

            if published.has_changed().unwrap_or(false) {
                state.latest = published.borrow_and_update().clone();
            }
            state.status = Some(coordinator.status());

            terminal.draw(|frame| draw_ui(frame.size(), frame, &state))?;
        }

        Ok::<(), anyhow::Error>(())
    }
    .await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    run_result
}

fn draw_ui(area: Rect, frame: &mut ratatui::Frame<'_>, state: &ViewerState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0), Constraint::Length(6)])
        .split(area);

    frame.render_widget(render_header(state), rows[0]);

    let Some(snapshot) = &state.latest else {
        let waiting = Paragraph::new("Waiting for first snapshot...")
            .block(Block::default().borders(Borders::ALL).title("Supplies"));
        frame.render_widget(waiting, rows[1]);
        frame.render_widget(render_details(state), rows[2]);
        return;
    };

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(rows[1]);

    let supplies: Vec<(String, Option<u8>, Color)> = snapshot
        .data()
        .supplies
        .iter()
        .map(|s| (s.description.clone(), s.percentage, supply_color(&s.color)))
        .collect();
    render_gauges(frame, cols[0], "Supplies", &supplies);

    let trays: Vec<(String, Option<u8>, Color)> = snapshot
        .data()
        .input_trays
        .iter()
        .map(|t| {
            let label = match &t.media_name {
                Some(media) => format!("{} ({media})", t.description),
                None => t.description.clone(),
            };
            (label, t.percentage, Color::Green)
        })
        .collect();
    render_gauges(frame, cols[1], "Input trays", &trays);

    frame.render_widget(render_details(state), rows[2]);
}

fn render_header(state: &ViewerState) -> Paragraph<'static> {
    let mut lines = Vec::new();
    let title = Span::styled(
        "Printer Monitor  ",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    );

    match &state.latest {
        Some(snapshot) => {
            let identity = DeviceIdentity::from_snapshot(snapshot, &state.host);
            let online = if snapshot.is_online() {
                Span::styled("ONLINE", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
            } else {
                Span::styled("OFFLINE (cached)", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
            };
            lines.push(Line::from(vec![
                title,
                online,
                Span::raw(format!("  state={}", snapshot.data().status.state.as_str())),
            ]));
            let mut device = format!(
                "{} {}  host={}",
                identity.manufacturer, identity.model, state.host
            );
            if let Some(since) = snapshot.offline_since() {
                device.push_str(&format!("  last data {}", since.format("%Y-%m-%d %H:%M:%S UTC")));
            }
            device.push_str("  (r refresh, q quit)");
            lines.push(Line::from(device));
        }
        None => {
            lines.push(Line::from(vec![title, Span::raw("no data yet")]));
            lines.push(Line::from(format!("host={}  (r refresh, q quit)", state.host)));
        }
    }

    Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"))
}

fn render_gauges(frame: &mut ratatui::Frame<'_>, area: Rect, title: &str, items: &[(String, Option<u8>, Color)]) {
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if items.is_empty() {
        frame.render_widget(Paragraph::new("none reported"), inner);
        return;
    }

    let constraints: Vec<Constraint> = items
        .iter()
        .map(|_| Constraint::Length(GAUGE_HEIGHT))
        .chain(std::iter::once(Constraint::Min(0)))
        .collect();
    let slots = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(inner);

    for ((label, percentage, color), slot) in items.iter().zip(slots.iter().copied()) {
        let gauge = Gauge::default()
            .block(Block::default().title(label.clone()))
            .gauge_style(Style::default().fg(*color).bg(Color::Black))
            // Supply levels come straight from the device and may exceed 100.
            .percent(percentage.map_or(0, |pct| u16::from(pct).min(100)))
            .label(match percentage {
                Some(pct) => format!("{pct}%"),
                None => "level unknown".to_string(),
            });
        frame.render_widget(gauge, slot);
    }
}

fn render_details(state: &ViewerState) -> Paragraph<'static> {
    let mut lines = Vec::new();
    if let Some(snapshot) = &state.latest {
        let data = snapshot.data();
        lines.push(Line::from(format!(
            "Display: {}   Cover: {}   Pages: {}",
            data.display_text.as_deref().unwrap_or("unknown"),
            data.cover_status.state.as_str(),
            data.page_count.total.map_or_else(|| "n/a".to_string(), |n| n.to_string()),
        )));
        let errors = data.errors.as_deref().unwrap_or("none");
        let style = if data.errors.is_some() {
            Style::default().fg(Color::Red)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(format!("Printer errors: {errors}"), style)));
    }

    if let Some(status) = &state.status {
        if let Some(attempt) = status.last_attempt {
            lines.push(Line::from(format!(
                "Last attempt: {}  success={}",
                attempt.format("%H:%M:%S"),
                status.last_update_success
            )));
        }
        if let Some(err) = &status.last_error {
            lines.push(Line::from(Span::styled(
                format!("{err} ({:?})", err.classification),
                Style::default().fg(Color::Red),
            )));
        }
    }

    Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Details"))
}

fn supply_color(color: &str) -> Color {
    match color {
        "Black" => Color::Gray,
        "Cyan" | "Light Cyan" => Color::Cyan,
        "Magenta" | "Light Magenta" => Color::Magenta,
        "Yellow" => Color::Yellow,
        "Gray" | "Grey" => Color::DarkGray,
        _ => Color::Blue,
    }
}
