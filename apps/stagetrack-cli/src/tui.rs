//! Terminal dashboard for a single project.
//!
//! Shows the stages of a project with their status, a completion gauge and
//! a feed of notifications. Stages can be moved through the lifecycle from
//! the keyboard; every change goes through the coordinator like any other
//! request.

use crate::Session;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Gauge, List, ListItem, Paragraph, Row, Table, TableState, Wrap},
};
use stagetrack_core::{
    ProjectId, ProjectSummary, StageInstance, StageRegistry, StageStatus, StageTracker,
};
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

const ACTIVITY_LIMIT: usize = 50;
const DEFAULT_STATUS: &str = "↑/↓ select  s/r/a/c/d/b set status  h help  q quit";

/// Application state for the dashboard
struct DashboardApp {
    /// Project being shown
    project: ProjectId,

    /// Stage definitions of the project's workflow
    registry: Arc<StageRegistry>,

    /// Latest stage snapshot
    stages: Vec<StageInstance>,

    /// Latest summary
    summary: Option<ProjectSummary>,

    /// Selected row
    selected: usize,

    /// Current view mode
    view_mode: ViewMode,

    /// Status message
    status: String,

    /// Rendered notifications, newest last
    activity: Arc<Mutex<Vec<String>>>,

    /// Whether the app should exit
    should_quit: bool,
}

/// View modes for the TUI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViewMode {
    /// Stage table
    Stages,

    /// Help screen
    Help,
}

impl DashboardApp {
    fn new(project: ProjectId, registry: Arc<StageRegistry>) -> Self {
        Self {
            project,
            registry,
            stages: Vec::new(),
            summary: None,
            selected: 0,
            view_mode: ViewMode::Stages,
            status: DEFAULT_STATUS.to_string(),
            activity: Arc::new(Mutex::new(Vec::new())),
            should_quit: false,
        }
    }

    /// Reloads the snapshot and summary from the coordinator
    fn refresh(&mut self, session: &Session) -> Result<()> {
        self.stages = session
            .coordinator
            .get_project_stage_snapshot(&self.project)?;
        self.summary = Some(session.coordinator.project_summary(&self.project)?);
        if self.selected >= self.stages.len() {
            self.selected = self.stages.len().saturating_sub(1);
        }
        Ok(())
    }

    /// Handle keyboard input. Returns the status requested for the selected
    /// stage, if any.
    fn handle_input(&mut self, key: KeyCode) -> Option<StageStatus> {
        if self.view_mode == ViewMode::Help {
            if matches!(key, KeyCode::Esc | KeyCode::Char('q')) {
                self.view_mode = ViewMode::Stages;
                self.status = DEFAULT_STATUS.to_string();
            }
            return None;
        }

        match key {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('h') => {
                self.view_mode = ViewMode::Help;
                self.status = "Viewing help - press 'q' to go back".to_string();
            }
            KeyCode::Up | KeyCode::Char('k') => self.select_previous(),
            KeyCode::Down | KeyCode::Char('j') => self.select_next(),
            KeyCode::Char(c) => return status_for_key(c),
            _ => {}
        }
        None
    }

    fn select_next(&mut self) {
        if !self.stages.is_empty() {
            self.selected = (self.selected + 1) % self.stages.len();
        }
    }

    fn select_previous(&mut self) {
        if !self.stages.is_empty() {
            self.selected = self
                .selected
                .checked_sub(1)
                .unwrap_or(self.stages.len() - 1);
        }
    }

    fn selected_stage(&self) -> Option<&StageInstance> {
        self.stages.get(self.selected)
    }

    fn push_activity(activity: &Mutex<Vec<String>>, message: String) {
        let mut feed = activity.lock().unwrap_or_else(PoisonError::into_inner);
        feed.push(message);
        if feed.len() > ACTIVITY_LIMIT {
            let excess = feed.len() - ACTIVITY_LIMIT;
            feed.drain(..excess);
        }
    }
}

/// Lifecycle shortcut keys
fn status_for_key(c: char) -> Option<StageStatus> {
    match c {
        's' => Some(StageStatus::InProgress),
        'r' => Some(StageStatus::InReview),
        'a' => Some(StageStatus::Approved),
        'c' => Some(StageStatus::Completed),
        'd' => Some(StageStatus::Delayed),
        'b' => Some(StageStatus::Blocked),
        _ => None,
    }
}

fn status_color(status: StageStatus) -> Color {
    match status {
        StageStatus::NotStarted => Color::DarkGray,
        StageStatus::InProgress => Color::Cyan,
        StageStatus::InReview => Color::Yellow,
        StageStatus::Approved | StageStatus::Completed => Color::Green,
        StageStatus::Delayed => Color::Magenta,
        StageStatus::Blocked => Color::Red,
    }
}

/// Run the interactive dashboard
pub async fn run_dashboard(session: &Session, project: &ProjectId) -> Result<()> {
    let registry = session.coordinator.project_registry(project)?;
    let mut app = DashboardApp::new(project.clone(), registry);
    app.refresh(session)?;

    let feed = Arc::clone(&app.activity);
    Arc::new(session.notifier(project)?).attach(&session.bus, move |_, message| {
        DashboardApp::push_activity(&feed, message);
        Ok(())
    });

    // Setup terminal
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("Failed to enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    // Run the event loop
    let result = run_app(&mut terminal, &mut app, session).await;

    // Restore terminal
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;

    result
}

/// Run the main application loop
async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut DashboardApp,
    session: &Session,
) -> Result<()> {
    let actor = session.config.tracker.default_actor.clone();

    loop {
        terminal
            .draw(|f| ui(f, app))
            .map_err(|e| anyhow::anyhow!("Failed to draw UI: {}", e))?;

        // Poll for events with timeout
        if event::poll(std::time::Duration::from_millis(100)).context("Failed to poll events")?
            && let Event::Key(key) = event::read().context("Failed to read event")?
            && key.kind == KeyEventKind::Press
            && let Some(status) = app.handle_input(key.code)
            && let Some(stage_id) = app.selected_stage().map(|s| s.stage_id.clone())
        {
            let result =
                session
                    .coordinator
                    .request_stage_transition(&app.project, &stage_id, status, &actor);
            app.status = match result {
                Ok(outcome) if outcome.changed => format!("'{stage_id}' is now {status}"),
                Ok(_) => format!("'{stage_id}' already {status}"),
                Err(e) => format!("Rejected: {e}"),
            };
            app.refresh(session)?;
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Render the UI
fn ui(frame: &mut Frame, app: &DashboardApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Length(3), // Completion gauge
            Constraint::Min(10),   // Content
            Constraint::Length(3), // Status bar
        ])
        .split(frame.area());

    let title = Paragraph::new(vec![Line::from(vec![
        Span::styled(
            "stagetrack - ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            app.project.as_str(),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" ({})", app.registry.workflow())),
    ])])
    .block(Block::default().borders(Borders::ALL));
    frame.render_widget(title, chunks[0]);

    render_gauge(frame, app, chunks[1]);

    match app.view_mode {
        ViewMode::Stages => render_stages_view(frame, app, chunks[2]),
        ViewMode::Help => render_help_view(frame, chunks[2]),
    }

    let status = Paragraph::new(app.status.as_str())
        .style(Style::default().fg(Color::Green))
        .block(Block::default().borders(Borders::ALL).title("Status"));
    frame.render_widget(status, chunks[3]);
}

fn render_gauge(frame: &mut Frame, app: &DashboardApp, area: Rect) {
    let (percent, label) = match &app.summary {
        Some(s) => (
            s.completion_percentage,
            format!(
                "{}% - {}/{} stages, {} critical days left",
                s.completion_percentage, s.terminal_stages, s.total_stages, s.remaining_critical_days
            ),
        ),
        None => (0, "loading".to_string()),
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Completion"))
        .gauge_style(Style::default().fg(Color::Green))
        .percent(u16::from(percent.min(100)))
        .label(label);
    frame.render_widget(gauge, area);
}

/// Render the stage table and activity feed
fn render_stages_view(frame: &mut Frame, app: &DashboardApp, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    let rows: Vec<Row> = app
        .stages
        .iter()
        .map(|instance| {
            let definition = app.registry.get(&instance.stage_id);
            let name = definition.map(|d| d.name.clone()).unwrap_or_default();
            let deps = definition
                .map(|d| d.dependencies.join(", "))
                .unwrap_or_default();
            Row::new(vec![
                Cell::from(name),
                Cell::from(instance.status.as_str())
                    .style(Style::default().fg(status_color(instance.status))),
                Cell::from(format!("{:>3}%", instance.progress)),
                Cell::from(deps),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(40),
            Constraint::Length(12),
            Constraint::Length(5),
            Constraint::Min(10),
        ],
    )
    .header(
        Row::new(vec!["Stage", "Status", "Prog", "After"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title("Stages"))
    .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
    .highlight_symbol("> ");

    let mut state = TableState::default().with_selected(Some(app.selected));
    frame.render_stateful_widget(table, columns[0], &mut state);

    let feed = app
        .activity
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .rev()
        .map(|m| ListItem::new(m.clone()))
        .collect::<Vec<_>>();
    let activity = List::new(feed).block(Block::default().borders(Borders::ALL).title("Activity"));
    frame.render_widget(activity, columns[1]);
}

/// Render the help view
fn render_help_view(frame: &mut Frame, area: Rect) {
    let help_text = Text::from(vec![
        Line::from(""),
        Line::from(vec![Span::styled(
            "Keyboard Shortcuts:",
            Style::default().add_modifier(Modifier::BOLD),
        )]),
        Line::from(""),
        Line::from("  ↑/k ↓/j    - Select stage"),
        Line::from("  s          - Start (in_progress)"),
        Line::from("  r          - Send to review (in_review)"),
        Line::from("  a          - Approve"),
        Line::from("  c          - Complete"),
        Line::from("  d          - Mark delayed"),
        Line::from("  b          - Mark blocked"),
        Line::from("  h          - Show this help screen"),
        Line::from("  q          - Quit (or leave help)"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Rules:",
            Style::default().add_modifier(Modifier::BOLD),
        )]),
        Line::from(""),
        Line::from("A stage can only be approved or completed once every stage it"),
        Line::from("depends on is approved or completed. Finishing a stage starts"),
        Line::from("the stages waiting on it."),
    ]);

    let help = Paragraph::new(help_text)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .wrap(Wrap { trim: false });
    frame.render_widget(help, area);
}
