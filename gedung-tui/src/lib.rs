pub mod run_monitor;

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use gedung_core::config::expand_path;
use gedung_core::input::preview;
use gedung_core::report::ARCHIVE_FILE_NAME;
use gedung_core::{
    Config, CredentialStore, InputRow, RunOptions, Session, SharedModel, execute_run,
    read_input_rows,
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
};
use run_monitor::{RunMessage, RunMonitor, RunOutcome, progress_callback};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

const PREVIEW_ROWS: usize = 3;
const HISTORY_FILE: &str = ".gedung_history";

#[derive(Debug, Clone, Copy, PartialEq)]
enum ExitMode {
    None,
    Normal,    // exit, quit - ask about saving
    ForceQuit, // :q! - don't save, don't ask
    WriteQuit, // :wq!, ZZ - save and quit, don't ask
}

struct LoadedInput {
    path: PathBuf,
    rows: Vec<InputRow>,
}

pub struct App {
    input: String,
    history: Vec<String>,
    output: Vec<String>,
    cursor_position: usize,
    should_quit: bool,
    scroll_offset: usize,
    history_index: Option<usize>,
    temp_input: String,
    exit_mode: ExitMode,
    awaiting_save_confirmation: bool,
    config: Config,
    store: CredentialStore,
    session: Session,
    model: Arc<SharedModel>,
    loaded: Option<LoadedInput>,
    monitor: Option<RunMonitor>,
    last_archive: Option<Vec<u8>>,
    runtime: Option<Handle>,
}

impl App {
    pub fn new(config: Config) -> Self {
        let mut output: Vec<String> = gedung_core::banner()
            .lines()
            .map(|line| line.to_string())
            .collect();
        output.push(String::new());
        output.push("  Log in with 'login <user> <password>' to get started.".to_string());
        output.push("  Type 'help' for available commands, 'exit' or 'quit' to exit.".to_string());
        output.push(String::new());

        let model = Arc::new(SharedModel::new(
            config.model_path(),
            config.input_size,
            config.iou_threshold,
        ));

        Self {
            input: String::new(),
            history: Vec::new(),
            output,
            cursor_position: 0,
            should_quit: false,
            scroll_offset: 0,
            history_index: None,
            temp_input: String::new(),
            exit_mode: ExitMode::None,
            awaiting_save_confirmation: false,
            store: config.credential_store(),
            config,
            session: Session::new(),
            model,
            loaded: None,
            monitor: None,
            last_archive: None,
            runtime: Handle::try_current().ok(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        self.monitor.is_some()
    }

    pub fn add_output(&mut self, message: impl Into<String>) {
        self.output.push(message.into());
        // Keep only last 1000 lines
        if self.output.len() > 1000 {
            self.output.drain(0..self.output.len() - 1000);
        }
        self.scroll_offset = 0;
    }

    pub fn navigate_history_backward(&mut self) {
        if self.history.is_empty() {
            return;
        }

        if self.history_index.is_none() {
            self.temp_input = self.input.clone();
        }

        let idx = match self.history_index {
            None => self.history.len() - 1,
            Some(0) => 0,
            Some(idx) => idx - 1,
        };

        self.history_index = Some(idx);
        self.input = self.history[idx].clone();
        self.cursor_position = self.input.len();
    }

    pub fn navigate_history_forward(&mut self) {
        let Some(idx) = self.history_index else {
            return;
        };

        if idx + 1 >= self.history.len() {
            // Reached the end, restore what was being typed
            self.input = std::mem::take(&mut self.temp_input);
            self.cursor_position = self.input.len();
            self.history_index = None;
            return;
        }

        self.history_index = Some(idx + 1);
        self.input = self.history[idx + 1].clone();
        self.cursor_position = self.input.len();
    }

    fn get_history_file_path() -> PathBuf {
        expand_path("~").join(HISTORY_FILE)
    }

    pub fn load_history(&mut self) {
        let path = Self::get_history_file_path();
        if let Ok(content) = fs::read_to_string(&path) {
            let mut lines: Vec<String> = content.lines().map(|s| s.to_string()).collect();

            // Keep only the last 100 entries
            if lines.len() > 100 {
                lines.drain(0..lines.len() - 100);
            }

            self.history = lines;
        }
    }

    pub fn save_history(&self) -> Result<()> {
        let path = Self::get_history_file_path();
        fs::write(&path, self.history.join("\n"))?;
        Ok(())
    }

    fn request_exit(&mut self, mode: ExitMode) {
        self.exit_mode = mode;

        match mode {
            ExitMode::Normal => {
                if !self.history.is_empty() {
                    self.awaiting_save_confirmation = true;
                    self.add_output("");
                    self.add_output(format!("Save command history to ~/{}? [y/N]:", HISTORY_FILE));
                } else {
                    self.should_quit = true;
                }
            }
            ExitMode::ForceQuit => {
                self.should_quit = true;
            }
            ExitMode::WriteQuit => {
                if !self.history.is_empty() {
                    self.write_history();
                }
                self.should_quit = true;
            }
            ExitMode::None => {}
        }
    }

    fn write_history(&mut self) {
        if let Err(e) = self.save_history() {
            self.add_output(format!("Error saving history: {}", e));
        } else {
            self.add_output(format!("History saved to ~/{}", HISTORY_FILE));
        }
    }

    pub fn handle_save_confirmation(&mut self, response: &str) {
        self.awaiting_save_confirmation = false;

        let response = response.trim().to_lowercase();
        if response == "y" || response == "yes" {
            self.write_history();
        } else {
            self.add_output("History not saved.");
        }
        self.should_quit = true;
    }

    pub fn handle_input(&mut self, input: String) {
        if input.is_empty() {
            return;
        }

        if self.awaiting_save_confirmation {
            self.handle_save_confirmation(&input);
            return;
        }

        // Passwords never reach the history file or the scrollback
        self.history.push(redact_for_history(&input));
        if self.history.len() > 100 {
            self.history.remove(0);
        }

        self.history_index = None;
        self.temp_input.clear();

        self.add_output(format!("> {}", mask_password(&input)));

        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            return;
        }

        match parts[0] {
            "exit" | "quit" => {
                self.request_exit(ExitMode::Normal);
            }
            ":q!" => {
                self.request_exit(ExitMode::ForceQuit);
            }
            ":wq!" | "ZZ" => {
                self.request_exit(ExitMode::WriteQuit);
            }
            "help" => {
                self.add_output("Available commands:");
                self.add_output("  login <user> <password>  - Log in");
                self.add_output("  logout                   - Log out");
                self.add_output("  whoami                   - Show the logged-in user");
                self.add_output("  load <file.xlsx>         - Load a spreadsheet with a 'URL' column");
                self.add_output("  run                      - Classify every loaded URL");
                self.add_output(format!(
                    "  save [path]              - Save the last archive (default: {})",
                    ARCHIVE_FILE_NAME
                ));
                self.add_output("  config                   - Show the active configuration");
                self.add_output("  clear                    - Clear the output");
                self.add_output("  help                     - Show this help message");
                self.add_output("  exit, quit               - Exit the REPL");
            }
            "clear" => {
                self.output.clear();
            }
            "login" => match (parts.get(1), parts.get(2)) {
                (Some(user), Some(password)) => self.login(user, password),
                _ => self.add_output("Error: login requires a username and a password"),
            },
            "logout" => {
                if self.session.is_authenticated() {
                    self.session.logout();
                    self.add_output("Logged out.");
                } else {
                    self.add_output("Not logged in.");
                }
            }
            "whoami" => match self.session.current_user() {
                Some(user) => self.add_output(format!("Logged in as: {}", user)),
                None => self.add_output("Not logged in."),
            },
            "load" => {
                if !self.require_login() {
                    return;
                }
                match parts.get(1) {
                    Some(path) => self.load(path),
                    None => self.add_output("Error: load requires a spreadsheet path"),
                }
            }
            "run" => {
                if !self.require_login() {
                    return;
                }
                self.start_run();
            }
            "save" => {
                if !self.require_login() {
                    return;
                }
                let path = parts.get(1).copied().unwrap_or(ARCHIVE_FILE_NAME);
                self.save_archive(path);
            }
            "config" => self.show_config(),
            _ => {
                self.add_output(format!("Unknown command: {}", parts[0]));
                self.add_output("Type 'help' for available commands");
            }
        }
    }

    fn require_login(&mut self) -> bool {
        if self.session.is_authenticated() {
            return true;
        }
        self.add_output("Error: please log in first (login <user> <password>)");
        false
    }

    fn login(&mut self, user: &str, password: &str) {
        match self.session.login(&self.store, user, password) {
            Ok(()) => self.add_output(format!("✓ Welcome, {}!", user)),
            Err(e) => self.add_output(format!("✗ {}", e)),
        }
    }

    fn load(&mut self, path: &str) {
        let path = expand_path(path);
        match read_input_rows(&path) {
            Ok(rows) => {
                self.add_output(format!("Loaded {} rows from {}", rows.len(), path.display()));
                let shown: Vec<String> = preview(&rows, PREVIEW_ROWS)
                    .iter()
                    .enumerate()
                    .map(|(i, row)| format!("  {:>3}  {}", i + 1, row.url))
                    .collect();
                for line in shown {
                    self.add_output(line);
                }
                if rows.len() > PREVIEW_ROWS {
                    self.add_output(format!("  ... and {} more", rows.len() - PREVIEW_ROWS));
                }
                self.loaded = Some(LoadedInput { path, rows });
            }
            Err(e) => self.add_output(format!("✗ Failed to load {}: {}", path.display(), e)),
        }
    }

    fn start_run(&mut self) {
        if self.monitor.is_some() {
            self.add_output("Error: a run is already in progress");
            return;
        }
        let Some((rows, source)) = self
            .loaded
            .as_ref()
            .map(|loaded| (loaded.rows.clone(), loaded.path.display().to_string()))
        else {
            self.add_output("Error: no input loaded (load <file.xlsx>)");
            return;
        };
        if !self.model.is_available() {
            let message = format!(
                "✗ Model not found at {} (set model_path in the config)",
                self.model.path().display()
            );
            self.add_output(message);
            return;
        }
        let Some(runtime) = self.runtime.clone() else {
            self.add_output("✗ No async runtime available to run the batch");
            return;
        };

        let total = rows.len();
        let options = RunOptions::from_config(&self.config);
        let model = Arc::clone(&self.model);

        let (tx, rx) = mpsc::unbounded_channel();
        let callback = progress_callback(tx.clone());
        runtime.spawn(async move {
            let message = match execute_run(options, &rows, &model, Some(callback)).await {
                Ok(output) => RunMessage::Finished(Box::new(output)),
                Err(e) => RunMessage::Failed(e.to_string()),
            };
            let _ = tx.send(message);
        });

        self.last_archive = None;
        self.monitor = Some(RunMonitor::new(rx, total));
        self.add_output(format!("→ Classifying {} rows from {}", total, source));
    }

    /// Pull progress from a running batch. Called once per frame.
    pub fn tick(&mut self) {
        let Some(monitor) = self.monitor.as_mut() else {
            return;
        };
        monitor.process_messages();
        let lines = monitor.drain_lines();
        let outcome = monitor.take_outcome();

        for line in lines {
            self.add_output(line);
        }

        match outcome {
            Some(RunOutcome::Finished(output)) => {
                self.monitor = None;
                let summary = &output.summary;
                self.add_output("");
                self.add_output(format!(
                    "  Building: {}  Not Building: {}  Errors: {}",
                    summary.building,
                    summary.not_building,
                    summary.errors()
                ));
                self.add_output(format!("  Report: {}", output.report_path.display()));
                self.add_output(summary.completion_message());
                self.add_output(format!(
                    "  Type 'save' to write {} ({} bytes)",
                    ARCHIVE_FILE_NAME,
                    output.archive.len()
                ));
                self.last_archive = Some(output.archive);
            }
            Some(RunOutcome::Failed(error)) => {
                self.monitor = None;
                self.add_output(format!("✗ Run failed: {}", error));
            }
            None => {}
        }
    }

    fn save_archive(&mut self, path: &str) {
        let Some(archive) = &self.last_archive else {
            self.add_output("Error: nothing to save yet, finish a run first");
            return;
        };
        let path = expand_path(path);
        match fs::write(&path, archive) {
            Ok(()) => self.add_output(format!("✓ Archive saved to {}", path.display())),
            Err(e) => self.add_output(format!("✗ Failed to save {}: {}", path.display(), e)),
        }
    }

    fn show_config(&mut self) {
        let lines = vec![
            format!("  model_path:   {}", self.config.model_path().display()),
            format!("  output_dir:   {}", self.config.output_dir().display()),
            format!("  confidence:   {}", self.config.confidence),
            format!("  timeout:      {}s", self.config.timeout_secs),
            format!("  concurrency:  {}", self.config.concurrency),
            format!("  users:        {}", self.store.len()),
        ];
        for line in lines {
            self.add_output(line);
        }
    }

    /// The input line as drawn on screen, with any password typed after
    /// `login <user>` hidden.
    fn display_input(&self) -> String {
        mask_password(&self.input)
    }
}

/// Replace the third word of a `login` line with asterisks, keeping length
/// and spacing so the cursor still lines up.
fn mask_password(line: &str) -> String {
    if !line.trim_start().starts_with("login ") {
        return line.to_string();
    }

    let mut words_seen = 0;
    let mut in_word = false;
    line.chars()
        .map(|c| {
            if c.is_whitespace() {
                in_word = false;
                c
            } else {
                if !in_word {
                    in_word = true;
                    words_seen += 1;
                }
                if words_seen >= 3 { '*' } else { c }
            }
        })
        .collect()
}

fn redact_for_history(line: &str) -> String {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        ["login", user, ..] => format!("login {}", user),
        _ => line.to_string(),
    }
}

pub fn run(config: Config) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(config);
    app.load_history();

    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        app.tick();
        terminal.draw(|f| ui(f, app))?;

        // Poll so run progress keeps redrawing while no key is pressed
        if !event::poll(Duration::from_millis(100))? {
            continue;
        }

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }

            match key.code {
                KeyCode::Char(c) => {
                    app.input.insert(app.cursor_position, c);
                    app.cursor_position += c.len_utf8();
                    app.history_index = None;
                    app.temp_input.clear();
                }
                KeyCode::Backspace => {
                    if let Some(c) = app.input[..app.cursor_position].chars().next_back() {
                        app.cursor_position -= c.len_utf8();
                        app.input.remove(app.cursor_position);
                        app.history_index = None;
                        app.temp_input.clear();
                    }
                }
                KeyCode::Enter => {
                    let input = app.input.drain(..).collect();
                    app.cursor_position = 0;
                    app.handle_input(input);
                }
                KeyCode::Up => {
                    app.navigate_history_backward();
                }
                KeyCode::Down => {
                    app.navigate_history_forward();
                }
                KeyCode::Left => {
                    if let Some(c) = app.input[..app.cursor_position].chars().next_back() {
                        app.cursor_position -= c.len_utf8();
                    }
                }
                KeyCode::Right => {
                    if let Some(c) = app.input[app.cursor_position..].chars().next() {
                        app.cursor_position += c.len_utf8();
                    }
                }
                KeyCode::Home => {
                    app.cursor_position = 0;
                }
                KeyCode::End => {
                    app.cursor_position = app.input.len();
                }
                KeyCode::Esc => {
                    app.should_quit = true;
                }
                KeyCode::PageUp => {
                    app.scroll_offset = app.scroll_offset.saturating_sub(10);
                }
                KeyCode::PageDown => {
                    app.scroll_offset =
                        (app.scroll_offset + 10).min(app.output.len().saturating_sub(1));
                }
                _ => {}
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn ui(f: &mut Frame, app: &App) {
    let progress_height = if app.monitor.is_some() { 4 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),                  // Output area
            Constraint::Length(progress_height), // Run progress
            Constraint::Length(1),               // Horizontal rule
            Constraint::Length(1),               // Input area
            Constraint::Length(1),               // Horizontal rule
            Constraint::Length(1),               // Status bar
        ])
        .split(f.area());

    let output_height = chunks[0].height as usize;
    let total_lines = app.output.len();

    // Auto-scroll to bottom if not manually scrolled
    let scroll_offset = if app.scroll_offset == 0 && total_lines > output_height {
        total_lines.saturating_sub(output_height)
    } else {
        app.scroll_offset.min(total_lines.saturating_sub(output_height))
    };

    let visible_output: Vec<Line> = app
        .output
        .iter()
        .skip(scroll_offset)
        .take(output_height)
        .map(|line| Line::from(line.clone()))
        .collect();

    f.render_widget(
        Paragraph::new(visible_output).style(Style::default().fg(Color::White)),
        chunks[0],
    );

    if let Some(monitor) = &app.monitor {
        monitor.render(f, chunks[1]);
    }

    let rule = "─".repeat(chunks[2].width as usize);
    f.render_widget(
        Paragraph::new(rule.clone()).style(Style::default().fg(Color::DarkGray)),
        chunks[2],
    );

    let prompt = "gedung> ";
    let input = Paragraph::new(format!("{}{}", prompt, app.display_input()))
        .style(Style::default().fg(Color::Yellow));
    f.render_widget(input, chunks[3]);

    let cursor_column = app.input[..app.cursor_position].chars().count();
    f.set_cursor_position((
        chunks[3].x + prompt.len() as u16 + cursor_column as u16,
        chunks[3].y,
    ));

    f.render_widget(
        Paragraph::new(rule).style(Style::default().fg(Color::DarkGray)),
        chunks[4],
    );

    let bold = Style::default().add_modifier(Modifier::BOLD);
    let user_span = match app.session.current_user() {
        Some(user) => Span::styled(
            format!("Logged in as: {}", user),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
        None => Span::styled("Not logged in", Style::default().fg(Color::Red)),
    };
    let status = Paragraph::new(Line::from(vec![
        user_span,
        Span::raw(" | "),
        Span::styled("help", bold),
        Span::raw(" for commands | "),
        Span::styled("↑↓", bold),
        Span::raw(" history | "),
        Span::styled("PgUp/PgDn", bold),
        Span::raw(" scroll | "),
        Span::styled("ESC", bold),
        Span::raw(" quit"),
    ]))
    .style(Style::default().fg(Color::DarkGray));

    f.render_widget(status, chunks[5]);
}
