use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use gedung_core::config::CONFIG_FILE_NAME;
use gedung_core::input::preview;
use gedung_core::report::render_summary;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use gedung_core::{
    ClassificationResult, Config, CredentialStore, ReportFormat, RunOptions, RunSummary, Session,
    SharedModel, execute_run, read_input_rows,
};
use gedung_fetch::UrlNormalizer;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Display;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const MODELS_DIR: &str = "models";
const MODEL_FILE_NAME: &str = "best.onnx";
const PREVIEW_ROWS: usize = 3;

/// Read by `classify` when `--password` is not given.
pub const PASSWORD_ENV: &str = "GEDUNG_PASSWORD";

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

// Prompts go to stderr so stdout stays clean for piped output
fn read_line(msg: &str) -> Result<String> {
    eprint!("{} ", msg.bright_cyan().bold());
    io::stderr().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_string())
}

/// What a keypress does to a password being typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordInput {
    Continue,
    Submit,
    Cancel,
}

pub fn edit_password(password: &mut String, key: KeyEvent) -> PasswordInput {
    if key.kind != KeyEventKind::Press {
        return PasswordInput::Continue;
    }
    match key.code {
        KeyCode::Enter => PasswordInput::Submit,
        KeyCode::Esc => PasswordInput::Cancel,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            PasswordInput::Cancel
        }
        KeyCode::Backspace => {
            password.pop();
            PasswordInput::Continue
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            password.push(c);
            PasswordInput::Continue
        }
        _ => PasswordInput::Continue,
    }
}

/// Read a password without echoing it. Falls back to a plain line read when
/// stdin is not a terminal.
fn read_password(msg: &str) -> Result<String> {
    if !io::stdin().is_terminal() {
        return read_line(msg);
    }

    eprint!("{} ", msg.bright_cyan().bold());
    io::stderr().flush()?;

    terminal::enable_raw_mode()?;
    let entered = read_masked();
    terminal::disable_raw_mode()?;
    eprintln!();
    entered
}

fn read_masked() -> Result<String> {
    let mut password = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        match edit_password(&mut password, key) {
            PasswordInput::Continue => {}
            PasswordInput::Submit => return Ok(password),
            PasswordInput::Cancel => bail!("Login cancelled"),
        }
    }
}

fn print_prompt(msg: &str) -> Result<String> {
    Ok(read_line(msg)?.to_lowercase())
}

/// Load the config at `path`, or the default location when no path is given.
/// Only the default location may be absent.
pub fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            Config::load(path).with_context(|| format!("Failed to load {}", path.display()))
        }
        None => {
            let path = Config::default_path();
            Config::load(&path).with_context(|| format!("Failed to load {}", path.display()))
        }
    }
}

/// Log in with whatever was passed on the command line, prompting for the
/// rest.
pub fn authenticate(
    store: &CredentialStore,
    user: Option<&str>,
    password: Option<&str>,
) -> Result<Session> {
    let user = match user {
        Some(user) => user.to_string(),
        None => read_line("Username:")?,
    };
    let password = match password {
        Some(password) => password.to_string(),
        None => read_password("Password:")?,
    };

    let mut session = Session::new();
    session.login(store, &user, &password)?;
    Ok(session)
}

/// Command-line values that take precedence over the config file for one run.
#[derive(Debug, Clone, Default)]
pub struct ClassifyOverrides {
    pub model: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
}

impl ClassifyOverrides {
    pub fn from_args(args: &ArgMatches) -> Self {
        Self {
            model: args.get_one::<PathBuf>("model").cloned(),
            output_dir: args.get_one::<PathBuf>("output-dir").cloned(),
            timeout_secs: args.get_one::<u64>("timeout").copied(),
            concurrency: args.get_one::<usize>("concurrency").copied(),
        }
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.model_path = model.to_string_lossy().into_owned();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.to_string_lossy().into_owned();
        }
        if let Some(timeout) = self.timeout_secs {
            config.timeout_secs = timeout;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency.max(1);
        }
    }
}

/// Write the default config into `dir`, pointing the model path at
/// `dir/models/best.onnx`. Returns the config file path.
pub fn write_default_config(dir: &Path) -> Result<PathBuf> {
    let models_dir = dir.join(MODELS_DIR);
    fs::create_dir_all(&models_dir)
        .with_context(|| format!("Failed to create {}", models_dir.display()))?;

    let config = Config {
        model_path: models_dir.join(MODEL_FILE_NAME).to_string_lossy().into_owned(),
        ..Config::default()
    };
    let config_path = dir.join(CONFIG_FILE_NAME);
    config
        .save(&config_path)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    Ok(config_path)
}

pub fn handle_init(args: &ArgMatches) -> Result<()> {
    print_divider();
    println!("{}", "  GEDUNG INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let dir = args
        .get_one::<String>("PATH")
        .map(String::as_str)
        .unwrap_or("~/.config/gedung/");
    let force = args.get_flag("force");
    let config_dir = PathBuf::from(shellexpand::tilde(dir).as_ref());
    let config_path = config_dir.join(CONFIG_FILE_NAME);

    println!(
        "{} Target: {}",
        "→".blue(),
        config_dir.display().to_string().bright_white()
    );
    println!();

    if config_path.exists() && !force {
        println!("{}", "⚠ WARNING".yellow().bold());
        println!("A config file already exists:");
        println!(
            "  {} {}",
            "•".yellow(),
            config_path.display().to_string().bright_white()
        );
        println!();

        let response = print_prompt("Overwrite it with the defaults? [y/N]:")?;
        println!();

        if response != "y" && response != "yes" {
            println!("{} Initialization cancelled.", "✗".red().bold());
            return Ok(());
        }
        println!("{} Proceeding with overwrite", "→".yellow().bold());
        println!();
    }

    println!("{} Writing default configuration...", "→".blue());
    let written = write_default_config(&config_dir)?;
    let model_path = config_dir.join(MODELS_DIR).join(MODEL_FILE_NAME);

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!();
    println!(
        "{} Config: {}",
        "✓".green().bold(),
        written.display().to_string().bright_white()
    );
    if model_path.exists() {
        println!(
            "{} Model: {}",
            "✓".green().bold(),
            model_path.display().to_string().bright_white()
        );
    } else {
        println!(
            "{} Copy your exported YOLO weights to {}",
            "ℹ".blue(),
            model_path.display().to_string().bright_white()
        );
    }
    println!();
    Ok(())
}

fn init_tracing() {
    // Logs go to stderr so they don't interleave with the summary on stdout
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .try_init();
}

/// Where `classify` sends its own lines. With `--format json` stdout carries
/// the summary alone, so everything else goes to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Console {
    format: ReportFormat,
}

impl Console {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    pub fn status(&self, line: impl Display) {
        match self.format {
            ReportFormat::Json => eprintln!("{}", line),
            ReportFormat::Text => println!("{}", line),
        }
    }
}

/// The end-of-run output of `classify`, split by stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifyOutput {
    pub stdout: String,
    pub stderr: String,
}

pub fn classify_output(
    summary: &RunSummary,
    results: &[ClassificationResult],
    report_path: &Path,
    archive_path: &Path,
    format: ReportFormat,
) -> ClassifyOutput {
    let rendered = render_summary(summary, results, format);
    let locations = format!(
        "{} Report: {}\n{} Archive: {}\n",
        "✓".green().bold(),
        report_path.display().to_string().bright_white(),
        "✓".green().bold(),
        archive_path.display().to_string().bright_white()
    );

    match format {
        ReportFormat::Json => ClassifyOutput {
            stdout: format!("{}\n", rendered.trim_end()),
            stderr: locations,
        },
        ReportFormat::Text => ClassifyOutput {
            stdout: format!("\n{}\n{}", rendered, locations),
            stderr: String::new(),
        },
    }
}

/// True when the parsed command line asks `classify` for JSON.
pub fn wants_json_output(matches: &ArgMatches) -> bool {
    matches!(
        matches.subcommand(),
        Some(("classify", sub)) if sub.get_one::<String>("format").map(String::as_str) == Some("json")
    )
}

pub async fn handle_classify(args: &ArgMatches, mut config: Config) -> Result<()> {
    init_tracing();

    ClassifyOverrides::from_args(args).apply(&mut config);
    let format = args
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let console = Console::new(format);

    let store = config.credential_store();
    let password = args
        .get_one::<String>("password")
        .cloned()
        .or_else(|| std::env::var(PASSWORD_ENV).ok());
    let session = authenticate(
        &store,
        args.get_one::<String>("user").map(String::as_str),
        password.as_deref(),
    )?;
    console.status(format!(
        "{} Logged in as: {}",
        "✓".green().bold(),
        session.require()?.bright_white()
    ));

    let input = args
        .get_one::<PathBuf>("input")
        .context("--input is required")?;
    let rows = read_input_rows(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    console.status(format!(
        "{} Loaded {} rows from {}",
        "✓".green().bold(),
        rows.len().to_string().cyan(),
        input.display().to_string().bright_white()
    ));
    for (i, row) in preview(&rows, PREVIEW_ROWS).iter().enumerate() {
        console.status(format!("  {:>3}  {}", i + 1, row.url));
    }

    let model = SharedModel::new(config.model_path(), config.input_size, config.iou_threshold);
    if !model.is_available() {
        bail!(
            "Model not found at {} (run `gedung init` and copy your weights there, or pass --model)",
            model.path().display()
        );
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Loading model {}", model.path().display()));
    let loaded = model.get().await;
    spinner.finish_and_clear();
    loaded.context("Failed to load model")?;
    console.status(format!("{} Model ready\n", "✓".green().bold()));

    let mut options = RunOptions::from_config(&config);
    options.show_progress_bar = true;

    let output = execute_run(options, &rows, &model, None).await?;

    let archive_path = args
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(default_archive_path);
    write_archive(&archive_path, &output.archive)?;
    info!(path = %archive_path.display(), bytes = output.archive.len(), "Archive written");

    let printed = classify_output(
        &output.summary,
        &output.results,
        &output.report_path,
        &archive_path,
        format,
    );
    print!("{}", printed.stdout);
    eprint!("{}", printed.stderr);
    Ok(())
}

pub fn default_archive_path() -> PathBuf {
    PathBuf::from(gedung_core::report::ARCHIVE_FILE_NAME)
}

/// Persist an in-memory archive, creating parent directories as needed.
pub fn write_archive(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn normalize_lines<'a>(
    normalizer: &UrlNormalizer,
    urls: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    urls.into_iter()
        .map(|url| normalizer.normalize(url.trim()))
        .collect()
}

pub fn handle_normalize(args: &ArgMatches, config: &Config) {
    let urls = args
        .get_many::<String>("URL")
        .map(|values| values.map(String::as_str).collect::<Vec<_>>())
        .unwrap_or_default();

    for line in normalize_lines(&config.normalizer(), urls) {
        println!("{}", line);
    }
}

pub fn handle_users(config: &Config) {
    let store = config.credential_store();
    println!(
        "{} {} account(s) configured:",
        "→".blue(),
        store.len().to_string().cyan()
    );
    for user in store.usernames() {
        println!("  {} {}", "•".blue(), user.bright_white());
    }
}
