pub mod batcher;
pub mod config;
pub mod errors;
pub mod logging;
pub mod reconcile;
pub mod runtime;
pub mod snapshot;
pub mod status;
pub mod tui;
pub mod types;
pub mod watcher;

use batcher::{BatcherState, OutputEvent, OutputState};
use clap::{error::ErrorKind, CommandFactory, Parser, ValueEnum};
use config::{load_config, AppConfig, CliOverrides};
use errors::DashError;
use logging::JsonlLogger;
use runtime::{ProductionTerminal, Terminal};
use serde_json::json;
use snapshot::DashboardState;
use status::StatusReader;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use types::DashboardMode;
use watcher::FileWatcher;

#[derive(Debug, Clone, Parser)]
#[command(name = "ralphdash")]
#[command(about = "Terminal dashboard for the Ralph task loop")]
pub struct Cli {
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub root: Option<PathBuf>,
    #[arg(long = "status-dir")]
    pub status_dir: Option<PathBuf>,
    #[arg(long, value_enum)]
    pub mode: Option<CliMode>,
    #[arg(long, default_value_t = false)]
    pub once: bool,
    #[arg(long = "poll-only", default_value_t = false)]
    pub poll_only: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliMode {
    Startup,
    Iteration,
    Live,
}

impl From<CliMode> for DashboardMode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Startup => DashboardMode::Startup,
            CliMode::Iteration => DashboardMode::Iteration,
            CliMode::Live => DashboardMode::Live,
        }
    }
}

pub fn run() -> Result<i32, DashError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| DashError::Io(e.to_string()))?;
    let terminal = ProductionTerminal;
    run_with_runtime(&args, &cwd, &terminal)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &Path,
    terminal: &dyn Terminal,
) -> Result<i32, DashError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(DashError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        root: cli.root.clone(),
        status_dir: cli.status_dir.clone(),
        mode: cli.mode.map(Into::into),
        poll_only: cli.poll_only,
    };

    let (cfg, root) = load_config(&overrides, cwd)?;
    let status_dir = cfg.status_dir(&overrides);
    let mode = overrides.mode.unwrap_or(DashboardMode::Live);

    if cli.once {
        return run_once(&root, status_dir, mode, terminal);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| DashError::Io(e.to_string()))?;
    runtime.block_on(run_dashboard(&cfg, &root, status_dir, mode, terminal))
}

/// One reconciled snapshot as plain lines, then exit. The headless escape
/// hatch for pipes and smoke tests.
fn run_once(
    root: &Path,
    status_dir: PathBuf,
    mode: DashboardMode,
    terminal: &dyn Terminal,
) -> Result<i32, DashError> {
    let mut view = DashboardState::new(mode);
    view.apply_stats(reconcile::reload(root));

    let mut status_reader = StatusReader::new(status_dir);
    status_reader.poll();
    view.apply_status(status_reader.current().cloned());

    let snapshot = view.snapshot(&OutputState::default());
    terminal.write_line(&tui::render_plain(&snapshot))?;
    Ok(0)
}

async fn run_dashboard(
    cfg: &AppConfig,
    root: &Path,
    status_dir: PathBuf,
    mode: DashboardMode,
    terminal: &dyn Terminal,
) -> Result<i32, DashError> {
    let logger = JsonlLogger::new(logging::run_log_path(root));
    logger.append_soft(
        "info",
        "dashboard.start",
        json!({"root": root.display().to_string(), "mode": mode.as_str()}),
    );

    let (reload_tx, mut reload_rx) = mpsc::channel::<()>(8);
    let watcher = FileWatcher::spawn(
        reconcile::index_path(root),
        reconcile::stories_dir(root),
        cfg.watcher_config(),
        reload_tx,
        Some(logger.clone()),
    );

    let mut status_reader = StatusReader::new(status_dir);
    let mut batcher = BatcherState::new(cfg.batcher_config());
    let mut view = DashboardState::new(mode);

    // When stdin is a pipe it carries the subprocess wrapper's event stream;
    // when it is a tty it carries hotkeys instead.
    let interactive = terminal.stdin_is_tty();
    let (out_tx, mut out_rx) = mpsc::channel::<OutputEvent>(256);
    let mut stream_open = !interactive;
    if stream_open {
        tokio::spawn(read_stdin_events(out_tx));
    } else {
        drop(out_tx);
    }

    let mut status_tick = tokio::time::interval(cfg.status_poll_interval());
    status_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut render_tick = tokio::time::interval(Duration::from_millis(100));
    render_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut dirty = true;

    loop {
        let flush_at = batcher.flush_deadline();
        tokio::select! {
            request = reload_rx.recv() => {
                if request.is_none() {
                    break;
                }
                view.apply_stats(reconcile::reload(root));
                dirty = true;
            }
            _ = status_tick.tick() => {
                if status_reader.poll() {
                    view.apply_status(status_reader.current().cloned());
                    dirty = true;
                }
            }
            event = out_rx.recv(), if stream_open => {
                match event {
                    Some(event) => {
                        batcher.push_event(event, Instant::now());
                        dirty = true;
                    }
                    None => {
                        // Wrapper hung up: publish what is buffered and,
                        // with no tty to take a quit key, end the run.
                        stream_open = false;
                        batcher.flush();
                        dirty = true;
                        break;
                    }
                }
            }
            _ = tokio::time::sleep_until(
                tokio::time::Instant::from_std(flush_at.unwrap_or_else(Instant::now))
            ), if flush_at.is_some() => {
                if batcher.poll_flush(Instant::now()) {
                    dirty = true;
                }
            }
            _ = render_tick.tick() => {
                if interactive && handle_input(&mut batcher)? {
                    break;
                }
                if dirty {
                    let snapshot = view.snapshot(batcher.output());
                    let (width, height) = crossterm::terminal::size().unwrap_or((100, 30));
                    terminal.draw(&tui::render_dashboard(&snapshot, width, height))?;
                    dirty = false;
                }
            }
        }
    }

    watcher.stop();
    let exit_code = batcher.output().exit_code.unwrap_or(0);
    logger.append_soft("info", "dashboard.stop", json!({"exit_code": exit_code}));
    Ok(exit_code)
}

async fn read_stdin_events(tx: mpsc::Sender<OutputEvent>) {
    use tokio::io::AsyncBufReadExt;
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(event) = serde_json::from_str::<OutputEvent>(&line) else {
            continue;
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }
}

fn handle_input(batcher: &mut BatcherState) -> Result<bool, DashError> {
    use crossterm::event::{self, Event, KeyCode};
    while event::poll(Duration::from_millis(0)).map_err(|e| DashError::Io(e.to_string()))? {
        let Event::Key(key) = event::read().map_err(|e| DashError::Io(e.to_string()))? else {
            continue;
        };
        let KeyCode::Char(c) = key.code else {
            continue;
        };
        match tui::handle_key(c) {
            "quit" => return Ok(true),
            "clear-output" => batcher.clear(),
            _ => {}
        }
    }
    Ok(false)
}

pub fn render_help() -> String {
    let mut cmd = Cli::command();
    let mut buffer = Vec::new();
    cmd.write_long_help(&mut buffer).expect("write help to vec");
    String::from_utf8(buffer).expect("utf8")
}
