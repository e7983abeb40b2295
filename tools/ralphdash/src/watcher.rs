use crate::logging::JsonlLogger;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use serde_json::json;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Debounce window over a burst of change notifications. Pure and
/// clock-injected: the driver owns the actual timer.
#[derive(Debug)]
pub struct DebounceState {
    delay: Duration,
    deadline: Option<Instant>,
}

impl DebounceState {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Any notification restarts the window; a burst collapses into one
    /// deadline at quiescence + delay.
    pub fn notify(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True at most once per quiescent period.
    pub fn fire_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub debounce: Duration,
    pub poll_interval: Duration,
    /// Subscribe to native change notifications.
    pub native: bool,
    /// Unconditional interval reloads; may run alongside native watch as a
    /// correctness backstop since reloads are idempotent.
    pub polling: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            poll_interval: Duration::from_millis(1000),
            native: true,
            polling: true,
        }
    }
}

/// Turns bursty filesystem notifications on the task index and stories tree
/// into single reload requests on `reload_tx`.
///
/// Each native subscription failure degrades independently: losing the index
/// watch keeps the stories watch, and polling covers whatever native watch
/// cannot. Dropping (or `stop`ping) the handle aborts the task, which
/// cancels the pending debounce sleep and closes the notify subscription.
#[derive(Debug)]
pub struct FileWatcher {
    task: tokio::task::JoinHandle<()>,
}

impl FileWatcher {
    pub fn spawn(
        index_path: PathBuf,
        stories_dir: PathBuf,
        cfg: WatcherConfig,
        reload_tx: mpsc::Sender<()>,
        logger: Option<JsonlLogger>,
    ) -> Self {
        let task = tokio::spawn(async move {
            run_watch_loop(index_path, stories_dir, cfg, reload_tx, logger).await;
        });
        Self { task }
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_watch_loop(
    index_path: PathBuf,
    stories_dir: PathBuf,
    cfg: WatcherConfig,
    reload_tx: mpsc::Sender<()>,
    logger: Option<JsonlLogger>,
) {
    let (notify_tx, mut notify_rx) = mpsc::channel::<()>(64);
    // Keep one sender alive locally so `recv` never reports closed when
    // native watch is disabled or failed to set up.
    let _notify_keepalive = notify_tx.clone();

    let _native_watcher = if cfg.native {
        setup_native_watch(&index_path, &stories_dir, notify_tx, logger.as_ref())
    } else {
        None
    };

    let mut debounce = DebounceState::new(cfg.debounce);
    let mut poll_tick = tokio::time::interval(cfg.poll_interval);
    poll_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        let deadline = debounce.deadline();
        tokio::select! {
            changed = notify_rx.recv() => {
                match changed {
                    Some(()) => debounce.notify(Instant::now()),
                    None => break,
                }
            }
            _ = tokio::time::sleep_until(
                tokio::time::Instant::from_std(deadline.unwrap_or_else(Instant::now))
            ), if deadline.is_some() => {
                if debounce.fire_due(Instant::now()) && reload_tx.send(()).await.is_err() {
                    break;
                }
            }
            _ = poll_tick.tick(), if cfg.polling => {
                if reload_tx.send(()).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn setup_native_watch(
    index_path: &std::path::Path,
    stories_dir: &std::path::Path,
    notify_tx: mpsc::Sender<()>,
    logger: Option<&JsonlLogger>,
) -> Option<notify::RecommendedWatcher> {
    let watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res {
            if matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                // Full channel means a reload is already queued up.
                let _ = notify_tx.try_send(());
            }
        }
    });
    let mut watcher = match watcher {
        Ok(watcher) => watcher,
        Err(error) => {
            if let Some(logger) = logger {
                logger.append_soft(
                    "warn",
                    "watch.native.unavailable",
                    json!({"error": error.to_string()}),
                );
            }
            return None;
        }
    };

    // One failed subscription must not block the other; polling covers
    // whichever never comes up.
    if let Err(error) = watcher.watch(index_path, RecursiveMode::NonRecursive) {
        if let Some(logger) = logger {
            logger.append_soft(
                "warn",
                "watch.subscribe.failed",
                json!({"path": index_path.display().to_string(), "error": error.to_string()}),
            );
        }
    }
    if let Err(error) = watcher.watch(stories_dir, RecursiveMode::Recursive) {
        if let Some(logger) = logger {
            logger.append_soft(
                "warn",
                "watch.subscribe.failed",
                json!({"path": stories_dir.display().to_string(), "error": error.to_string()}),
            );
        }
    }
    Some(watcher)
}
