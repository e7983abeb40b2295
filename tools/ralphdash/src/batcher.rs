use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// One event from the subprocess wrapper's ordered stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputEvent {
    Data {
        data: String,
    },
    Exit {
        #[serde(rename = "exitCode", default)]
        exit_code: Option<i32>,
    },
    Error {
        #[serde(default)]
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Exited,
    Errored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatcherConfig {
    /// Pending lines that force an immediate flush.
    pub batch_lines: usize,
    /// Longest a buffered line may wait before a flush.
    pub flush_delay: Duration,
    /// Retained published lines; oldest evicted first.
    pub max_lines: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            batch_lines: 50,
            flush_delay: Duration::from_millis(100),
            max_lines: 1000,
        }
    }
}

/// The externally visible output view. `lines` and `stripped_lines` move in
/// lockstep: same length, same order, same eviction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputState {
    pub lines: Vec<String>,
    pub stripped_lines: Vec<String>,
    pub is_running: bool,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

/// Batches a live character stream into bounded line buffers.
///
/// All batch state lives in this struct; `push_event`, `push_events`,
/// `set_running`, `flush`, `poll_flush`, and `clear` are the only mutators.
/// Time is injected so the flush policy is testable without timers: the
/// driver sleeps until `flush_deadline()` and then calls `poll_flush(now)`.
#[derive(Debug)]
pub struct BatcherState {
    cfg: BatcherConfig,
    phase: RunPhase,
    pending: Vec<String>,
    pending_stripped: Vec<String>,
    first_pending_at: Option<Instant>,
    state: OutputState,
}

impl BatcherState {
    pub fn new(cfg: BatcherConfig) -> Self {
        Self {
            cfg,
            phase: RunPhase::Idle,
            pending: Vec::new(),
            pending_stripped: Vec::new(),
            first_pending_at: None,
            state: OutputState::default(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn output(&self) -> &OutputState {
        &self.state
    }

    pub fn set_running(&mut self, running: bool) {
        self.state.is_running = running;
        if running && self.phase == RunPhase::Idle {
            self.phase = RunPhase::Running;
        }
    }

    pub fn push_events(&mut self, events: impl IntoIterator<Item = OutputEvent>, now: Instant) {
        for event in events {
            self.push_event(event, now);
        }
    }

    pub fn push_event(&mut self, event: OutputEvent, now: Instant) {
        match event {
            OutputEvent::Data { data } => self.push_data(&data, now),
            OutputEvent::Exit { exit_code } => {
                // Trailing output must land before the run is marked over.
                self.flush();
                self.state.is_running = false;
                self.state.exit_code = exit_code;
                self.phase = RunPhase::Exited;
            }
            OutputEvent::Error { message } => {
                // Advisory: the run may continue unless the caller also
                // marks it not-running.
                self.flush();
                self.state.error = Some(message);
                self.phase = RunPhase::Errored;
            }
        }
    }

    fn push_data(&mut self, text: &str, now: Instant) {
        if self.phase == RunPhase::Idle {
            self.phase = RunPhase::Running;
            self.state.is_running = true;
        }
        for fragment in text.split('\n') {
            if fragment.is_empty() {
                continue;
            }
            self.pending.push(fragment.to_string());
            self.pending_stripped.push(strip_ansi(fragment));
        }
        if self.pending.is_empty() {
            return;
        }
        if self.pending.len() >= self.cfg.batch_lines {
            // Count trigger: flush now, which also disarms the timer.
            self.flush();
        } else if self.first_pending_at.is_none() {
            // Single outstanding timer, armed by the first buffered line
            // and never re-armed while armed.
            self.first_pending_at = Some(now);
        }
    }

    /// When the delay trigger is due, if any lines are buffered.
    pub fn flush_deadline(&self) -> Option<Instant> {
        self.first_pending_at
            .map(|armed_at| armed_at + self.cfg.flush_delay)
    }

    pub fn poll_flush(&mut self, now: Instant) -> bool {
        match self.flush_deadline() {
            Some(deadline) if now >= deadline => {
                self.flush();
                true
            }
            _ => false,
        }
    }

    pub fn flush(&mut self) {
        self.first_pending_at = None;
        if self.pending.is_empty() {
            return;
        }
        self.state.lines.append(&mut self.pending);
        self.state.stripped_lines.append(&mut self.pending_stripped);
        let max = self.cfg.max_lines;
        if self.state.lines.len() > max {
            let excess = self.state.lines.len() - max;
            self.state.lines.drain(..excess);
            self.state.stripped_lines.drain(..excess);
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.pending_stripped.clear();
        self.first_pending_at = None;
        self.state = OutputState::default();
        self.phase = RunPhase::Idle;
    }
}

static ANSI_RE: OnceLock<Regex> = OnceLock::new();

fn ansi_re() -> &'static Regex {
    ANSI_RE.get_or_init(|| {
        // CSI sequences, then OSC sequences terminated by BEL or ST.
        Regex::new(concat!(
            r"\x1b\[[0-9;?]*[A-Za-z]",
            r"|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)",
        ))
        .expect("ansi pattern compiles")
    })
}

pub fn strip_ansi(text: &str) -> String {
    ansi_re().replace_all(text, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(text: &str) -> OutputEvent {
        OutputEvent::Data {
            data: text.to_string(),
        }
    }

    #[test]
    fn colored_line_keeps_raw_and_stripped_twins() {
        let mut batcher = BatcherState::new(BatcherConfig::default());
        let t0 = Instant::now();
        batcher.push_event(data("\x1b[31mERROR\x1b[0m\n"), t0);
        batcher.flush();

        assert_eq!(batcher.output().lines, vec!["\x1b[31mERROR\x1b[0m"]);
        assert_eq!(batcher.output().stripped_lines, vec!["ERROR"]);
    }

    #[test]
    fn osc_sequences_are_stripped() {
        assert_eq!(strip_ansi("\x1b]0;title\x07plain"), "plain");
        assert_eq!(strip_ansi("\x1b]8;;http://x\x1b\\link"), "link");
        assert_eq!(strip_ansi("no escapes"), "no escapes");
    }

    #[test]
    fn first_data_event_starts_the_run() {
        let mut batcher = BatcherState::new(BatcherConfig::default());
        assert_eq!(batcher.phase(), RunPhase::Idle);
        batcher.push_event(data("hello\n"), Instant::now());
        assert_eq!(batcher.phase(), RunPhase::Running);
        assert!(batcher.output().is_running);
    }

    #[test]
    fn set_running_enters_the_run_without_output() {
        let mut batcher = BatcherState::new(BatcherConfig::default());
        batcher.set_running(true);
        assert_eq!(batcher.phase(), RunPhase::Running);
        assert!(batcher.output().is_running);

        batcher.set_running(false);
        assert!(!batcher.output().is_running);
        // Phase stays Running: not-running is the caller's claim about the
        // subprocess, not a batch-state transition.
        assert_eq!(batcher.phase(), RunPhase::Running);
    }

    #[test]
    fn count_trigger_flushes_and_disarms_timer() {
        let mut batcher = BatcherState::new(BatcherConfig {
            batch_lines: 3,
            ..BatcherConfig::default()
        });
        let t0 = Instant::now();
        batcher.push_event(data("a\nb\n"), t0);
        assert!(batcher.flush_deadline().is_some());
        assert!(batcher.output().lines.is_empty());

        batcher.push_event(data("c\n"), t0);
        assert_eq!(batcher.output().lines, vec!["a", "b", "c"]);
        assert_eq!(batcher.flush_deadline(), None);
    }

    #[test]
    fn delay_trigger_fires_from_first_buffered_line() {
        let mut batcher = BatcherState::new(BatcherConfig::default());
        let t0 = Instant::now();
        batcher.push_event(data("slow\n"), t0);
        // Later lines must not push the deadline back.
        batcher.push_event(data("slower\n"), t0 + Duration::from_millis(60));

        assert!(!batcher.poll_flush(t0 + Duration::from_millis(99)));
        assert!(batcher.output().lines.is_empty());
        assert!(batcher.poll_flush(t0 + Duration::from_millis(100)));
        assert_eq!(batcher.output().lines, vec!["slow", "slower"]);
        assert_eq!(batcher.flush_deadline(), None);
    }

    #[test]
    fn exit_flushes_trailing_output_before_recording_code() {
        let mut batcher = BatcherState::new(BatcherConfig::default());
        let t0 = Instant::now();
        batcher.push_event(data("last words\n"), t0);
        batcher.push_event(OutputEvent::Exit { exit_code: Some(2) }, t0);

        assert_eq!(batcher.output().lines, vec!["last words"]);
        assert!(!batcher.output().is_running);
        assert_eq!(batcher.output().exit_code, Some(2));
        assert_eq!(batcher.phase(), RunPhase::Exited);
    }

    #[test]
    fn error_event_is_advisory_not_terminal() {
        let mut batcher = BatcherState::new(BatcherConfig::default());
        let t0 = Instant::now();
        batcher.push_event(data("working\n"), t0);
        batcher.push_event(
            OutputEvent::Error {
                message: "spawn hiccup".to_string(),
            },
            t0,
        );

        assert_eq!(batcher.output().lines, vec!["working"]);
        assert_eq!(batcher.output().error.as_deref(), Some("spawn hiccup"));
        assert!(batcher.output().is_running);

        batcher.push_event(data("still going\n"), t0);
        batcher.flush();
        assert_eq!(batcher.output().lines.len(), 2);
    }

    #[test]
    fn buffers_stay_parallel_and_capped() {
        let mut batcher = BatcherState::new(BatcherConfig {
            batch_lines: 10,
            max_lines: 5,
            ..BatcherConfig::default()
        });
        let t0 = Instant::now();
        for i in 0..23 {
            batcher.push_event(data(&format!("\x1b[32mline {i}\x1b[0m\n")), t0);
        }
        batcher.flush();

        let out = batcher.output();
        assert_eq!(out.lines.len(), out.stripped_lines.len());
        assert_eq!(out.lines.len(), 5);
        // Oldest evicted, newest retained.
        assert_eq!(out.stripped_lines[4], "line 22");
        assert_eq!(out.stripped_lines[0], "line 18");
    }

    #[test]
    fn empty_fragments_are_dropped() {
        let mut batcher = BatcherState::new(BatcherConfig::default());
        batcher.push_event(data("\n\na\n\nb\n"), Instant::now());
        batcher.flush();
        assert_eq!(batcher.output().lines, vec!["a", "b"]);
    }

    #[test]
    fn events_apply_in_arrival_order() {
        let mut batcher = BatcherState::new(BatcherConfig::default());
        batcher.push_events(
            [
                data("one\n"),
                data("two\n"),
                OutputEvent::Exit { exit_code: Some(0) },
            ],
            Instant::now(),
        );
        assert_eq!(batcher.output().lines, vec!["one", "two"]);
        assert_eq!(batcher.output().exit_code, Some(0));
    }

    #[test]
    fn clear_resets_buffers_timer_and_phase() {
        let mut batcher = BatcherState::new(BatcherConfig::default());
        let t0 = Instant::now();
        batcher.push_event(data("a\n"), t0);
        batcher.push_event(OutputEvent::Exit { exit_code: Some(1) }, t0);
        batcher.clear();

        assert_eq!(batcher.output(), &OutputState::default());
        assert_eq!(batcher.phase(), RunPhase::Idle);
        assert_eq!(batcher.flush_deadline(), None);
    }

    #[test]
    fn events_deserialize_from_wrapper_json() {
        let event: OutputEvent =
            serde_json::from_str(r#"{"type":"data","data":"hi\n"}"#).expect("data");
        assert_eq!(event, OutputEvent::Data { data: "hi\n".to_string() });

        let event: OutputEvent =
            serde_json::from_str(r#"{"type":"exit","exitCode":3}"#).expect("exit");
        assert_eq!(event, OutputEvent::Exit { exit_code: Some(3) });

        let event: OutputEvent = serde_json::from_str(r#"{"type":"exit"}"#).expect("exit");
        assert_eq!(event, OutputEvent::Exit { exit_code: None });

        let event: OutputEvent =
            serde_json::from_str(r#"{"type":"error","message":"boom"}"#).expect("error");
        assert_eq!(
            event,
            OutputEvent::Error {
                message: "boom".to_string()
            }
        );
    }
}
