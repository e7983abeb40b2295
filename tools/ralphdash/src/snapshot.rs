use crate::batcher::OutputState;
use crate::reconcile::AggregatedStats;
use crate::types::{DashboardMode, RunStatus};

/// Mutable composition root: each update source lands here, and a render
/// tick takes one immutable snapshot of the whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub mode: DashboardMode,
    pub stats: Option<AggregatedStats>,
    pub run: Option<RunStatus>,
}

impl DashboardState {
    pub fn new(mode: DashboardMode) -> Self {
        Self {
            mode,
            stats: None,
            run: None,
        }
    }

    /// A failed reload (`None`) keeps the previous stats; stale data is only
    /// ever replaced by fresher data.
    pub fn apply_stats(&mut self, reloaded: Option<AggregatedStats>) {
        if let Some(stats) = reloaded {
            self.stats = Some(stats);
        }
    }

    /// `None` is a real state here: no status file means the loop stopped.
    pub fn apply_status(&mut self, status: Option<RunStatus>) {
        self.run = status;
    }

    pub fn snapshot(&self, output: &OutputState) -> DashboardSnapshot {
        DashboardSnapshot {
            mode: self.mode,
            stats: self.stats.clone(),
            run: self.run.clone(),
            output: output.clone(),
        }
    }
}

/// One immutable view per render tick. The mode only tells the view layer
/// which fields to feature; nothing below this struct knows about modes.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    pub mode: DashboardMode,
    pub stats: Option<AggregatedStats>,
    pub run: Option<RunStatus>,
    pub output: OutputState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_reload_keeps_previous_stats() {
        let mut state = DashboardState::new(DashboardMode::Live);
        state.apply_stats(Some(AggregatedStats {
            total: 3,
            completed: 1,
            ..AggregatedStats::default()
        }));
        state.apply_stats(None);
        assert_eq!(state.stats.as_ref().map(|s| s.total), Some(3));
    }

    #[test]
    fn status_none_means_not_running() {
        let mut state = DashboardState::new(DashboardMode::Live);
        state.apply_status(Some(RunStatus {
            is_running: true,
            ..RunStatus::default()
        }));
        state.apply_status(None);
        assert_eq!(state.run, None);
    }

    #[test]
    fn snapshot_carries_mode_and_all_three_sources() {
        let mut state = DashboardState::new(DashboardMode::Iteration);
        state.apply_stats(Some(AggregatedStats::default()));
        state.apply_status(Some(RunStatus::default()));

        let output = OutputState {
            lines: vec!["x".to_string()],
            stripped_lines: vec!["x".to_string()],
            ..OutputState::default()
        };
        let snapshot = state.snapshot(&output);
        assert_eq!(snapshot.mode, DashboardMode::Iteration);
        assert!(snapshot.stats.is_some());
        assert!(snapshot.run.is_some());
        assert_eq!(snapshot.output.lines.len(), 1);
    }
}
