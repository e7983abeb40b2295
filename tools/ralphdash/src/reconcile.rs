use crate::types::{Story, TaskIndex};
use std::fs;
use std::path::{Path, PathBuf};

pub fn index_path(root: &Path) -> PathBuf {
    root.join("index.json")
}

pub fn stories_dir(root: &Path) -> PathBuf {
    root.join("stories")
}

pub fn story_path(root: &Path, id: &str) -> PathBuf {
    stories_dir(root).join(format!("{id}.json"))
}

/// Everything the dashboard shows about loop progress, recomputed from
/// scratch on every reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub blocked: usize,
    pub total_criteria: usize,
    pub checked_criteria: usize,
    pub current_story: Option<Story>,
    pub next_story_id: Option<String>,
}

/// Reconcile on-disk task state into `AggregatedStats`.
///
/// `None` means the index is missing or unparsable; the caller keeps its
/// previous stats rather than resetting to zero. Per-story failures never
/// propagate: the loop rewrites story files while we read them, and one
/// torn file must not blank out the rest of the aggregation.
pub fn reload(root: &Path) -> Option<AggregatedStats> {
    let raw = fs::read_to_string(index_path(root)).ok()?;
    let index: TaskIndex = serde_json::from_str(&raw).ok()?;

    let counts = index.effective_stats();
    let mut stats = AggregatedStats {
        total: counts.total,
        completed: counts.completed,
        pending: counts.pending,
        blocked: counts.blocked,
        next_story_id: index.next_story.clone(),
        ..AggregatedStats::default()
    };

    stats.current_story = index
        .next_story
        .as_deref()
        .and_then(|id| load_story(root, id));

    for id in &index.story_order {
        let Some(story) = load_story(root, id) else {
            continue;
        };
        stats.total_criteria += story.acceptance_criteria.len();
        stats.checked_criteria += story
            .acceptance_criteria
            .iter()
            .filter(|criterion| criterion.checked)
            .count();
    }

    Some(stats)
}

fn load_story(root: &Path, id: &str) -> Option<Story> {
    let raw = fs::read_to_string(story_path(root, id)).ok()?;
    serde_json::from_str(&raw).ok()
}
