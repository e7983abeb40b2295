use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub text: String,
    #[serde(default)]
    pub checked: bool,
}

/// One unit of loop work, written by the loop as `stories/<id>.json`.
/// Lenient defaults: the loop rewrites these files in place, so a read can
/// observe an older or partially-populated document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub passes: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub completed: usize,
    #[serde(default)]
    pub pending: usize,
    #[serde(default)]
    pub blocked: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskIndex {
    #[serde(default)]
    pub story_order: Vec<String>,
    #[serde(default)]
    pub pending: Vec<String>,
    #[serde(default)]
    pub blocked: Vec<String>,
    #[serde(default)]
    pub next_story: Option<String>,
    #[serde(default)]
    pub stats: Option<IndexStats>,
}

impl TaskIndex {
    /// Story counts for display. The `stats` object is a writer-side cache;
    /// when absent the counts are derived from the id arrays. The completed
    /// count clamps at zero because `pending`/`blocked` can transiently
    /// exceed `storyOrder` mid-update.
    pub fn effective_stats(&self) -> IndexStats {
        self.stats.unwrap_or_else(|| self.derived_stats())
    }

    pub fn derived_stats(&self) -> IndexStats {
        let total = self.story_order.len();
        let pending = self.pending.len();
        let blocked = self.blocked.len();
        IndexStats {
            total,
            completed: total.saturating_sub(pending + blocked),
            pending,
            blocked,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub iteration: u32,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardMode {
    #[default]
    Startup,
    Iteration,
    Live,
}

impl DashboardMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Iteration => "iteration",
            Self::Live => "live",
        }
    }
}
