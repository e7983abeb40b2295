use crate::types::RunStatus;
use std::fs;
use std::path::{Path, PathBuf};

pub const STATUS_PREFIX: &str = "ralph-status-";
pub const STATUS_SUFFIX: &str = ".json";

/// Enumerate status file candidates by naming convention. Sorted by file
/// name so the "first seen" tie-break in `latest_by_mtime` is stable.
pub fn status_candidates(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut candidates = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(STATUS_PREFIX) && name.ends_with(STATUS_SUFFIX))
        })
        .collect::<Vec<_>>();
    candidates.sort();
    candidates
}

/// The candidate with the greatest modification time. A candidate that fails
/// to stat (deleted between enumeration and stat) is excluded, not an error.
/// Ties keep the first-seen candidate.
pub fn latest_by_mtime(candidates: &[PathBuf]) -> Option<PathBuf> {
    let mut latest: Option<(PathBuf, std::time::SystemTime)> = None;
    for candidate in candidates {
        let Ok(metadata) = fs::metadata(candidate) else {
            continue;
        };
        let Ok(mtime) = metadata.modified() else {
            continue;
        };
        let newer = match &latest {
            Some((_, best)) => mtime > *best,
            None => true,
        };
        if newer {
            latest = Some((candidate.clone(), mtime));
        }
    }
    latest.map(|(path, _)| path)
}

/// Reads the freshest status file, riding out the loop's non-atomic writes.
///
/// No candidate file means the loop is not running (`None`). A candidate
/// that exists but fails to parse was caught mid-write; the last
/// successfully-parsed value is returned instead.
#[derive(Debug)]
pub struct StatusReader {
    status_dir: PathBuf,
    last_good: Option<RunStatus>,
    published: Option<RunStatus>,
}

impl StatusReader {
    pub fn new(status_dir: impl Into<PathBuf>) -> Self {
        Self {
            status_dir: status_dir.into(),
            last_good: None,
            published: None,
        }
    }

    pub fn read(&mut self) -> Option<RunStatus> {
        let candidates = status_candidates(&self.status_dir);
        let path = latest_by_mtime(&candidates)?;
        let parsed = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<RunStatus>(&raw).ok());
        match parsed {
            Some(status) => {
                self.last_good = Some(status.clone());
                Some(status)
            }
            None => self.last_good.clone(),
        }
    }

    /// Re-read and report whether the value to publish changed. Redundant
    /// re-renders are the caller's cost, so equal values are suppressed.
    pub fn poll(&mut self) -> bool {
        let current = self.read();
        if current == self.published {
            return false;
        }
        self.published = current;
        true
    }

    pub fn current(&self) -> Option<&RunStatus> {
        self.published.as_ref()
    }
}
