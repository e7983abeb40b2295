use crate::batcher::BatcherConfig;
use crate::errors::DashError;
use crate::types::DashboardMode;
use crate::watcher::WatcherConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub status_dir: Option<PathBuf>,
    pub mode: Option<DashboardMode>,
    pub poll_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub watch: WatchConfig,
    pub output: OutputConfig,
    pub status: StatusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathsConfig {
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchConfig {
    pub debounce_ms: u64,
    pub poll_interval_ms: u64,
    pub native: bool,
    pub polling: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputConfig {
    pub batch_lines: usize,
    pub flush_delay_ms: u64,
    pub max_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusConfig {
    pub dir: Option<PathBuf>,
    pub poll_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig { root: None },
            watch: WatchConfig {
                debounce_ms: 200,
                poll_interval_ms: 1000,
                native: true,
                polling: true,
            },
            output: OutputConfig {
                batch_lines: 50,
                flush_delay_ms: 100,
                max_lines: 1000,
            },
            status: StatusConfig {
                dir: None,
                poll_interval_ms: 1000,
            },
        }
    }
}

impl AppConfig {
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            debounce: Duration::from_millis(self.watch.debounce_ms),
            poll_interval: Duration::from_millis(self.watch.poll_interval_ms),
            native: self.watch.native,
            polling: self.watch.polling,
        }
    }

    pub fn batcher_config(&self) -> BatcherConfig {
        BatcherConfig {
            batch_lines: self.output.batch_lines,
            flush_delay: Duration::from_millis(self.output.flush_delay_ms),
            max_lines: self.output.max_lines,
        }
    }

    pub fn status_dir(&self, overrides: &CliOverrides) -> PathBuf {
        overrides
            .status_dir
            .clone()
            .or_else(|| self.status.dir.clone())
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PartialAppConfig {
    paths: Option<PartialPathsConfig>,
    watch: Option<PartialWatchConfig>,
    output: Option<PartialOutputConfig>,
    status: Option<PartialStatusConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PartialPathsConfig {
    root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PartialWatchConfig {
    debounce_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    native: Option<bool>,
    polling: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PartialOutputConfig {
    batch_lines: Option<usize>,
    flush_delay_ms: Option<u64>,
    max_lines: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PartialStatusConfig {
    dir: Option<PathBuf>,
    poll_interval_ms: Option<u64>,
}

/// Defaults, then the TOML file, then CLI flags; the resolved watch root is
/// returned alongside the config.
pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
) -> Result<(AppConfig, PathBuf), DashError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let contents =
            std::fs::read_to_string(path).map_err(|e| DashError::Io(e.to_string()))?;
        let partial: PartialAppConfig =
            toml::from_str(&contents).map_err(|e| DashError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;

    let root = overrides
        .root
        .clone()
        .or_else(|| cfg.paths.root.clone())
        .unwrap_or_else(|| process_cwd.to_path_buf());
    Ok((cfg, root))
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(paths) = partial.paths {
        if let Some(root) = paths.root {
            cfg.paths.root = Some(root);
        }
    }

    if let Some(watch) = partial.watch {
        if let Some(value) = watch.debounce_ms {
            cfg.watch.debounce_ms = value;
        }
        if let Some(value) = watch.poll_interval_ms {
            cfg.watch.poll_interval_ms = value;
        }
        if let Some(value) = watch.native {
            cfg.watch.native = value;
        }
        if let Some(value) = watch.polling {
            cfg.watch.polling = value;
        }
    }

    if let Some(output) = partial.output {
        if let Some(value) = output.batch_lines {
            cfg.output.batch_lines = value;
        }
        if let Some(value) = output.flush_delay_ms {
            cfg.output.flush_delay_ms = value;
        }
        if let Some(value) = output.max_lines {
            cfg.output.max_lines = value;
        }
    }

    if let Some(status) = partial.status {
        if let Some(dir) = status.dir {
            cfg.status.dir = Some(dir);
        }
        if let Some(value) = status.poll_interval_ms {
            cfg.status.poll_interval_ms = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if overrides.poll_only {
        cfg.watch.native = false;
        cfg.watch.polling = true;
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), DashError> {
    if cfg.watch.debounce_ms == 0 {
        return Err(DashError::InvalidConfig(
            "watch.debounce_ms must be positive".to_string(),
        ));
    }
    if cfg.watch.poll_interval_ms == 0 || cfg.status.poll_interval_ms == 0 {
        return Err(DashError::InvalidConfig(
            "poll intervals must be positive".to_string(),
        ));
    }
    if !cfg.watch.native && !cfg.watch.polling {
        return Err(DashError::InvalidConfig(
            "at least one of watch.native and watch.polling must be enabled".to_string(),
        ));
    }
    if cfg.output.batch_lines == 0 {
        return Err(DashError::InvalidConfig(
            "output.batch_lines must be positive".to_string(),
        ));
    }
    if cfg.output.flush_delay_ms == 0 {
        return Err(DashError::InvalidConfig(
            "output.flush_delay_ms must be positive".to_string(),
        ));
    }
    if cfg.output.max_lines == 0 {
        return Err(DashError::InvalidConfig(
            "output.max_lines must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_root_to_cwd() {
        let overrides = CliOverrides::default();
        let (cfg, root) = load_config(&overrides, Path::new("/work")).expect("load");
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(root, PathBuf::from("/work"));
    }

    #[test]
    fn toml_file_merges_over_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ralphdash.toml");
        std::fs::write(
            &path,
            "[watch]\ndebounce_ms = 350\n\n[output]\nmax_lines = 200\n\n[paths]\nroot = \"/loop\"\n",
        )
        .expect("write config");

        let overrides = CliOverrides {
            config_path: Some(path),
            ..CliOverrides::default()
        };
        let (cfg, root) = load_config(&overrides, Path::new("/work")).expect("load");
        assert_eq!(cfg.watch.debounce_ms, 350);
        assert_eq!(cfg.watch.poll_interval_ms, 1000);
        assert_eq!(cfg.output.max_lines, 200);
        assert_eq!(root, PathBuf::from("/loop"));
    }

    #[test]
    fn cli_root_beats_config_root() {
        let overrides = CliOverrides {
            root: Some(PathBuf::from("/cli")),
            ..CliOverrides::default()
        };
        let (_, root) = load_config(&overrides, Path::new("/work")).expect("load");
        assert_eq!(root, PathBuf::from("/cli"));
    }

    #[test]
    fn poll_only_disables_native_watch() {
        let overrides = CliOverrides {
            poll_only: true,
            ..CliOverrides::default()
        };
        let (cfg, _) = load_config(&overrides, Path::new("/work")).expect("load");
        assert!(!cfg.watch.native);
        assert!(cfg.watch.polling);
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ralphdash.toml");
        std::fs::write(&path, "[watch]\ndebounce_ms = 0\n").expect("write config");

        let overrides = CliOverrides {
            config_path: Some(path),
            ..CliOverrides::default()
        };
        let err = load_config(&overrides, Path::new("/work")).expect_err("must reject");
        assert!(matches!(err, DashError::InvalidConfig(message) if message.contains("debounce")));
    }

    #[test]
    fn disabling_both_producers_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ralphdash.toml");
        std::fs::write(&path, "[watch]\nnative = false\npolling = false\n").expect("write config");

        let overrides = CliOverrides {
            config_path: Some(path),
            ..CliOverrides::default()
        };
        let err = load_config(&overrides, Path::new("/work")).expect_err("must reject");
        assert!(matches!(err, DashError::InvalidConfig(_)));
    }

    #[test]
    fn status_dir_falls_back_to_temp() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.status_dir(&CliOverrides::default()), std::env::temp_dir());

        let overrides = CliOverrides {
            status_dir: Some(PathBuf::from("/custom")),
            ..CliOverrides::default()
        };
        assert_eq!(cfg.status_dir(&overrides), PathBuf::from("/custom"));
    }
}
