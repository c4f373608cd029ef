//! Worker configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, an optional
//! TOML file named by `OCL_CONFIG`, and the `OCL_DATA_PATH` / `OCL_MAX_TASKS`
//! environment variables. Log filtering is left to `RUST_LOG`.

use std::path::{Path, PathBuf};

use ocl_core::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::error::{WorkerError, WorkerResult};

/// Names the TOML configuration file.
pub const CONFIG_ENV: &str = "OCL_CONFIG";
/// Overrides [`WorkerConfig::data_path`].
pub const DATA_PATH_ENV: &str = "OCL_DATA_PATH";
/// Overrides [`WorkerConfig::max_tasks`].
pub const MAX_TASKS_ENV: &str = "OCL_MAX_TASKS";

const DEFAULT_DATA_PATH: &str = "data/ocl-snapshot.json";
const DEFAULT_MAX_TASKS: usize = 4;

/// Configuration of the worker binary and task runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// JSON snapshot of the content graph, loaded at start and saved at exit.
    pub data_path: PathBuf,
    /// Tasks allowed to run at once.
    pub max_tasks: usize,
    /// Run the collection expansions job at start.
    pub ensure_expansions_on_start: bool,
    /// Store settings.
    pub engine: EngineConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            max_tasks: DEFAULT_MAX_TASKS,
            ensure_expansions_on_start: true,
            engine: EngineConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Loads the configuration from the process environment.
    pub fn load() -> WorkerResult<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Reads a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> WorkerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|source| WorkerError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> WorkerResult<()> {
        if let Some(path) = lookup(DATA_PATH_ENV) {
            self.data_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(MAX_TASKS_ENV) {
            self.max_tasks = raw
                .trim()
                .parse()
                .ok()
                .filter(|count: &usize| *count > 0)
                .ok_or(WorkerError::InvalidEnv {
                    name: MAX_TASKS_ENV,
                    value: raw,
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_tasks, 4);
        assert_eq!(config.data_path, PathBuf::from("data/ocl-snapshot.json"));
        assert_eq!(config.engine.cascade_max_results, Some(1000));
    }

    #[test]
    fn test_from_file_keeps_missing_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "data_path = \"/var/lib/ocl/graph.json\"\n\n[engine]\ncascade_max_results = 50"
        )
        .unwrap();

        let config = WorkerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.data_path, PathBuf::from("/var/lib/ocl/graph.json"));
        assert_eq!(config.engine.cascade_max_results, Some(50));
        assert!(config.engine.skip_unchanged_writes);
        assert_eq!(config.max_tasks, 4);
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_tasks = \"many\"").unwrap();
        assert!(matches!(
            WorkerConfig::from_file(file.path()),
            Err(WorkerError::Config { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = WorkerConfig::default();
        config
            .apply_env(env(&[(DATA_PATH_ENV, "/tmp/graph.json"), (MAX_TASKS_ENV, "8")]))
            .unwrap();
        assert_eq!(config.data_path, PathBuf::from("/tmp/graph.json"));
        assert_eq!(config.max_tasks, 8);

        for bad in ["0", "lots"] {
            let result = config.apply_env(env(&[(MAX_TASKS_ENV, bad)]));
            assert!(matches!(result, Err(WorkerError::InvalidEnv { .. })), "{bad}");
        }
    }
}
