use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{LogQueryError, Result};

/// Environment variable naming the log directory.
pub const LOGS_DIR_ENV: &str = "LOGS_DIR";
/// Environment variable naming an optional YAML/JSON config file.
pub const CONFIG_ENV: &str = "LOGSCRIBE_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    #[default]
    Stdio,
    Http,
    Both,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub mode: ServerMode,
    pub http_addr: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mode: ServerMode::Stdio,
            http_addr: "127.0.0.1".to_string(),
            http_port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSourceConfig {
    pub log_dir: Option<PathBuf>,
    pub file_pattern: String,
}

impl Default for LogSourceConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            file_pattern: "*.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_tail_lines: usize,
    pub default_search_lines: usize,
    pub default_max_results: usize,
    pub max_concurrent_files: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_tail_lines: 10,
            default_search_lines: 20,
            default_max_results: 50,
            max_concurrent_files: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logs: LogSourceConfig,
    pub search: SearchConfig,
}

impl Config {
    /// Load a YAML or JSON config, chosen by file extension.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LogQueryError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("json") => serde_json::from_str(&text)
                .map_err(|e| LogQueryError::Config(format!("{}: {e}", path.display()))),
            Some("yaml") | Some("yml") => serde_yaml::from_str(&text)
                .map_err(|e| LogQueryError::Config(format!("{}: {e}", path.display()))),
            _ => Err(LogQueryError::Config(format!(
                "unsupported config format: {}",
                path.display()
            ))),
        }
    }

    /// Load from `LOGSCRIBE_CONFIG` when set, defaults otherwise.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load_from_path(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Pick the log directory: CLI argument, then `LOGS_DIR`, then the config
    /// file, then `logs/` next to the package sources. The result is
    /// canonicalized and must be a directory.
    pub fn resolve_log_dir(
        &self,
        cli_arg: Option<&str>,
        env_value: Option<&str>,
    ) -> Result<PathBuf> {
        let candidate = cli_arg
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(|| env_value.filter(|s| !s.is_empty()).map(PathBuf::from))
            .or_else(|| self.logs.log_dir.clone())
            .unwrap_or_else(default_log_dir);

        let canonical = std::fs::canonicalize(&candidate).map_err(|e| {
            LogQueryError::Config(format!(
                "log directory {} is not accessible: {e}",
                candidate.display()
            ))
        })?;
        if !canonical.is_dir() {
            return Err(LogQueryError::Config(format!(
                "log directory is not a directory: {}",
                canonical.display()
            )));
        }
        Ok(canonical)
    }
}

pub fn default_log_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("logs")
}
