use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::line_index::DEFAULT_SAMPLE_INTERVAL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub max_window_lines: u64,
    pub sample_interval: u64,
    pub search_case_sensitive: bool,
    /// Lines served around a bare `center_line` request.
    pub default_window_lines: u64,
    pub session_idle_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8765".to_string(),
            max_window_lines: 5000,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            search_case_sensitive: true,
            default_window_lines: 500,
            session_idle_timeout_secs: None,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn session_idle_timeout(&self) -> Option<Duration> {
        self.session_idle_timeout_secs.map(Duration::from_secs)
    }

    /// `(lines_before, lines_after)` for a bare center-line request.
    pub fn default_span(&self) -> (u64, u64) {
        split_window(self.default_window_lines.min(self.max_window_lines))
    }
}

fn split_window(window_size: u64) -> (u64, u64) {
    let before = window_size / 2;
    let after = match window_size.checked_sub(before + 1) {
        Some(rest) => rest,
        None => (window_size / 2).saturating_sub(1),
    };
    (before, after)
}

/// Per-viewer sizing owned by the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub window_size: u64,
    pub lines_before: u64,
    pub lines_after: u64,
    pub prefetch_threshold: u64,
    pub debounce_ms: u64,
    pub fallback_line_height: f64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::from_window_size(500)
    }
}

impl ViewerConfig {
    pub fn from_window_size(window_size: u64) -> Self {
        let window_size = window_size.max(1);
        let (lines_before, lines_after) = split_window(window_size);
        Self {
            window_size,
            lines_before,
            lines_after,
            prefetch_threshold: window_size / 4,
            debounce_ms: 120,
            fallback_line_height: 16.0,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
