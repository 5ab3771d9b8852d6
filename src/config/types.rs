//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::watcher::layout::ClaudePaths;
use crate::watcher::ParserConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// Data directory of the log producer. Defaults to `~/.claude`.
    pub claude_home: Option<PathBuf>,
    pub watch: WatchConfig,
    pub parser: ParserConfig,
}

impl TailConfig {
    /// Resolve the data directory layout.
    #[must_use]
    pub fn paths(&self) -> Option<ClaudePaths> {
        match &self.claude_home {
            Some(root) => Some(ClaudePaths::new(root.clone())),
            None => ClaudePaths::from_home(),
        }
    }
}

/// Live watcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Fallback poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Debounce window for file notifications in milliseconds.
    pub debounce_ms: u64,
    /// How long before watch start a file may have been created and still
    /// be adopted in directory mode.
    pub creation_grace_ms: u64,
    /// Records buffered per subscriber before it starts lagging.
    pub channel_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            debounce_ms: 50,
            creation_grace_ms: 2_000,
            channel_capacity: 1024,
        }
    }
}

impl WatchConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub fn creation_grace(&self) -> Duration {
        Duration::from_millis(self.creation_grace_ms)
    }
}
