//! Todo lists written to `<claude_home>/todos/<session-id>-agent-<id>.json`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::TodoStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub content: String,
    pub status: TodoStatus,
    #[serde(default)]
    pub active_form: Option<String>,
}

/// Reads todo files from a directory.
#[derive(Debug, Clone)]
pub struct FsTodoStore {
    dir: PathBuf,
}

impl FsTodoStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Most recently modified todo file of the session in the directory.
    async fn latest_file(&self, session_id: &str) -> Option<PathBuf> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.ok()?;
        let mut latest: Option<(SystemTime, PathBuf)> = None;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| belongs_to_session(name, session_id));
            if !matches {
                continue;
            }
            let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) else {
                continue;
            };
            if latest.as_ref().is_none_or(|(best, _)| modified > *best) {
                latest = Some((modified, path));
            }
        }

        latest.map(|(_, path)| path)
    }
}

#[async_trait]
impl TodoStore for FsTodoStore {
    async fn todos(&self, session_id: &str) -> Vec<TodoItem> {
        let Some(path) = self.latest_file(session_id).await else {
            return Vec::new();
        };
        read_todo_file(&path).await
    }
}

/// `<session_id>.json` or `<session_id>-<suffix>.json`.
fn belongs_to_session(name: &str, session_id: &str) -> bool {
    let Some(stem) = name.strip_suffix(".json") else {
        return false;
    };
    stem.strip_prefix(session_id)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('-'))
}

async fn read_todo_file(path: &Path) -> Vec<TodoItem> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Failed to read todo file");
            return Vec::new();
        }
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        tracing::debug!(path = %path.display(), error = %e, "Failed to parse todo file");
        Vec::new()
    })
}
