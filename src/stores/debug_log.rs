//! Debug logs written to `<claude_home>/debug/<session-id>.txt`.

use std::path::PathBuf;

use async_trait::async_trait;

use super::DebugLogStore;

/// Looks for `<dir>/<session-id>.txt`.
#[derive(Debug, Clone)]
pub struct FsDebugLogStore {
    dir: PathBuf,
}

impl FsDebugLogStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl DebugLogStore for FsDebugLogStore {
    async fn debug_log(&self, session_id: &str) -> Option<PathBuf> {
        let path = self.dir.join(format!("{session_id}.txt"));
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Some(path),
            _ => None,
        }
    }
}
