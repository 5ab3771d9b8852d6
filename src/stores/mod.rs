//! Side data attached to an assembled session.
//!
//! Todo lists, file-history backups and debug logs live outside the session
//! log files. Each is reached through a trait so the loader can be pointed
//! at something other than the filesystem in tests.

mod debug_log;
mod file_history;
mod todos;

use std::path::PathBuf;

use async_trait::async_trait;

pub use debug_log::FsDebugLogStore;
pub use file_history::{parse_backup_name, FileHistoryEntry, FsFileHistoryStore};
pub use todos::{FsTodoStore, TodoItem, TodoStatus};

/// Source of a session's todo list.
#[async_trait]
pub trait TodoStore: Send + Sync {
    /// The most recent todo list for `session_id`. Failures yield an empty
    /// list.
    async fn todos(&self, session_id: &str) -> Vec<TodoItem>;
}

/// Source of a session's file-history backups.
#[async_trait]
pub trait FileHistoryStore: Send + Sync {
    async fn entries(&self, session_id: &str) -> Vec<FileHistoryEntry>;
}

/// Locates a session's debug log.
#[async_trait]
pub trait DebugLogStore: Send + Sync {
    async fn debug_log(&self, session_id: &str) -> Option<PathBuf>;
}
