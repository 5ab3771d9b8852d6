use thiserror::Error;

use crate::watcher::WatcherError;

/// Errors that can occur while loading a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {session_id}")]
    NotFound { session_id: String },

    #[error(transparent)]
    Watcher(#[from] WatcherError),

    #[error("could not determine home directory")]
    NoHomeDirectory,
}
