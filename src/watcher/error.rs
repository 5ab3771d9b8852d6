//! Watcher error types.

use std::path::PathBuf;

/// Errors surfaced by the tailing engine.
///
/// Missing files, permission-denied files and truncated files are not
/// errors: the cursor reports them as "nothing new" or as a reset read.
#[derive(thiserror::Error, Debug)]
pub enum WatcherError {
    /// Notify watcher error.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The push watcher could not be attached to a directory.
    #[error("Failed to watch directory {path}: {source}")]
    WatchDirectory {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `start` was called twice.
    #[error("Watcher already started")]
    AlreadyStarted,

    /// `start` was called after `stop`.
    #[error("Watcher stopped")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_directory_display() {
        let err = WatcherError::WatchDirectory {
            path: PathBuf::from("/tmp/project"),
            source: notify::Error::generic("no inotify slots"),
        };
        assert!(err.to_string().contains("/tmp/project"));
        assert!(err.to_string().contains("no inotify slots"));
    }

    #[test]
    fn test_already_started_display() {
        assert_eq!(
            WatcherError::AlreadyStarted.to_string(),
            "Watcher already started"
        );
    }

    #[test]
    fn test_stopped_display() {
        assert_eq!(WatcherError::Stopped.to_string(), "Watcher stopped");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::other("disk on fire");
        let watcher_err: WatcherError = io_err.into();
        assert!(matches!(watcher_err, WatcherError::Io(_)));
        assert!(watcher_err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_from_notify_error() {
        let notify_err = notify::Error::generic("test error");
        let watcher_err: WatcherError = notify_err.into();
        assert!(matches!(watcher_err, WatcherError::Notify(_)));
        assert!(watcher_err.to_string().contains("File watcher error"));
    }
}
