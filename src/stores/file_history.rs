//! Backups stored under `<claude_home>/file-history/<session-id>/<hash>@v<N>`.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::FileHistoryStore;
use crate::watcher::layout::to_utc;

/// One backup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHistoryEntry {
    pub path: PathBuf,
    pub hash: String,
    pub version: u32,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Split a backup file name into hash and version.
///
/// A missing or unparsable `@v<N>` suffix gives version 1.
///
/// # Examples
///
/// ```
/// use claude_session_tail::stores::parse_backup_name;
///
/// assert_eq!(parse_backup_name("3f2a9c@v4"), ("3f2a9c".to_string(), 4));
/// assert_eq!(parse_backup_name("3f2a9c@vX"), ("3f2a9c".to_string(), 1));
/// assert_eq!(parse_backup_name("3f2a9c"), ("3f2a9c".to_string(), 1));
/// ```
#[must_use]
pub fn parse_backup_name(name: &str) -> (String, u32) {
    match name.rsplit_once("@v") {
        Some((hash, version)) => (hash.to_string(), version.parse().unwrap_or(1)),
        None => (name.to_string(), 1),
    }
}

/// Reads backups from the file-history directory.
#[derive(Debug, Clone)]
pub struct FsFileHistoryStore {
    dir: PathBuf,
}

impl FsFileHistoryStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl FileHistoryStore for FsFileHistoryStore {
    async fn entries(&self, session_id: &str) -> Vec<FileHistoryEntry> {
        let session_dir = self.dir.join(session_id);
        let Ok(mut dir) = tokio::fs::read_dir(&session_dir).await else {
            return Vec::new();
        };

        let mut entries = Vec::new();
        while let Ok(Some(entry)) = dir.next_entry().await {
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let (hash, version) = parse_backup_name(&name);
            entries.push(FileHistoryEntry {
                path: entry.path(),
                hash,
                version,
                size: metadata.len(),
                modified: metadata.modified().ok().map(to_utc),
            });
        }

        entries.sort_by(|a, b| a.hash.cmp(&b.hash).then(a.version.cmp(&b.version)));
        entries
    }
}
