//! On-disk layout of Claude Code session logs.
//!
//! ```text
//! <claude_home>/projects/<project-id>/<session-id>.jsonl
//! <claude_home>/projects/<project-id>/agent-<agent-id>.jsonl
//! <claude_home>/projects/<project-id>/<session-id>/subagents/agent-<agent-id>.jsonl
//! <claude_home>/todos/<session-id>-agent-<id>.json
//! <claude_home>/file-history/<session-id>/<hash>@v<N>
//! <claude_home>/debug/<session-id>.txt
//! ```

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// File extension of session logs.
pub const LOG_EXTENSION: &str = "jsonl";

/// Directory layout rooted at the producer's data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaudePaths {
    root: PathBuf,
}

impl ClaudePaths {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// `~/.claude`, if the home directory can be determined.
    #[must_use]
    pub fn from_home() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(".claude")))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn projects_dir(&self) -> PathBuf {
        self.root.join("projects")
    }

    /// Session directory for a project working directory.
    #[must_use]
    pub fn project_dir(&self, project_path: &Path) -> PathBuf {
        self.projects_dir().join(encode_project_path(project_path))
    }

    #[must_use]
    pub fn todos_dir(&self) -> PathBuf {
        self.root.join("todos")
    }

    #[must_use]
    pub fn file_history_dir(&self) -> PathBuf {
        self.root.join("file-history")
    }

    #[must_use]
    pub fn debug_dir(&self) -> PathBuf {
        self.root.join("debug")
    }
}

/// Encode a project path into its directory name.
///
/// Every `/` becomes `-` and the result always starts with `-`. The
/// encoding is lossy for paths that already contain hyphens.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use claude_session_tail::watcher::encode_project_path;
///
/// assert_eq!(encode_project_path(Path::new("/home/user/project")), "-home-user-project");
/// ```
#[must_use]
pub fn encode_project_path(project_path: &Path) -> String {
    let encoded = project_path.to_string_lossy().replace('/', "-");
    if encoded.starts_with('-') {
        encoded
    } else {
        format!("-{encoded}")
    }
}

/// Literal inverse of [`encode_project_path`]: every `-` becomes `/`.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use claude_session_tail::watcher::decode_project_id;
///
/// assert_eq!(decode_project_id("-home-user-project"), PathBuf::from("/home/user/project"));
/// // Hyphens in the original path do not survive.
/// assert_eq!(decode_project_id("-home-user-my-app"), PathBuf::from("/home/user/my/app"));
/// ```
#[must_use]
pub fn decode_project_id(project_id: &str) -> PathBuf {
    PathBuf::from(project_id.replace('-', "/"))
}

/// What a `.jsonl` file in a project directory holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFileKind {
    /// A main session file named after its session id.
    Main { session_id: String },
    /// A sub-agent file named `agent-<id>.jsonl`.
    Agent { agent_id: String },
}

/// Extract agent ID from a sub-agent filename.
///
/// # Examples
///
/// ```
/// use claude_session_tail::watcher::extract_agent_id;
///
/// assert_eq!(extract_agent_id("agent-abc1234.jsonl"), Some("abc1234".to_string()));
/// assert_eq!(extract_agent_id("session.jsonl"), None);
/// ```
#[must_use]
pub fn extract_agent_id(filename: &str) -> Option<String> {
    let stem = filename.strip_suffix(".jsonl")?;
    let id = stem.strip_prefix("agent-")?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Classify a path by name. Returns `None` for non-`.jsonl` files.
#[must_use]
pub fn classify(path: &Path) -> Option<LogFileKind> {
    if path.extension().is_none_or(|ext| ext != LOG_EXTENSION) {
        return None;
    }
    let filename = path.file_name()?.to_str()?;
    if let Some(agent_id) = extract_agent_id(filename) {
        return Some(LogFileKind::Agent { agent_id });
    }
    let session_id = path.file_stem()?.to_str()?;
    if session_id.is_empty() {
        return None;
    }
    Some(LogFileKind::Main {
        session_id: session_id.to_string(),
    })
}

/// Path of the main file for a session.
#[must_use]
pub fn session_file(project_dir: &Path, session_id: &str) -> PathBuf {
    project_dir.join(format!("{session_id}.{LOG_EXTENSION}"))
}

/// Nested sub-agent directory for a session.
#[must_use]
pub fn subagents_dir(project_dir: &Path, session_id: &str) -> PathBuf {
    project_dir.join(session_id).join("subagents")
}

/// Find a session file by its session ID.
pub async fn find_session_by_id(project_dir: &Path, session_id: &str) -> Option<PathBuf> {
    let path = session_file(project_dir, session_id);
    match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => Some(path),
        _ => None,
    }
}

/// `.jsonl` files directly inside `dir`. A missing directory yields nothing.
pub async fn jsonl_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return Vec::new();
    };

    let mut files = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == LOG_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    files
}

/// Sub-agent files that may belong to `session_id`, from both the flat and
/// the nested layout. Attribution is not checked here.
pub async fn agent_files(project_dir: &Path, session_id: &str) -> Vec<(String, PathBuf)> {
    let mut candidates = jsonl_files(project_dir).await;
    candidates.extend(jsonl_files(&subagents_dir(project_dir, session_id)).await);

    candidates
        .into_iter()
        .filter_map(|path| match classify(&path) {
            Some(LogFileKind::Agent { agent_id }) => Some((agent_id, path)),
            _ => None,
        })
        .collect()
}

/// Listing entry for one main session file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionFileInfo {
    pub id: String,
    pub project_id: String,
    pub path: PathBuf,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub size: u64,
}

/// List main session files under the projects directory, optionally
/// scoped to one project path. Newest modification first.
pub async fn list_sessions(paths: &ClaudePaths, project: Option<&Path>) -> Vec<SessionFileInfo> {
    let project_dirs = match project {
        Some(project_path) => vec![paths.project_dir(project_path)],
        None => subdirectories(&paths.projects_dir()).await,
    };

    let mut sessions = Vec::new();
    for project_dir in project_dirs {
        let project_id = project_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        for path in jsonl_files(&project_dir).await {
            let Some(LogFileKind::Main { session_id }) = classify(&path) else {
                continue;
            };
            let Ok(metadata) = tokio::fs::metadata(&path).await else {
                continue;
            };
            sessions.push(SessionFileInfo {
                id: session_id,
                project_id: project_id.clone(),
                created: metadata.created().ok().map(to_utc),
                modified: metadata.modified().ok().map(to_utc),
                size: metadata.len(),
                path,
            });
        }
    }

    sessions.sort_by(|a, b| b.modified.cmp(&a.modified));
    sessions
}

/// Most recently modified main session file in a project directory.
pub async fn find_latest_session(project_dir: &Path) -> Option<PathBuf> {
    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for path in jsonl_files(project_dir).await {
        if !matches!(classify(&path), Some(LogFileKind::Main { .. })) {
            continue;
        }
        let Ok(modified) = tokio::fs::metadata(&path).await.and_then(|m| m.modified()) else {
            continue;
        };
        if latest.as_ref().is_none_or(|(best, _)| modified > *best) {
            latest = Some((modified, path));
        }
    }
    latest.map(|(_, path)| path)
}

async fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return Vec::new();
    };

    let mut dirs = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    dirs
}

pub(crate) fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_encode_project_path_simple() {
        assert_eq!(
            encode_project_path(Path::new("/home/user/project")),
            "-home-user-project"
        );
    }

    #[test]
    fn test_encode_project_path_nested() {
        assert_eq!(
            encode_project_path(Path::new("/home/user/dev/rust/my-project")),
            "-home-user-dev-rust-my-project"
        );
    }

    #[test]
    fn test_encode_project_path_root() {
        assert_eq!(encode_project_path(Path::new("/")), "-");
    }

    #[test]
    fn test_encode_relative_path_gets_leading_dash() {
        assert_eq!(encode_project_path(Path::new("work/app")), "-work-app");
    }

    #[test]
    fn test_decode_round_trip_without_hyphens() {
        let path = Path::new("/srv/data/app");
        assert_eq!(decode_project_id(&encode_project_path(path)), path);
    }

    #[test]
    fn test_decode_is_lossy_with_hyphens() {
        let path = Path::new("/srv/my-app");
        assert_eq!(
            decode_project_id(&encode_project_path(path)),
            PathBuf::from("/srv/my/app")
        );
    }

    #[test]
    fn test_extract_agent_id_valid() {
        assert_eq!(
            extract_agent_id("agent-abc1234.jsonl"),
            Some("abc1234".to_string())
        );
        assert_eq!(extract_agent_id("agent-a.jsonl"), Some("a".to_string()));
    }

    #[test]
    fn test_extract_agent_id_invalid() {
        assert_eq!(extract_agent_id("session.jsonl"), None);
        assert_eq!(extract_agent_id("agent-.jsonl"), None);
        assert_eq!(extract_agent_id("agent-abc.txt"), None);
        assert_eq!(extract_agent_id(""), None);
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(Path::new("/p/0b7c-11.jsonl")),
            Some(LogFileKind::Main {
                session_id: "0b7c-11".to_string()
            })
        );
        assert_eq!(
            classify(Path::new("/p/agent-1a2b3c4.jsonl")),
            Some(LogFileKind::Agent {
                agent_id: "1a2b3c4".to_string()
            })
        );
        assert_eq!(classify(Path::new("/p/notes.txt")), None);
    }

    #[test]
    fn test_claude_paths() {
        let paths = ClaudePaths::new(PathBuf::from("/home/u/.claude"));
        assert_eq!(
            paths.project_dir(Path::new("/work/app")),
            PathBuf::from("/home/u/.claude/projects/-work-app")
        );
        assert_eq!(paths.todos_dir(), PathBuf::from("/home/u/.claude/todos"));
        assert_eq!(
            paths.file_history_dir(),
            PathBuf::from("/home/u/.claude/file-history")
        );
        assert_eq!(paths.debug_dir(), PathBuf::from("/home/u/.claude/debug"));
    }

    #[tokio::test]
    async fn test_find_session_by_id() {
        let temp_dir = TempDir::new().unwrap();
        let session_path = temp_dir.path().join("abc-123.jsonl");
        std::fs::write(&session_path, "{}").unwrap();

        assert_eq!(
            find_session_by_id(temp_dir.path(), "abc-123").await,
            Some(session_path)
        );
        assert!(find_session_by_id(temp_dir.path(), "missing").await.is_none());
    }

    #[tokio::test]
    async fn test_agent_files_flat_and_nested() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path();
        std::fs::write(project.join("sess.jsonl"), "").unwrap();
        std::fs::write(project.join("agent-aaa1111.jsonl"), "").unwrap();
        let nested = subagents_dir(project, "sess");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("agent-bbb2222.jsonl"), "").unwrap();
        std::fs::write(nested.join("agent-ccc.txt"), "").unwrap();

        let mut ids: Vec<String> = agent_files(project, "sess")
            .await
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["aaa1111", "bbb2222"]);
    }

    #[tokio::test]
    async fn test_agent_files_missing_dir() {
        assert!(agent_files(Path::new("/nonexistent/project"), "s")
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_list_sessions_skips_agent_files() {
        let temp_dir = TempDir::new().unwrap();
        let paths = ClaudePaths::new(temp_dir.path().to_path_buf());
        let project_dir = paths.project_dir(Path::new("/work/app"));
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(project_dir.join("s1.jsonl"), "{}\n").unwrap();
        std::fs::write(project_dir.join("agent-x1.jsonl"), "{}\n").unwrap();
        std::fs::write(project_dir.join("readme.txt"), "hi").unwrap();

        let all = list_sessions(&paths, None).await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "s1");
        assert_eq!(all[0].project_id, "-work-app");
        assert_eq!(all[0].size, 3);
        assert!(all[0].modified.is_some());

        let scoped = list_sessions(&paths, Some(Path::new("/work/app"))).await;
        assert_eq!(scoped.len(), 1);
        let other = list_sessions(&paths, Some(Path::new("/elsewhere"))).await;
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_find_latest_session() {
        let temp_dir = TempDir::new().unwrap();
        assert!(find_latest_session(temp_dir.path()).await.is_none());

        std::fs::write(temp_dir.path().join("old.jsonl"), "{}").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let new_path = temp_dir.path().join("new.jsonl");
        std::fs::write(&new_path, "{}").unwrap();
        std::fs::write(temp_dir.path().join("agent-zzz.jsonl"), "{}").unwrap();

        assert_eq!(find_latest_session(temp_dir.path()).await, Some(new_path));
    }
}
