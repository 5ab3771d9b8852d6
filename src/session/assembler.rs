//! Builds an immutable [`Session`] from complete record sets.

use std::path::{Path, PathBuf};

use super::error::SessionError;
use super::model::{AgentSession, Session};
use crate::stores::{
    DebugLogStore, FileHistoryEntry, FileHistoryStore, FsDebugLogStore, FsFileHistoryStore,
    FsTodoStore, TodoItem, TodoStore,
};
use crate::watcher::layout::{self, ClaudePaths};
use crate::watcher::{FileCursor, Record, RecordParser, WatcherError};

struct AgentFile {
    agent_id: String,
    path: PathBuf,
    records: Vec<Record>,
}

/// Collects the parts of a session and assembles it.
///
/// Sub-agent files are attributed by the `sessionId` of their first record.
/// A file whose first record names another session, or no session, is
/// dropped whole.
pub struct SessionAssembler {
    session_id: String,
    path: PathBuf,
    records: Vec<Record>,
    agents: Vec<AgentFile>,
    todos: Vec<TodoItem>,
    file_history: Vec<FileHistoryEntry>,
    debug_log: Option<PathBuf>,
}

impl SessionAssembler {
    #[must_use]
    pub fn new(session_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            session_id: session_id.into(),
            path: path.into(),
            records: Vec::new(),
            agents: Vec::new(),
            todos: Vec::new(),
            file_history: Vec::new(),
            debug_log: None,
        }
    }

    #[must_use]
    pub fn with_main_records(mut self, records: Vec<Record>) -> Self {
        self.records = records;
        self
    }

    #[must_use]
    pub fn with_agent_file(
        mut self,
        agent_id: impl Into<String>,
        path: impl Into<PathBuf>,
        records: Vec<Record>,
    ) -> Self {
        self.agents.push(AgentFile {
            agent_id: agent_id.into(),
            path: path.into(),
            records,
        });
        self
    }

    #[must_use]
    pub fn with_todos(mut self, todos: Vec<TodoItem>) -> Self {
        self.todos = todos;
        self
    }

    #[must_use]
    pub fn with_file_history(mut self, entries: Vec<FileHistoryEntry>) -> Self {
        self.file_history = entries;
        self
    }

    #[must_use]
    pub fn with_debug_log(mut self, path: Option<PathBuf>) -> Self {
        self.debug_log = path;
        self
    }

    #[must_use]
    pub fn build(self) -> Session {
        let session_id = self.session_id;
        let agents = self
            .agents
            .into_iter()
            .filter(|agent| {
                let owner = agent.records.first().and_then(Record::session_id);
                let belongs = owner == Some(session_id.as_str());
                if !belongs {
                    tracing::warn!(
                        path = %agent.path.display(),
                        found = ?owner,
                        expected = %session_id,
                        "Excluding sub-agent file from another session"
                    );
                }
                belongs
            })
            .map(|agent| AgentSession::new(agent.agent_id, agent.path, agent.records))
            .collect();

        Session::new(
            session_id,
            self.path,
            self.records,
            agents,
            self.todos,
            self.file_history,
            self.debug_log,
        )
    }
}

/// Loads sessions from disk.
///
/// Every log file is read to its current end once; the live watcher is not
/// involved.
pub struct SessionLoader {
    paths: ClaudePaths,
    parser: RecordParser,
    todos: Box<dyn TodoStore>,
    file_history: Box<dyn FileHistoryStore>,
    debug_logs: Box<dyn DebugLogStore>,
}

impl SessionLoader {
    /// Loader backed by the filesystem stores under `paths`.
    #[must_use]
    pub fn new(paths: ClaudePaths, parser: RecordParser) -> Self {
        Self {
            todos: Box::new(FsTodoStore::new(paths.todos_dir())),
            file_history: Box::new(FsFileHistoryStore::new(paths.file_history_dir())),
            debug_logs: Box::new(FsDebugLogStore::new(paths.debug_dir())),
            paths,
            parser,
        }
    }

    #[must_use]
    pub fn with_todo_store(mut self, store: Box<dyn TodoStore>) -> Self {
        self.todos = store;
        self
    }

    #[must_use]
    pub fn with_file_history_store(mut self, store: Box<dyn FileHistoryStore>) -> Self {
        self.file_history = store;
        self
    }

    #[must_use]
    pub fn with_debug_log_store(mut self, store: Box<dyn DebugLogStore>) -> Self {
        self.debug_logs = store;
        self
    }

    /// Load a session of the project at `project_path`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the main file does not exist,
    /// or an I/O error while reading a log file.
    pub async fn load(&self, project_path: &Path, session_id: &str) -> Result<Session, SessionError> {
        self.load_from_dir(&self.paths.project_dir(project_path), session_id)
            .await
    }

    /// Load a session from an explicit project directory.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the main file does not exist,
    /// or an I/O error while reading a log file.
    pub async fn load_from_dir(
        &self,
        project_dir: &Path,
        session_id: &str,
    ) -> Result<Session, SessionError> {
        let main_path = layout::find_session_by_id(project_dir, session_id)
            .await
            .ok_or_else(|| SessionError::NotFound {
                session_id: session_id.to_string(),
            })?;

        let mut assembler = SessionAssembler::new(session_id, main_path.clone())
            .with_main_records(self.read_records(&main_path).await?);

        for (agent_id, path) in layout::agent_files(project_dir, session_id).await {
            let records = self.read_records(&path).await?;
            assembler = assembler.with_agent_file(agent_id, path, records);
        }

        let (todos, file_history, debug_log) = tokio::join!(
            self.todos.todos(session_id),
            self.file_history.entries(session_id),
            self.debug_logs.debug_log(session_id),
        );

        tracing::debug!(
            session_id,
            path = %main_path.display(),
            todos = todos.len(),
            backups = file_history.len(),
            "Loaded session"
        );

        Ok(assembler
            .with_todos(todos)
            .with_file_history(file_history)
            .with_debug_log(debug_log)
            .build())
    }

    async fn read_records(&self, path: &Path) -> Result<Vec<Record>, WatcherError> {
        let read = FileCursor::new(path.to_path_buf())
            .read_to_end_lines()
            .await?;
        Ok(self.parser.parse_lines(read.lines.iter().map(String::as_str)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(lines: &[&str]) -> Vec<Record> {
        RecordParser::default().parse_lines(lines.iter().copied())
    }

    const MAIN: &str = r#"{"type":"user","uuid":"u1","parentUuid":null,"sessionId":"sess-1","message":{"content":"hi"}}"#;
    const MINE: &str = r#"{"type":"user","uuid":"x1","sessionId":"sess-1","agentId":"aaaaaaa","isSidechain":true,"message":{"content":"task"}}"#;
    const THEIRS: &str = r#"{"type":"user","uuid":"y1","sessionId":"sess-2","agentId":"bbbbbbb","isSidechain":true,"message":{"content":"task"}}"#;
    const NO_SESSION: &str = r#"{"type":"summary","summary":"s"}"#;

    #[test]
    fn test_excludes_agent_files_of_other_sessions() {
        let session = SessionAssembler::new("sess-1", "/p/sess-1.jsonl")
            .with_main_records(records(&[MAIN]))
            .with_agent_file("aaaaaaa", "/p/agent-aaaaaaa.jsonl", records(&[MINE]))
            .with_agent_file(
                "bbbbbbb",
                "/p/agent-bbbbbbb.jsonl",
                records(&[THEIRS, MINE]),
            )
            .build();

        assert_eq!(session.agents().len(), 1);
        assert_eq!(session.agents()[0].agent_id(), "aaaaaaa");
        assert!(session.agent("bbbbbbb").is_none());
    }

    #[test]
    fn test_agent_file_without_first_session_id_excluded() {
        let session = SessionAssembler::new("sess-1", "/p/sess-1.jsonl")
            .with_agent_file("c", "/p/agent-c.jsonl", records(&[NO_SESSION, MINE]))
            .with_agent_file("d", "/p/agent-d.jsonl", Vec::new())
            .build();

        assert!(session.agents().is_empty());
    }

    #[test]
    fn test_side_data_attached() {
        let session = SessionAssembler::new("sess-1", "/p/sess-1.jsonl")
            .with_main_records(records(&[MAIN]))
            .with_todos(vec![TodoItem {
                content: "Ship".to_string(),
                status: crate::stores::TodoStatus::Pending,
                active_form: None,
            }])
            .with_debug_log(Some(PathBuf::from("/d/sess-1.txt")))
            .build();

        assert_eq!(session.records().len(), 1);
        assert_eq!(session.todos().len(), 1);
        assert_eq!(session.debug_log(), Some(Path::new("/d/sess-1.txt")));
        assert!(session.file_history().is_empty());
    }
}
