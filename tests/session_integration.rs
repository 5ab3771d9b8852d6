//! Integration tests for loading and listing sessions from disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use claude_session_tail::session::{SessionError, SessionLoader};
use claude_session_tail::stores::{TodoItem, TodoStatus, TodoStore};
use claude_session_tail::watcher::layout::{self, ClaudePaths};
use claude_session_tail::watcher::RecordParser;
use tempfile::TempDir;

const PROJECT: &str = "/home/user/project";

struct Fixture {
    _temp_dir: TempDir,
    paths: ClaudePaths,
    project_dir: PathBuf,
}

fn fixture() -> Fixture {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let paths = ClaudePaths::new(temp_dir.path().to_path_buf());
    let project_dir = paths.project_dir(Path::new(PROJECT));
    std::fs::create_dir_all(&project_dir).expect("Failed to create project dir");
    Fixture {
        _temp_dir: temp_dir,
        paths,
        project_dir,
    }
}

fn write_lines(path: &Path, lines: &[&str]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(path, content).expect("Failed to write file");
}

const MAIN_LINES: &[&str] = &[
    r#"{"type":"user","uuid":"1","parentUuid":null,"sessionId":"sess-1","slug":"calm-river","timestamp":"2026-01-29T10:00:00Z","message":{"role":"user","content":"Fix the build"}}"#,
    r#"{"type":"assistant","uuid":"2","parentUuid":"1","sessionId":"sess-1","timestamp":"2026-01-29T10:00:03Z","message":{"model":"claude-opus-4","content":[{"type":"tool_use","id":"toolu_1","name":"Task","input":{"prompt":"investigate"}}],"usage":{"input_tokens":100,"output_tokens":40,"cache_read_input_tokens":25}}}"#,
    r#"{"type":"file-history-snapshot","messageId":"2","snapshot":{"messageId":"2","trackedFileBackups":{"/home/user/project/src/lib.rs":{"backupFileName":"f00d@v1","version":1}}}}"#,
    r#"{"type":"user","uuid":"3","parentUuid":"2","sessionId":"sess-1","timestamp":"2026-01-29T10:01:00Z","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"toolu_1","content":"found it"}]}}"#,
    "{broken",
    r#"{"type":"progress","uuid":"p"}"#,
];

const AGENT_LINES: &[&str] = &[
    r#"{"type":"user","uuid":"1","parentUuid":null,"sessionId":"sess-1","agentId":"aaaaaaa","isSidechain":true,"timestamp":"2026-01-29T10:00:04Z","message":{"role":"user","content":"investigate"}}"#,
    r#"{"type":"assistant","uuid":"2","parentUuid":"1","sessionId":"sess-1","agentId":"aaaaaaa","isSidechain":true,"timestamp":"2026-01-29T10:00:50Z","message":{"model":"claude-haiku-4","content":[{"type":"tool_use","id":"toolu_9","name":"Grep","input":{"pattern":"error"}}],"usage":{"input_tokens":10,"output_tokens":5,"server_tool_use":{"web_search_requests":1}}}}"#,
];

const FOREIGN_AGENT_LINES: &[&str] = &[
    r#"{"type":"user","uuid":"1","parentUuid":null,"sessionId":"sess-2","agentId":"bbbbbbb","isSidechain":true,"message":{"content":"other"}}"#,
];

fn loader(paths: &ClaudePaths) -> SessionLoader {
    SessionLoader::new(paths.clone(), RecordParser::default())
}

/// A full session on disk assembles with agents, side data and aggregates.
#[tokio::test]
async fn test_load_full_session() {
    let fx = fixture();
    write_lines(&fx.project_dir.join("sess-1.jsonl"), MAIN_LINES);
    write_lines(&fx.project_dir.join("agent-aaaaaaa.jsonl"), AGENT_LINES);
    write_lines(&fx.project_dir.join("agent-bbbbbbb.jsonl"), FOREIGN_AGENT_LINES);
    write_lines(
        &fx.paths.todos_dir().join("sess-1-agent-sess-1.json"),
        &[r#"[{"content":"Fix build","status":"in_progress","activeForm":"Fixing build"}]"#],
    );
    let history = fx.paths.file_history_dir().join("sess-1");
    std::fs::create_dir_all(&history).expect("Failed to create history dir");
    std::fs::write(history.join("f00d@v1"), "fn main() {}").expect("Failed to write backup");
    std::fs::create_dir_all(fx.paths.debug_dir()).expect("Failed to create debug dir");
    std::fs::write(fx.paths.debug_dir().join("sess-1.txt"), "debug").expect("Failed to write");

    let session = loader(&fx.paths)
        .load(Path::new(PROJECT), "sess-1")
        .await
        .expect("Failed to load session");

    assert_eq!(session.id(), "sess-1");
    assert_eq!(session.slug(), Some("calm-river"));
    assert_eq!(session.records().len(), 4);
    assert_eq!(session.agents().len(), 1);
    assert_eq!(session.agents()[0].agent_id(), "aaaaaaa");

    let thread: Vec<_> = session
        .thread("3")
        .iter()
        .map(|r| r.uuid().unwrap())
        .collect();
    assert_eq!(thread, vec!["1", "2", "3"]);
    assert_eq!(session.children("1").len(), 1);
    assert_eq!(session.root_messages().len(), 1);

    assert_eq!(session.total_usage().total(), 155);
    assert_eq!(session.web_search_count(), 1);
    assert_eq!(session.tool_usage().get("Task"), Some(&1));
    assert_eq!(session.tool_usage().get("Grep"), Some(&1));
    assert_eq!(session.model_usage().len(), 2);
    assert!(session
        .modified_files()
        .contains("/home/user/project/src/lib.rs"));
    assert!(!session.has_errors());

    let calls = session.tool_calls();
    assert_eq!(calls[0].result, Some(serde_json::json!("found it")));
    assert_eq!(calls[1].agent_id.as_deref(), Some("aaaaaaa"));
    assert_eq!(calls[1].result, None);

    assert_eq!(
        session.started_at().unwrap().to_rfc3339(),
        "2026-01-29T10:00:00+00:00"
    );
    assert_eq!(
        session.ended_at().unwrap().to_rfc3339(),
        "2026-01-29T10:01:00+00:00"
    );

    assert_eq!(session.todos().len(), 1);
    assert_eq!(session.todos()[0].status, TodoStatus::InProgress);
    assert_eq!(session.file_history().len(), 1);
    assert_eq!(session.file_history()[0].version, 1);
    assert!(session.debug_log().is_some());
}

/// Sub-agent files in the nested layout are found too.
#[tokio::test]
async fn test_load_nested_subagents() {
    let fx = fixture();
    write_lines(&fx.project_dir.join("sess-1.jsonl"), MAIN_LINES);
    write_lines(
        &layout::subagents_dir(&fx.project_dir, "sess-1").join("agent-aaaaaaa.jsonl"),
        AGENT_LINES,
    );

    let session = loader(&fx.paths)
        .load_from_dir(&fx.project_dir, "sess-1")
        .await
        .expect("Failed to load session");

    assert_eq!(session.agents().len(), 1);
    assert!(session.debug_log().is_none());
    assert!(session.todos().is_empty());
}

/// A final record without a trailing newline is still part of the session.
#[tokio::test]
async fn test_load_keeps_unterminated_last_record() {
    let fx = fixture();
    let content = format!("{}\n{}", MAIN_LINES[0], MAIN_LINES[1]);
    std::fs::write(fx.project_dir.join("sess-1.jsonl"), content).expect("Failed to write file");

    let session = loader(&fx.paths)
        .load(Path::new(PROJECT), "sess-1")
        .await
        .expect("Failed to load session");

    assert_eq!(session.records().len(), 2);
    assert_eq!(session.response_count(), 1);
    assert_eq!(session.total_usage().total(), 140);
}

#[tokio::test]
async fn test_missing_session_is_not_found() {
    let fx = fixture();
    let err = loader(&fx.paths)
        .load(Path::new(PROJECT), "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotFound { session_id } if session_id == "nope"));
}

struct FixedTodos;

#[async_trait]
impl TodoStore for FixedTodos {
    async fn todos(&self, _session_id: &str) -> Vec<TodoItem> {
        vec![TodoItem {
            content: "from store".to_string(),
            status: TodoStatus::Completed,
            active_form: None,
        }]
    }
}

/// Stores can be swapped out.
#[tokio::test]
async fn test_custom_todo_store() {
    let fx = fixture();
    write_lines(&fx.project_dir.join("sess-1.jsonl"), MAIN_LINES);

    let session = loader(&fx.paths)
        .with_todo_store(Box::new(FixedTodos))
        .load(Path::new(PROJECT), "sess-1")
        .await
        .expect("Failed to load session");

    assert_eq!(session.todos()[0].content, "from store");
}

/// Listing returns main files only, scoped or across projects.
#[tokio::test]
async fn test_list_sessions() {
    let fx = fixture();
    write_lines(&fx.project_dir.join("sess-1.jsonl"), MAIN_LINES);
    write_lines(&fx.project_dir.join("agent-aaaaaaa.jsonl"), AGENT_LINES);
    let other = fx.paths.project_dir(Path::new("/srv/other"));
    write_lines(&other.join("sess-9.jsonl"), FOREIGN_AGENT_LINES);

    let all = layout::list_sessions(&fx.paths, None).await;
    let mut ids: Vec<_> = all.iter().map(|s| s.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["sess-1", "sess-9"]);

    let scoped = layout::list_sessions(&fx.paths, Some(Path::new(PROJECT))).await;
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].project_id, "-home-user-project");
    assert!(scoped[0].size > 0);
    assert!(scoped[0].modified.is_some());
}
