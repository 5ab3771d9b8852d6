//! Line parser for session log files.
//!
//! Parsing is per line and never fatal: blank lines, malformed JSON and
//! unknown `type` discriminators all yield `None` so one corrupt line cannot
//! stop consumption of the rest of a file.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::{
    AssistantRecord, FileHistorySnapshotRecord, QueueOperationRecord, Record, RecordKind,
    RecordMeta, SummaryRecord, SystemRecord, UserRecord,
};

/// Parser settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Log skipped lines at `warn` instead of `trace`.
    pub report_malformed: bool,
}

/// Converts JSONL lines into [`Record`]s.
#[derive(Debug, Clone, Default)]
pub struct RecordParser {
    config: ParserConfig,
}

impl RecordParser {
    #[must_use]
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse one line into a record.
    ///
    /// Returns `None` for blank lines, malformed JSON, unknown record types
    /// and records whose body does not match their declared type.
    #[must_use]
    pub fn parse(&self, line: &str) -> Option<Record> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(e) => {
                self.skipped(trimmed, &e.to_string());
                return None;
            }
        };

        let Some(type_name) = value.get("type").and_then(Value::as_str) else {
            self.skipped(trimmed, "missing type discriminator");
            return None;
        };

        let kind = match type_name {
            "user" => UserRecord::deserialize(&value).map(RecordKind::User),
            "assistant" => AssistantRecord::deserialize(&value).map(RecordKind::Assistant),
            "summary" => SummaryRecord::deserialize(&value).map(RecordKind::Summary),
            "system" => SystemRecord::deserialize(&value).map(RecordKind::System),
            "queue-operation" => {
                QueueOperationRecord::deserialize(&value).map(RecordKind::QueueOperation)
            }
            "file-history-snapshot" => FileHistorySnapshotRecord::deserialize(&value)
                .map(RecordKind::FileHistorySnapshot),
            other => {
                tracing::trace!(record_type = other, "Ignoring unknown record type");
                return None;
            }
        };

        let meta = RecordMeta::deserialize(&value);
        match (meta, kind) {
            (Ok(meta), Ok(kind)) => Some(Record { meta, kind }),
            (Err(e), _) | (_, Err(e)) => {
                self.skipped(trimmed, &e.to_string());
                None
            }
        }
    }

    /// Parse every line of `content`, skipping the ones that fail.
    #[must_use]
    pub fn parse_content(&self, content: &str) -> Vec<Record> {
        self.parse_lines(content.lines())
    }

    /// Parse a sequence of lines, skipping the ones that fail.
    pub fn parse_lines<'a>(&self, lines: impl IntoIterator<Item = &'a str>) -> Vec<Record> {
        lines.into_iter().filter_map(|line| self.parse(line)).collect()
    }

    fn skipped(&self, line: &str, reason: &str) {
        if self.config.report_malformed {
            tracing::warn!(line = %line, error = %reason, "Skipping malformed JSONL line");
        } else {
            tracing::trace!(error = %reason, "Skipping malformed JSONL line");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::record::{ContentBlock, MessageContent, QueueOperation};

    fn parser() -> RecordParser {
        RecordParser::default()
    }

    #[test]
    fn test_parse_user_record() {
        let json = r#"{"type":"user","uuid":"abc-123","parentUuid":null,"sessionId":"sess-1","timestamp":"2026-01-29T10:00:00Z","message":{"role":"user","content":"Hello world"},"userType":"external","cwd":"/tmp","version":"2.1.25","gitBranch":"main"}"#;

        let record = parser().parse(json).unwrap();

        assert_eq!(record.uuid(), Some("abc-123"));
        assert_eq!(record.parent_uuid(), None);
        assert_eq!(record.session_id(), Some("sess-1"));
        assert_eq!(record.meta.cwd.as_deref(), Some("/tmp"));
        assert_eq!(record.meta.git_branch.as_deref(), Some("main"));
        assert_eq!(record.meta.user_type.as_deref(), Some("external"));
        assert!(record.timestamp().is_some());
        let user = record.as_user().unwrap();
        assert_eq!(
            user.message.content,
            MessageContent::Text("Hello world".to_string())
        );
    }

    #[test]
    fn test_parse_user_tool_result() {
        let json = r#"{"type":"user","uuid":"u2","sessionId":"s","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"toolu_1","content":"ok","is_error":true}]},"toolUseResult":{"stdout":"ok"}}"#;

        let record = parser().parse(json).unwrap();
        let user = record.as_user().unwrap();

        assert!(user.tool_use_result.is_some());
        match &user.message.content.blocks()[0] {
            ContentBlock::ToolResult {
                tool_use_id,
                is_error,
                ..
            } => {
                assert_eq!(tool_use_id, "toolu_1");
                assert!(*is_error);
            }
            other => panic!("Expected ToolResult, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_assistant_record() {
        let json = r#"{"type":"assistant","uuid":"def-456","parentUuid":"abc-123","sessionId":"sess-1","timestamp":"2026-01-29T10:00:01Z","message":{"id":"msg_1","model":"claude-opus-4","role":"assistant","content":[{"type":"thinking","thinking":"hmm","signature":"sig"},{"type":"text","text":"Hi there!"},{"type":"tool_use","id":"toolu_1","name":"Bash","input":{"command":"ls"}}],"usage":{"input_tokens":10,"output_tokens":20,"cache_read_input_tokens":5}},"requestId":"req_1","cwd":"/tmp","version":"2.1.25"}"#;

        let record = parser().parse(json).unwrap();
        let assistant = record.as_assistant().unwrap();

        assert_eq!(record.parent_uuid(), Some("abc-123"));
        assert_eq!(assistant.message.model.as_deref(), Some("claude-opus-4"));
        assert_eq!(assistant.message.content.len(), 3);
        assert_eq!(assistant.message.usage.total(), 30);
        assert_eq!(assistant.request_id.as_deref(), Some("req_1"));
        assert!(!assistant.is_api_error_message);
    }

    #[test]
    fn test_parse_summary_record() {
        let json = r#"{"type":"summary","summary":"Refactor parser","leafUuid":"u9"}"#;
        let record = parser().parse(json).unwrap();

        match record.kind {
            RecordKind::Summary(summary) => {
                assert_eq!(summary.summary, "Refactor parser");
                assert_eq!(summary.leaf_uuid.as_deref(), Some("u9"));
            }
            other => panic!("Expected Summary, got {other:?}"),
        }
        assert_eq!(record.meta.session_id, None);
    }

    #[test]
    fn test_parse_system_record() {
        let json = r#"{"type":"system","uuid":"s1","subtype":"compact_boundary","level":"info","content":"Conversation compacted","sessionId":"s"}"#;
        let record = parser().parse(json).unwrap();

        match record.kind {
            RecordKind::System(system) => {
                assert_eq!(system.subtype.as_deref(), Some("compact_boundary"));
                assert_eq!(system.level.as_deref(), Some("info"));
                assert_eq!(system.content.as_deref(), Some("Conversation compacted"));
            }
            other => panic!("Expected System, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_queue_operation_record() {
        let json = r#"{"type":"queue-operation","operation":"enqueue","timestamp":"2026-01-29T10:00:00Z","sessionId":"s","content":"next task"}"#;
        let record = parser().parse(json).unwrap();

        match record.kind {
            RecordKind::QueueOperation(op) => {
                assert_eq!(op.operation, QueueOperation::Enqueue);
                assert_eq!(op.content.as_deref(), Some("next task"));
            }
            other => panic!("Expected QueueOperation, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_file_history_snapshot_record() {
        let json = r#"{"type":"file-history-snapshot","messageId":"m1","snapshot":{"messageId":"m1","trackedFileBackups":{"/src/main.rs":{"backupFileName":"abc@v2","version":2,"backupTime":"2026-01-29T10:00:00Z"}},"timestamp":"2026-01-29T10:00:00Z"},"isSnapshotUpdate":false}"#;
        let record = parser().parse(json).unwrap();
        let snapshot = record.as_file_history_snapshot().unwrap();

        assert_eq!(snapshot.message_id, "m1");
        let backup = &snapshot.snapshot.tracked_file_backups["/src/main.rs"];
        assert_eq!(backup.backup_file_name.as_deref(), Some("abc@v2"));
        assert_eq!(backup.version, 2);
        assert!(record.uuid().is_none());
    }

    #[test]
    fn test_unknown_type_is_none() {
        assert!(parser().parse(r#"{"type":"bogus","x":1}"#).is_none());
    }

    #[test]
    fn test_missing_type_is_none() {
        assert!(parser().parse(r#"{"uuid":"u1"}"#).is_none());
    }

    #[test]
    fn test_blank_and_whitespace_lines_are_none() {
        assert!(parser().parse("").is_none());
        assert!(parser().parse("   \t  ").is_none());
    }

    #[test]
    fn test_malformed_json_is_none() {
        assert!(parser().parse("not valid json").is_none());
        assert!(parser().parse(r#"{"type":"user","#).is_none());
    }

    #[test]
    fn test_extra_fields_ignored() {
        let json = r#"{"type":"summary","summary":"s","leafUuid":"l","brandNewField":{"nested":[1,2,3]}}"#;
        assert!(parser().parse(json).is_some());
    }

    #[test]
    fn test_absent_numbers_and_flags_default() {
        let json = r#"{"type":"assistant","uuid":"a1","message":{"content":[]}}"#;
        let record = parser().parse(json).unwrap();
        let assistant = record.as_assistant().unwrap();

        assert_eq!(assistant.message.usage, crate::watcher::TokenUsage::default());
        assert!(!assistant.is_api_error_message);
        assert!(!record.meta.is_sidechain);
        assert!(record.agent_id().is_none());
    }

    #[test]
    fn test_sidechain_and_agent_id() {
        let json = r#"{"type":"user","uuid":"u1","isSidechain":true,"agentId":"a1b2c3d","sessionId":"s","message":{"content":"Task"}}"#;
        let record = parser().parse(json).unwrap();
        assert!(record.meta.is_sidechain);
        assert_eq!(record.agent_id(), Some("a1b2c3d"));
    }

    #[test]
    fn test_unknown_block_dropped_not_fatal() {
        let json = r#"{"type":"assistant","uuid":"a1","message":{"content":[{"type":"server_widget","w":1},{"type":"text","text":"kept"}]}}"#;
        let record = parser().parse(json).unwrap();
        let assistant = record.as_assistant().unwrap();
        assert_eq!(assistant.message.content.len(), 1);
        assert_eq!(assistant.text(), "kept");
    }

    #[test]
    fn test_parse_content_skips_bad_lines() {
        let jsonl = r#"{"type":"user","uuid":"1","sessionId":"s","message":{"role":"user","content":"Q1"}}
{"type":"assistant","uuid":"2","parentUuid":"1","sessionId":"s","message":{"role":"assistant","content":[{"type":"text","text":"A1"}]}}
invalid json line

{"type":"progress","uuid":"3"}
{"type":"summary","summary":"Test session","leafUuid":"2"}"#;

        let records = parser().parse_content(jsonl);
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].type_name(), "summary");
    }

    #[test]
    fn test_report_malformed_config_is_held() {
        let parser = RecordParser::new(ParserConfig {
            report_malformed: true,
        });
        assert!(parser.config().report_malformed);
        assert!(parser.parse("{").is_none());
    }
}
