//! Typed model of Claude Code session log records.
//!
//! One line of a `~/.claude/projects/<project-id>/*.jsonl` file maps to one
//! [`Record`]: a shared [`RecordMeta`] envelope plus a [`RecordKind`] body.
//! Optional numeric fields default to zero and optional flags to `false`,
//! whether the producer omits them or writes `null`.

use std::collections::BTreeMap;
use std::ops::AddAssign;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Envelope fields shared by every record kind.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordMeta {
    /// Producer clock. Not monotonic across files.
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    pub session_id: Option<String>,
    pub uuid: Option<String>,
    pub parent_uuid: Option<String>,
    pub cwd: Option<String>,
    pub git_branch: Option<String>,
    pub version: Option<String>,
    pub user_type: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub is_sidechain: bool,
    /// Set exactly when the record comes from a sub-agent file.
    pub agent_id: Option<String>,
    /// Human readable session slug.
    pub slug: Option<String>,
}

/// A single parsed session log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    #[serde(flatten)]
    pub meta: RecordMeta,
    #[serde(flatten)]
    pub kind: RecordKind,
}

/// Record body, discriminated by the JSON `type` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RecordKind {
    /// User prompt or tool result.
    User(UserRecord),
    /// Model output.
    Assistant(AssistantRecord),
    /// Conversation summary.
    Summary(SummaryRecord),
    /// System notice.
    System(SystemRecord),
    /// Prompt queue change (headless mode).
    QueueOperation(QueueOperationRecord),
    /// File backup snapshot.
    FileHistorySnapshot(FileHistorySnapshotRecord),
}

impl Record {
    #[must_use]
    pub fn uuid(&self) -> Option<&str> {
        self.meta.uuid.as_deref()
    }

    #[must_use]
    pub fn parent_uuid(&self) -> Option<&str> {
        self.meta.parent_uuid.as_deref()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.meta.session_id.as_deref()
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.meta.timestamp
    }

    #[must_use]
    pub fn agent_id(&self) -> Option<&str> {
        self.meta.agent_id.as_deref()
    }

    /// The JSON discriminator this record was parsed from.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            RecordKind::User(_) => "user",
            RecordKind::Assistant(_) => "assistant",
            RecordKind::Summary(_) => "summary",
            RecordKind::System(_) => "system",
            RecordKind::QueueOperation(_) => "queue-operation",
            RecordKind::FileHistorySnapshot(_) => "file-history-snapshot",
        }
    }

    #[must_use]
    pub fn as_user(&self) -> Option<&UserRecord> {
        match &self.kind {
            RecordKind::User(user) => Some(user),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_assistant(&self) -> Option<&AssistantRecord> {
        match &self.kind {
            RecordKind::Assistant(assistant) => Some(assistant),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_file_history_snapshot(&self) -> Option<&FileHistorySnapshotRecord> {
        match &self.kind {
            RecordKind::FileHistorySnapshot(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

/// User message entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: UserMessage,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_meta: bool,
    /// Structured tool output attached by the producer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_result: Option<Value>,
}

/// A user-side message.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UserMessage {
    #[serde(default = "user_role")]
    pub role: String,
    #[serde(default)]
    pub content: MessageContent,
}

impl Default for UserMessage {
    fn default() -> Self {
        Self {
            role: user_role(),
            content: MessageContent::default(),
        }
    }
}

fn user_role() -> String {
    "user".to_string()
}

fn assistant_role() -> String {
    "assistant".to_string()
}

/// User message content - plain text or structured blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content
    Text(String),
    /// Structured content blocks
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl<'de> Deserialize<'de> for MessageContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(text) => Self::Text(text),
            Value::Array(items) => Self::Blocks(blocks_from_values(items)),
            _ => Self::default(),
        })
    }
}

impl MessageContent {
    /// Text blocks joined by newlines.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => join_text(blocks),
        }
    }

    /// Content blocks, empty for plain text.
    #[must_use]
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            MessageContent::Text(_) => &[],
            MessageContent::Blocks(blocks) => blocks,
        }
    }
}

/// Assistant message entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: AssistantMessage,
    #[serde(default)]
    pub request_id: Option<String>,
    /// Set when the producer logged an API failure as a message.
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_api_error_message: bool,
}

impl AssistantRecord {
    /// Text blocks joined by newlines.
    #[must_use]
    pub fn text(&self) -> String {
        join_text(&self.message.content)
    }

    /// Tool invocations in block order, as `(id, name, input)`.
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.message.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse {
                id, name, input, ..
            } => Some((id.as_str(), name.as_str(), input)),
            _ => None,
        })
    }
}

/// Model output with usage accounting.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "assistant_role")]
    pub role: String,
    #[serde(default, deserialize_with = "lenient_blocks")]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub usage: TokenUsage,
}

impl Default for AssistantMessage {
    fn default() -> Self {
        Self {
            id: None,
            model: None,
            role: assistant_role(),
            content: Vec::new(),
            stop_reason: None,
            usage: TokenUsage::default(),
        }
    }
}

/// A content block within a message.
///
/// Unrecognised block types are dropped from the containing list rather
/// than failing the record.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content
    Text {
        #[serde(default)]
        text: String,
    },
    /// Extended thinking
    Thinking {
        #[serde(default)]
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// Tool use request
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// Tool result, correlated to a `ToolUse` by id
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default, deserialize_with = "null_as_default")]
        is_error: bool,
    },
    /// Inline image
    Image {
        #[serde(default)]
        source: ImageSource,
    },
}

/// Image encoding descriptor and opaque payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub encoding: Option<String>,
    pub media_type: Option<String>,
    pub data: Option<String>,
}

/// Token accounting for one model response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenUsage {
    #[serde(deserialize_with = "null_as_default")]
    pub input_tokens: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub output_tokens: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub cache_creation_input_tokens: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub cache_read_input_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_creation: Option<CacheCreation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_tool_use: Option<ServerToolUse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_tier: Option<String>,
}

/// Ephemeral cache breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheCreation {
    #[serde(deserialize_with = "null_as_default")]
    pub ephemeral_5m_input_tokens: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub ephemeral_1h_input_tokens: u64,
}

/// Server-side tool invocations billed to the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerToolUse {
    #[serde(deserialize_with = "null_as_default")]
    pub web_search_requests: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub web_fetch_requests: u64,
}

impl TokenUsage {
    /// Input plus output tokens.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Fraction of input served from cache; zero when there is no input.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cache_hit_rate(&self) -> f64 {
        if self.input_tokens == 0 {
            0.0
        } else {
            self.cache_read_input_tokens as f64 / self.input_tokens as f64
        }
    }

    #[must_use]
    pub fn web_search_requests(&self) -> u64 {
        self.server_tool_use.map_or(0, |s| s.web_search_requests)
    }

    #[must_use]
    pub fn web_fetch_requests(&self) -> u64 {
        self.server_tool_use.map_or(0, |s| s.web_fetch_requests)
    }
}

impl AddAssign<&TokenUsage> for TokenUsage {
    fn add_assign(&mut self, rhs: &TokenUsage) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.cache_creation_input_tokens += rhs.cache_creation_input_tokens;
        self.cache_read_input_tokens += rhs.cache_read_input_tokens;
        if let Some(rhs_cache) = rhs.cache_creation {
            let cache = self.cache_creation.get_or_insert_with(CacheCreation::default);
            cache.ephemeral_5m_input_tokens += rhs_cache.ephemeral_5m_input_tokens;
            cache.ephemeral_1h_input_tokens += rhs_cache.ephemeral_1h_input_tokens;
        }
        if let Some(rhs_server) = rhs.server_tool_use {
            let server = self
                .server_tool_use
                .get_or_insert_with(ServerToolUse::default);
            server.web_search_requests += rhs_server.web_search_requests;
            server.web_fetch_requests += rhs_server.web_fetch_requests;
        }
    }
}

/// Session summary entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummaryRecord {
    pub summary: String,
    pub leaf_uuid: Option<String>,
}

/// System message entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemRecord {
    pub subtype: Option<String>,
    pub level: Option<String>,
    pub content: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub is_meta: bool,
}

/// Queue operation entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueueOperationRecord {
    pub operation: QueueOperation,
    #[serde(default)]
    pub content: Option<String>,
}

/// Kind of queue change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueOperation {
    Enqueue,
    Dequeue,
    Remove,
    PopAll,
    #[serde(other)]
    Other,
}

/// File backup snapshot entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileHistorySnapshotRecord {
    pub message_id: String,
    pub snapshot: FileSnapshot,
    #[serde(deserialize_with = "null_as_default")]
    pub is_snapshot_update: bool,
}

/// Backups taken for one message, keyed by original file path.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileSnapshot {
    pub message_id: Option<String>,
    pub tracked_file_backups: BTreeMap<String, FileBackup>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Where one file's backup lives.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileBackup {
    pub backup_file_name: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub version: u32,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub backup_time: Option<DateTime<Utc>>,
}

fn join_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode each block on its own, dropping the ones that fail.
fn blocks_from_values(items: Vec<Value>) -> Vec<ContentBlock> {
    items
        .into_iter()
        .filter_map(|item| ContentBlock::deserialize(item).ok())
        .collect()
}

fn lenient_blocks<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => blocks_from_values(items),
        Value::String(text) => vec![ContentBlock::Text { text }],
        _ => Vec::new(),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Unparseable timestamps become `None` instead of failing the record.
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc)))
}
