//! Tailing of Claude Code session log files.
//!
//! Provides the record model and line parser, the incremental file cursor,
//! on-disk layout helpers and the live [`LogWatcher`].

mod cursor;
mod error;
pub mod layout;
mod log_watcher;
mod parser;
mod record;

pub use cursor::{CursorRead, FileCursor};
pub use error::WatcherError;
pub use layout::{
    classify, decode_project_id, encode_project_path, extract_agent_id, ClaudePaths,
    LogFileKind, SessionFileInfo,
};
pub use log_watcher::{LogWatcher, RecordSource, WatchTarget, WatchedRecord};
pub use parser::{ParserConfig, RecordParser};
pub use record::{
    AssistantMessage, AssistantRecord, CacheCreation, ContentBlock, FileBackup,
    FileHistorySnapshotRecord, FileSnapshot, ImageSource, MessageContent, QueueOperation,
    QueueOperationRecord, Record, RecordKind, RecordMeta, ServerToolUse, SummaryRecord,
    SystemRecord, TokenUsage, UserMessage, UserRecord,
};
