//! Colored CLI display utilities for session logs.
//!
//! Renders live records, assembled session summaries and session listings
//! to the terminal.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;
use serde_json::Value;

use crate::session::Session;
use crate::watcher::{
    ContentBlock, MessageContent, Record, RecordKind, RecordSource, SessionFileInfo,
    WatchedRecord,
};

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 80;

fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or_else(
        || "-".repeat(20),
        |ts| ts.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    )
}

/// Truncate a string to a maximum number of characters, adding ellipsis if
/// truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{kept}...")
}

/// Format tool input for display, truncating long values.
#[must_use]
pub fn format_tool_input(input: &Value, raw_mode: bool) -> String {
    match input {
        Value::Object(map) => {
            let pairs: Vec<String> = map
                .iter()
                .map(|(k, v)| {
                    let value_str = match v {
                        Value::String(s) => truncate(s, 50, raw_mode),
                        other => truncate(&other.to_string(), 50, raw_mode),
                    };
                    format!("{k}={value_str}")
                })
                .collect();
            pairs.join(", ")
        }
        other => truncate(&other.to_string(), DEFAULT_MAX_LEN, raw_mode),
    }
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn tool_result_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(" "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn block_lines(blocks: &[ContentBlock], raw_mode: bool) -> Vec<String> {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } if !text.trim().is_empty() => Some(format!(
                "{} {}",
                "[TEXT]".white().bold(),
                truncate(&one_line(text), 200, raw_mode)
            )),
            ContentBlock::Thinking { thinking, .. } if !thinking.trim().is_empty() => {
                Some(format!(
                    "{} {}",
                    "[THINKING]".dimmed(),
                    truncate(&one_line(thinking), 120, raw_mode).dimmed()
                ))
            }
            ContentBlock::ToolUse { name, input, .. } => Some(format!(
                "{} {} ({})",
                "[TOOL]".cyan().bold(),
                name.bold(),
                format_tool_input(input, raw_mode).dimmed()
            )),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                let tag = if *is_error {
                    "[RESULT]".red().bold().to_string()
                } else {
                    "[RESULT]".green().bold().to_string()
                };
                Some(format!(
                    "{} {} {}",
                    tag,
                    truncate(tool_use_id, 12, raw_mode).dimmed(),
                    truncate(&one_line(&tool_result_text(content)), 150, raw_mode)
                ))
            }
            ContentBlock::Image { source } => Some(format!(
                "{} {}",
                "[IMAGE]".magenta().bold(),
                source.media_type.as_deref().unwrap_or("unknown")
            )),
            _ => None,
        })
        .collect()
}

fn record_body(record: &Record, raw_mode: bool) -> Vec<String> {
    match &record.kind {
        RecordKind::User(user) => match &user.message.content {
            MessageContent::Text(text) => vec![format!(
                "{} {}",
                "[USER]".blue().bold(),
                truncate(&one_line(text), 200, raw_mode)
            )],
            MessageContent::Blocks(blocks) => block_lines(blocks, raw_mode),
        },
        RecordKind::Assistant(assistant) => {
            let mut lines = block_lines(&assistant.message.content, raw_mode);
            if assistant.is_api_error_message {
                lines.insert(0, format!("{}", "[API ERROR]".red().bold()));
            }
            lines
        }
        RecordKind::Summary(summary) => vec![format!(
            "{} {}",
            "[SUMMARY]".yellow().bold(),
            summary.summary
        )],
        RecordKind::System(system) => vec![format!(
            "{} {} {}",
            "[SYSTEM]".yellow().bold(),
            system.subtype.as_deref().unwrap_or("-").dimmed(),
            truncate(system.content.as_deref().unwrap_or(""), 150, raw_mode)
        )],
        RecordKind::QueueOperation(op) => vec![format!(
            "{} {:?} {}",
            "[QUEUE]".yellow().bold(),
            op.operation,
            truncate(op.content.as_deref().unwrap_or(""), 100, raw_mode)
        )],
        RecordKind::FileHistorySnapshot(snapshot) => vec![format!(
            "{} {} file(s)",
            "[SNAPSHOT]".magenta().bold(),
            snapshot.snapshot.tracked_file_backups.len()
        )],
    }
}

/// Render a watched record as display lines.
#[must_use]
pub fn format_record(watched: &WatchedRecord, raw_mode: bool) -> Vec<String> {
    let source = match &watched.source {
        RecordSource::Main => "main".to_string(),
        RecordSource::Agent(id) => format!("agent-{id}"),
    };
    let prefix = format!(
        "{} {}",
        format_timestamp(watched.record.timestamp()).dimmed(),
        format!("{source:>13}").dimmed()
    );
    record_body(&watched.record, raw_mode)
        .into_iter()
        .map(|line| format!("{prefix} {line}"))
        .collect()
}

/// Print a watched record.
pub fn print_record(watched: &WatchedRecord, raw_mode: bool) {
    for line in format_record(watched, raw_mode) {
        println!("{line}");
    }
    let _ = io::stdout().flush();
}

/// Print the aggregates of an assembled session.
pub fn print_session_summary(session: &Session) {
    let usage = session.total_usage();
    println!(
        "{} {} {}",
        "[SESSION]".blue().bold(),
        session.id(),
        session.slug().unwrap_or_default().cyan()
    );
    println!("  path:       {}", session.path().display());
    println!(
        "  time:       {} .. {}",
        format_timestamp(session.started_at()),
        format_timestamp(session.ended_at())
    );
    println!(
        "  records:    {} main, {} agent file(s)",
        session.records().len(),
        session.agents().len()
    );
    println!(
        "  tokens:     {} in / {} out, cache hit {:.1}%, avg {:.0}/response",
        usage.input_tokens,
        usage.output_tokens,
        usage.cache_hit_rate() * 100.0,
        session.average_tokens_per_response()
    );
    println!(
        "  web:        {} search, {} fetch",
        session.web_search_count(),
        session.web_fetch_count()
    );
    for (model, count) in session.model_usage() {
        println!("  {} {model} x{count}", "[MODEL]".magenta().bold());
    }
    for (tool, count) in session.tool_usage() {
        println!("  {} {tool} x{count}", "[TOOL]".cyan().bold());
    }
    for file in session.modified_files() {
        println!("  {} {file}", "[MODIFIED]".yellow().bold());
    }
    for todo in session.todos() {
        println!("  {} {:?} {}", "[TODO]".green().bold(), todo.status, todo.content);
    }
    if let Some(path) = session.debug_log() {
        println!("  debug log:  {}", path.display());
    }
    if session.has_errors() {
        println!("  {}", "session contains API errors".red());
    }
    let _ = io::stdout().flush();
}

/// Print a session listing, one session per line.
pub fn print_session_list(sessions: &[SessionFileInfo]) {
    for info in sessions {
        println!(
            "{} {} {} {}",
            format_timestamp(info.modified).dimmed(),
            info.id.bold(),
            format!("{:>10}B", info.size).dimmed(),
            info.project_id.cyan()
        );
    }
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}
