//! Assembled session view.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;

use super::graph::RecordLog;
use crate::stores::{FileHistoryEntry, TodoItem};
use crate::watcher::{AssistantRecord, ContentBlock, Record, TokenUsage};

/// Records of one sub-agent file.
#[derive(Debug, Clone)]
pub struct AgentSession {
    agent_id: String,
    path: PathBuf,
    log: RecordLog,
}

impl AgentSession {
    pub(crate) fn new(agent_id: String, path: PathBuf, records: Vec<Record>) -> Self {
        Self {
            agent_id,
            path,
            log: RecordLog::new(records),
        }
    }

    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        self.log.records()
    }

    /// Uuid index of this agent's file.
    #[must_use]
    pub fn log(&self) -> &RecordLog {
        &self.log
    }
}

/// A tool invocation paired with its result, if one was logged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
    pub result: Option<Value>,
    pub is_error: bool,
    /// Sub-agent that made the call, `None` for the main conversation.
    pub agent_id: Option<String>,
}

/// One logical conversation: a main file plus its sub-agent files.
///
/// Built by [`SessionAssembler`](super::SessionAssembler) and never mutated
/// afterwards. All aggregates are computed on access.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    slug: Option<String>,
    path: PathBuf,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    log: RecordLog,
    agents: Vec<AgentSession>,
    todos: Vec<TodoItem>,
    file_history: Vec<FileHistoryEntry>,
    debug_log: Option<PathBuf>,
}

impl Session {
    pub(crate) fn new(
        id: String,
        path: PathBuf,
        records: Vec<Record>,
        agents: Vec<AgentSession>,
        todos: Vec<TodoItem>,
        file_history: Vec<FileHistoryEntry>,
        debug_log: Option<PathBuf>,
    ) -> Self {
        let slug = records.iter().find_map(|r| r.meta.slug.clone());

        let timestamps = records
            .iter()
            .chain(agents.iter().flat_map(|a| a.records()))
            .filter_map(Record::timestamp);
        let (started_at, ended_at) = timestamps.fold(
            (None::<DateTime<Utc>>, None::<DateTime<Utc>>),
            |(min, max), ts| {
                (
                    Some(min.map_or(ts, |m| m.min(ts))),
                    Some(max.map_or(ts, |m| m.max(ts))),
                )
            },
        );

        Self {
            id,
            slug,
            path,
            started_at,
            ended_at,
            log: RecordLog::new(records),
            agents,
            todos,
            file_history,
            debug_log,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human readable name, from the first main record that carries one.
    #[must_use]
    pub fn slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    /// Path of the main log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Earliest timestamp across main and agent records.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Latest timestamp across main and agent records.
    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        Some(self.ended_at? - self.started_at?)
    }

    /// Main file records in file order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        self.log.records()
    }

    #[must_use]
    pub fn log(&self) -> &RecordLog {
        &self.log
    }

    #[must_use]
    pub fn agents(&self) -> &[AgentSession] {
        &self.agents
    }

    #[must_use]
    pub fn agent(&self, agent_id: &str) -> Option<&AgentSession> {
        self.agents.iter().find(|a| a.agent_id == agent_id)
    }

    #[must_use]
    pub fn todos(&self) -> &[TodoItem] {
        &self.todos
    }

    #[must_use]
    pub fn file_history(&self) -> &[FileHistoryEntry] {
        &self.file_history
    }

    #[must_use]
    pub fn debug_log(&self) -> Option<&Path> {
        self.debug_log.as_deref()
    }

    /// Thread ending at `uuid` in the main file.
    #[must_use]
    pub fn thread(&self, uuid: &str) -> Vec<&Record> {
        self.log.thread(uuid)
    }

    #[must_use]
    pub fn children(&self, uuid: &str) -> Vec<&Record> {
        self.log.children(uuid)
    }

    #[must_use]
    pub fn root_messages(&self) -> Vec<&Record> {
        self.log.root_messages()
    }

    fn all_records(&self) -> impl Iterator<Item = &Record> {
        self.records()
            .iter()
            .chain(self.agents.iter().flat_map(AgentSession::records))
    }

    fn assistant_records(&self) -> impl Iterator<Item = &AssistantRecord> {
        self.all_records().filter_map(Record::as_assistant)
    }

    /// Number of model responses, main and agents.
    #[must_use]
    pub fn response_count(&self) -> usize {
        self.assistant_records().count()
    }

    /// Summed usage over every model response, main and agents.
    #[must_use]
    pub fn total_usage(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for assistant in self.assistant_records() {
            total += &assistant.message.usage;
        }
        total
    }

    /// Mean of input plus output tokens per response, 0 with no responses.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_tokens_per_response(&self) -> f64 {
        let responses = self.response_count();
        if responses == 0 {
            return 0.0;
        }
        self.total_usage().total() as f64 / responses as f64
    }

    /// Invocation count per tool name.
    #[must_use]
    pub fn tool_usage(&self) -> BTreeMap<String, usize> {
        let mut usage = BTreeMap::new();
        for assistant in self.assistant_records() {
            for (_, name, _) in assistant.tool_uses() {
                *usage.entry(name.to_string()).or_insert(0) += 1;
            }
        }
        usage
    }

    /// Response count per model.
    #[must_use]
    pub fn model_usage(&self) -> BTreeMap<String, usize> {
        let mut usage = BTreeMap::new();
        for model in self
            .assistant_records()
            .filter_map(|a| a.message.model.as_deref())
        {
            *usage.entry(model.to_string()).or_insert(0) += 1;
        }
        usage
    }

    #[must_use]
    pub fn web_search_count(&self) -> u64 {
        self.assistant_records()
            .map(|a| a.message.usage.web_search_requests())
            .sum()
    }

    #[must_use]
    pub fn web_fetch_count(&self) -> u64 {
        self.assistant_records()
            .map(|a| a.message.usage.web_fetch_requests())
            .sum()
    }

    /// Distinct file paths backed up by any snapshot in the main file.
    #[must_use]
    pub fn modified_files(&self) -> BTreeSet<String> {
        self.records()
            .iter()
            .filter_map(Record::as_file_history_snapshot)
            .flat_map(|s| s.snapshot.tracked_file_backups.keys().cloned())
            .collect()
    }

    /// Whether any model response was an API error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.assistant_records().any(|a| a.is_api_error_message)
    }

    /// Every tool invocation in main-then-agent order, paired with the
    /// result carrying the same id from any file of the session.
    #[must_use]
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        let mut results: HashMap<&str, (&Value, bool)> = HashMap::new();
        for record in self.all_records() {
            let Some(user) = record.as_user() else {
                continue;
            };
            for block in user.message.content.blocks() {
                if let ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } = block
                {
                    results
                        .entry(tool_use_id.as_str())
                        .or_insert((content, *is_error));
                }
            }
        }

        let main = self.records().iter().map(|r| (None, r));
        let agents = self
            .agents
            .iter()
            .flat_map(|a| a.records().iter().map(move |r| (Some(a.agent_id()), r)));

        main.chain(agents)
            .filter_map(|(agent_id, record)| Some((agent_id, record.as_assistant()?)))
            .flat_map(|(agent_id, assistant)| {
                assistant.tool_uses().map(move |(id, name, input)| (agent_id, id, name, input))
            })
            .map(|(agent_id, id, name, input)| {
                let result = results.get(id);
                ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    input: input.clone(),
                    result: result.map(|(content, _)| (*content).clone()),
                    is_error: result.is_some_and(|(_, is_error)| *is_error),
                    agent_id: agent_id.map(str::to_string),
                }
            })
            .collect()
    }
}
