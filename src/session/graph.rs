//! Per-file record index and `parentUuid` navigation.
//!
//! Uuids are only unique within one file, so each file gets its own
//! [`RecordLog`]. Indexes are never merged across files.

use std::collections::{HashMap, HashSet};

use crate::watcher::Record;

/// Records of one log file with a `uuid` index.
#[derive(Debug, Clone, Default)]
pub struct RecordLog {
    records: Vec<Record>,
    /// uuid -> position. The first occurrence wins.
    by_uuid: HashMap<String, usize>,
    /// parent uuid -> child positions in file order.
    children: HashMap<String, Vec<usize>>,
}

impl RecordLog {
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        let mut by_uuid = HashMap::new();
        let mut children: HashMap<String, Vec<usize>> = HashMap::new();

        for (idx, record) in records.iter().enumerate() {
            if let Some(uuid) = record.uuid() {
                by_uuid.entry(uuid.to_string()).or_insert(idx);
            }
            if let Some(parent) = record.parent_uuid() {
                children.entry(parent.to_string()).or_default().push(idx);
            }
        }

        Self {
            records,
            by_uuid,
            children,
        }
    }

    /// All records in file order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, uuid: &str) -> Option<&Record> {
        self.by_uuid.get(uuid).map(|&idx| &self.records[idx])
    }

    /// Root-to-leaf path ending at `uuid`.
    ///
    /// Walks `parentUuid` links upward and stops at a parent that is not in
    /// this file, or at a uuid already visited. Empty if `uuid` is unknown.
    #[must_use]
    pub fn thread(&self, uuid: &str) -> Vec<&Record> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.get(uuid);

        while let Some(record) = current {
            let Some(id) = record.uuid() else { break };
            if !seen.insert(id) {
                tracing::debug!(uuid = id, "parentUuid cycle, stopping thread walk");
                break;
            }
            path.push(record);
            current = record.parent_uuid().and_then(|parent| self.get(parent));
        }

        path.reverse();
        path
    }

    /// Records whose `parentUuid` is `uuid`, in file order.
    #[must_use]
    pub fn children(&self, uuid: &str) -> Vec<&Record> {
        self.children
            .get(uuid)
            .map(|indices| indices.iter().map(|&idx| &self.records[idx]).collect())
            .unwrap_or_default()
    }

    /// Records with a uuid and no parent.
    #[must_use]
    pub fn root_messages(&self) -> Vec<&Record> {
        self.records
            .iter()
            .filter(|r| r.uuid().is_some() && r.parent_uuid().is_none())
            .collect()
    }
}
