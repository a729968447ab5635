//! Operation history for sequential undo.
//!
//! Every committed mutation pushes one [`OperationRecord`] holding tagged
//! before/after snapshots of the tasks it touched. A bulk operation pushes a
//! single record covering the whole set, so one undo reverses all of it.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::Task;

/// Snapshot pair for one affected task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskChange {
    /// Task did not exist before
    Created { after: Task },
    Updated { before: Task, after: Task },
    /// Task no longer exists after
    Deleted { before: Task },
    Archived { before: Task, after: Task },
}

impl TaskChange {
    /// Id of the affected task
    pub fn task_id(&self) -> &str {
        match self {
            TaskChange::Created { after } => &after.id,
            TaskChange::Updated { after, .. } => &after.id,
            TaskChange::Deleted { before } => &before.id,
            TaskChange::Archived { after, .. } => &after.id,
        }
    }
}

/// One entry in the undo stack
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationRecord {
    pub operation_id: Uuid,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub changes: Vec<TaskChange>,
}

/// Bounded stack of operation records, newest last
#[derive(Debug)]
pub struct OperationHistory {
    records: VecDeque<OperationRecord>,
    max_depth: usize,
}

impl OperationHistory {
    pub fn new(max_depth: usize) -> Self {
        Self {
            records: VecDeque::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Push a record for a committed mutation; evicts the oldest entry once
    /// the configured depth is exceeded.
    pub fn record(&mut self, description: impl Into<String>, changes: Vec<TaskChange>) -> Uuid {
        let record = OperationRecord {
            operation_id: Uuid::new_v4(),
            description: description.into(),
            timestamp: Utc::now(),
            changes,
        };
        let id = record.operation_id;

        self.records.push_back(record);
        while self.records.len() > self.max_depth {
            self.records.pop_front();
        }
        id
    }

    /// Remove and return the most recent record
    pub fn pop(&mut self) -> Option<OperationRecord> {
        self.records.pop_back()
    }

    /// Re-insert a record popped for an undo whose persist failed.
    pub(crate) fn push_back(&mut self, record: OperationRecord) {
        self.records.push_back(record);
    }

    /// Most recent records first, at most `limit`
    pub fn list(&self, limit: Option<usize>) -> Vec<&OperationRecord> {
        let take = limit.unwrap_or(self.records.len());
        self.records.iter().rev().take(take).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskPriority, TaskStatus};
    use std::collections::BTreeSet;

    fn task(id: &str) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            tags: BTreeSet::new(),
            dependencies: BTreeSet::new(),
            archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn records_stack_newest_last_and_list_newest_first() {
        let mut history = OperationHistory::new(10);
        history.record("create a", vec![TaskChange::Created { after: task("a") }]);
        history.record("create b", vec![TaskChange::Created { after: task("b") }]);

        let listed = history.list(None);
        assert_eq!(listed[0].description, "create b");
        assert_eq!(listed[1].description, "create a");

        let popped = history.pop().unwrap();
        assert_eq!(popped.description, "create b");
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn depth_cap_evicts_oldest() {
        let mut history = OperationHistory::new(2);
        for id in ["a", "b", "c"] {
            history.record(
                format!("create {id}"),
                vec![TaskChange::Created { after: task(id) }],
            );
        }

        assert_eq!(history.len(), 2);
        let listed = history.list(None);
        assert_eq!(listed[0].description, "create c");
        assert_eq!(listed[1].description, "create b");
    }

    #[test]
    fn list_honors_limit() {
        let mut history = OperationHistory::new(10);
        for id in ["a", "b", "c"] {
            history.record(
                format!("create {id}"),
                vec![TaskChange::Created { after: task(id) }],
            );
        }
        assert_eq!(history.list(Some(2)).len(), 2);
    }

    #[test]
    fn change_records_serialize_with_kind_tags() {
        let change = TaskChange::Deleted { before: task("a") };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["kind"], "deleted");
        assert_eq!(json["before"]["id"], "a");
    }
}
