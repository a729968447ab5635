//! The in-memory task index and every single-task operation.
//!
//! `TaskRepository` owns the working copy of the data file, the undo
//! history, and the store that persists both. All mutations follow one
//! protocol: validate, snapshot the affected tasks, apply, persist, record
//! one operation, notify sinks. A failed persist rolls the in-memory state
//! back to the snapshots, so callers can retry safely.

use std::collections::BTreeSet;

use chrono::Utc;
use indexmap::IndexMap;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::events::{ChangeEvent, ChangeKind, ChangeSink};
use crate::graph;
use crate::history::{OperationHistory, OperationRecord, TaskChange};
use crate::resolve;
use crate::search::{SearchOptions, SearchOutcome, TaskSearchEngine};
use crate::store::{DurableStore, PersistenceMode, TodoDataFile};
use crate::task::{self, NewTask, Pagination, Task, TaskFilter, TaskPatch};

/// Longest random suffix a generated id can carry (the ulid random part)
const MAX_ID_SUFFIX_LEN: usize = 16;

/// How dependents are handled on a forced delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteStrategy {
    /// Drop the edge to the deleted task (the default)
    #[default]
    Reassign,
    /// Rewire dependents to the deleted task's own dependencies
    ReassignToParents,
    /// Recursively delete every transitive dependent
    Cascade,
}

/// Options for [`TaskRepository::delete_task`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    pub force: bool,
    pub strategy: DeleteStrategy,
}

/// Single-writer repository over the task data file
pub struct TaskRepository {
    store: DurableStore,
    config: EngineConfig,
    data: TodoDataFile,
    history: OperationHistory,
    search: TaskSearchEngine,
    sinks: Vec<Box<dyn ChangeSink>>,
}

impl TaskRepository {
    /// Load the repository from the store's data file (empty if absent).
    pub fn open(mut store: DurableStore, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        if !config.persistence.immediate {
            store.set_mode(PersistenceMode::Batched);
        }
        let data = store.load()?;
        debug!(
            tasks = data.tasks.len(),
            version = data.version,
            "repository opened"
        );
        Ok(Self {
            history: OperationHistory::new(config.history.max_depth),
            search: TaskSearchEngine::new(config.search.clone()),
            store,
            config,
            data,
            sinks: Vec::new(),
        })
    }

    /// Subscribe a post-commit sink (markdown mirror, test probe, ...).
    pub fn subscribe(&mut self, sink: Box<dyn ChangeSink>) {
        self.sinks.push(sink);
    }

    /// Write batched mutations to disk. A no-op in immediate mode or when
    /// nothing is pending.
    pub fn flush(&mut self) -> Result<()> {
        self.store.flush_batch(&self.data)
    }

    pub fn data(&self) -> &TodoDataFile {
        &self.data
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Read operations
    // =========================================================================

    /// Resolve a possibly-partial id to a canonical one.
    pub fn resolve_id(&self, input: &str) -> Result<String> {
        resolve::resolve(&self.data.tasks, input, self.config.search.suggestion_count)
    }

    pub fn get_task(&self, input: &str) -> Result<Task> {
        let id = self.resolve_id(input)?;
        Ok(self.data.tasks[&id].clone())
    }

    /// Filtered, stably ordered, paginated listing. Archived tasks are
    /// excluded unless the filter opts in.
    pub fn list_tasks(&self, filter: &TaskFilter, page: &Pagination) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .data
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        task::sort_tasks(&mut tasks);

        tasks
            .into_iter()
            .skip(page.offset)
            .take(page.limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Ranked multi-field search.
    pub fn find_tasks(&self, query: &str, options: &SearchOptions) -> Result<SearchOutcome> {
        self.search.search(&self.data.tasks, query, options)
    }

    /// Most recent operation records, newest first.
    pub fn undo_history(&self, limit: Option<usize>) -> Vec<OperationRecord> {
        self.history.list(limit).into_iter().cloned().collect()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub fn create_task(&mut self, fields: NewTask) -> Result<Task> {
        task::validate_title(&fields.title)?;
        self.check_dependencies_exist(&fields.dependencies)?;

        let now = Utc::now();
        let id = self.generate_task_id();
        let created = Task {
            id: id.clone(),
            title: fields.title.trim().to_string(),
            description: fields.description,
            status: fields.status,
            priority: fields.priority,
            tags: fields.tags,
            dependencies: fields.dependencies,
            archived: false,
            created_at: now,
            updated_at: now,
        };

        self.data.tasks.insert(id.clone(), created.clone());
        self.commit(
            format!("create {id}"),
            vec![TaskChange::Created {
                after: created.clone(),
            }],
            ChangeKind::TaskCreated,
        )?;
        Ok(created)
    }

    pub fn update_task(&mut self, input: &str, patch: TaskPatch) -> Result<Task> {
        if patch.is_empty() {
            return Err(Error::Validation("patch contains no fields".to_string()));
        }
        let id = self.resolve_id(input)?;
        self.validate_patch(&id, &patch)?;

        let before = self.data.tasks[&id].clone();
        let mut after = before.clone();
        apply_patch(&mut after, patch);
        after.updated_at = Utc::now();

        self.data.tasks.insert(id.clone(), after.clone());
        self.commit(
            format!("update {id}"),
            vec![TaskChange::Updated { before, after: after.clone() }],
            ChangeKind::TaskUpdated,
        )?;
        Ok(after)
    }

    /// Validate a patch against a target without touching anything.
    /// Bulk validation reuses this for its pre-flight pass.
    pub(crate) fn validate_patch(&self, id: &str, patch: &TaskPatch) -> Result<()> {
        if let Some(title) = &patch.title {
            task::validate_title(title)?;
        }
        if let Some(deps) = &patch.dependencies {
            self.check_dependencies_exist(deps)?;
            if let Some(chain) = graph::find_cycle(&self.data.tasks, id, deps) {
                return Err(Error::CircularDependency { chain });
            }
        }
        Ok(())
    }

    /// Delete a task. Without `force` the call fails if anything depends on
    /// the target; with `force` the chosen strategy decides whether
    /// dependents are rewired or cascaded away. Returns every removed task.
    pub fn delete_task(&mut self, input: &str, options: DeleteOptions) -> Result<Vec<Task>> {
        let id = self.resolve_id(input)?;
        let dependents = graph::affected_by(&self.data.tasks, &id);

        if !dependents.is_empty() && !options.force {
            return Err(Error::DeleteBlocked {
                id,
                dependents: dependents.into_iter().collect(),
            });
        }

        let mut changes = Vec::new();
        let mut removed = Vec::new();

        match options.strategy {
            DeleteStrategy::Cascade => {
                let mut victims: Vec<String> =
                    graph::transitive_dependents(&self.data.tasks, &id)
                        .into_iter()
                        .collect();
                victims.push(id.clone());
                for victim in victims {
                    if let Some(task) = self.data.tasks.shift_remove(&victim) {
                        changes.push(TaskChange::Deleted {
                            before: task.clone(),
                        });
                        removed.push(task);
                    }
                }
            }
            DeleteStrategy::Reassign | DeleteStrategy::ReassignToParents => {
                let target = self.data.tasks[&id].clone();
                for dependent_id in &dependents {
                    let before = self.data.tasks[dependent_id].clone();
                    let mut after = before.clone();
                    after.dependencies.remove(&id);
                    if options.strategy == DeleteStrategy::ReassignToParents {
                        after.dependencies.extend(target.dependencies.iter().cloned());
                    }
                    after.updated_at = Utc::now();
                    self.data.tasks.insert(dependent_id.clone(), after.clone());
                    changes.push(TaskChange::Updated { before, after });
                }
                if let Some(task) = self.data.tasks.shift_remove(&id) {
                    changes.push(TaskChange::Deleted {
                        before: task.clone(),
                    });
                    removed.push(task);
                }
            }
        }

        // Archived records may still hold edges to the removed tasks.
        let removed_ids: BTreeSet<String> = removed.iter().map(|t| t.id.clone()).collect();
        scrub_archived_edges(&mut self.data.tasks, &removed_ids, &mut changes);

        self.commit(format!("delete {id}"), changes, ChangeKind::TaskDeleted)?;
        Ok(removed)
    }

    /// Archive a task: invisible to default listings/search, retained for
    /// audit and undo. Refused while unarchived tasks still depend on it.
    pub fn archive_task(&mut self, input: &str) -> Result<Task> {
        let id = self.resolve_id(input)?;
        let before = self.data.tasks[&id].clone();
        if before.archived {
            return Err(Error::Validation(format!("task {id} is already archived")));
        }

        let dependents = graph::affected_by(&self.data.tasks, &id);
        if !dependents.is_empty() {
            return Err(Error::DeleteBlocked {
                id,
                dependents: dependents.into_iter().collect(),
            });
        }

        let mut after = before.clone();
        after.archived = true;
        after.updated_at = Utc::now();
        self.data.tasks.insert(id.clone(), after.clone());

        self.commit(
            format!("archive {id}"),
            vec![TaskChange::Archived {
                before,
                after: after.clone(),
            }],
            ChangeKind::TaskArchived,
        )?;
        Ok(after)
    }

    /// Reverse the most recently committed operation and return the restored
    /// tasks. Undo is not itself recorded; calling it repeatedly walks the
    /// stack further back.
    pub fn undo_last(&mut self) -> Result<Vec<Task>> {
        let record = self.history.pop().ok_or(Error::NothingToUndo)?;

        for change in record.changes.iter().rev() {
            apply_before_image(&mut self.data, change);
        }

        if let Err(err) = self.store.persist(&mut self.data) {
            // Redo in memory and put the record back; nothing changed.
            for change in &record.changes {
                apply_after_image(&mut self.data, change);
            }
            self.history.push_back(record);
            return Err(err);
        }

        let restored: Vec<Task> = record
            .changes
            .iter()
            .filter_map(|change| match change {
                TaskChange::Created { .. } => None,
                TaskChange::Updated { before, .. }
                | TaskChange::Deleted { before }
                | TaskChange::Archived { before, .. } => Some(before.clone()),
            })
            .collect();

        info!(
            operation = %record.operation_id,
            description = %record.description,
            "operation undone"
        );
        let task_ids = record
            .changes
            .iter()
            .map(|c| c.task_id().to_string())
            .collect();
        self.notify(ChangeKind::TaskRestored, task_ids);
        Ok(restored)
    }

    // =========================================================================
    // Internals (shared with the bulk coordinator)
    // =========================================================================

    pub(crate) fn check_dependencies_exist(&self, deps: &BTreeSet<String>) -> Result<()> {
        let unknown = graph::unknown_dependencies(&self.data.tasks, deps);
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "unknown or archived dependencies: {}",
                unknown.join(", ")
            )))
        }
    }

    /// Persist, record, notify. Rolls the in-memory state back to the
    /// before-images if the write fails.
    pub(crate) fn commit(
        &mut self,
        description: String,
        changes: Vec<TaskChange>,
        kind: ChangeKind,
    ) -> Result<()> {
        if let Err(err) = self.store.persist(&mut self.data) {
            for change in changes.iter().rev() {
                apply_before_image(&mut self.data, change);
            }
            return Err(err);
        }

        let task_ids = event_task_ids(kind, &changes);
        let operation_id = self.history.record(description.clone(), changes);
        info!(%operation_id, %description, "operation committed");
        self.notify(kind, task_ids);
        Ok(())
    }

    /// Apply a pre-validated change set as one atomic unit: batched mode for
    /// the duration, one operation record, one flush. On a flush failure the
    /// in-memory state is rolled back change by change and nothing is
    /// recorded.
    pub(crate) fn commit_batched(
        &mut self,
        description: String,
        changes: Vec<TaskChange>,
        kind: ChangeKind,
    ) -> Result<()> {
        let prior_mode = self.store.mode();
        self.store.set_mode(PersistenceMode::Batched);

        for change in &changes {
            apply_after_image(&mut self.data, change);
        }
        let prev_modified = self.data.metadata.last_modified;
        let result = self
            .store
            .persist(&mut self.data)
            .and_then(|_| self.store.flush_batch(&self.data));
        self.store.set_mode(prior_mode);

        if let Err(err) = result {
            for change in changes.iter().rev() {
                apply_before_image(&mut self.data, change);
            }
            self.data.version -= 1;
            self.data.metadata.last_modified = prev_modified;
            return Err(err);
        }

        let task_ids = event_task_ids(kind, &changes);
        let operation_id = self.history.record(description.clone(), changes);
        info!(%operation_id, %description, "batched operation committed");
        self.notify(kind, task_ids);
        Ok(())
    }

    pub(crate) fn notify(&mut self, kind: ChangeKind, task_ids: Vec<String>) {
        if self.sinks.is_empty() {
            return;
        }
        let event = ChangeEvent::new(kind, task_ids);
        for sink in &mut self.sinks {
            if let Err(err) = sink.emit(&event) {
                warn!(error = %err, "change sink failed; continuing");
            }
        }
    }

    /// New collision-free id: configured prefix plus the tail of a fresh
    /// ulid, growing the suffix when the namespace gets crowded.
    fn generate_task_id(&self) -> String {
        let prefix = self.config.ids.prefix.trim().to_lowercase();
        let mut len = self.config.ids.min_len.clamp(1, MAX_ID_SUFFIX_LEN);

        loop {
            for _ in 0..8 {
                let base = Ulid::new().to_string().to_lowercase();
                let suffix = &base[base.len() - len..];
                let candidate = format!("{prefix}-{suffix}");
                if !self.data.tasks.contains_key(&candidate) {
                    return candidate;
                }
            }
            if len < MAX_ID_SUFFIX_LEN {
                len += 1;
            }
        }
    }
}

/// Drop edges that archived records still hold to tasks in `removed_ids`.
/// Active dependents are rewired by the delete strategies before removal;
/// archived ones sit outside the graph, so their records are scrubbed here.
pub(crate) fn scrub_archived_edges(
    tasks: &mut IndexMap<String, Task>,
    removed_ids: &BTreeSet<String>,
    changes: &mut Vec<TaskChange>,
) {
    let holders: Vec<String> = tasks
        .values()
        .filter(|t| t.archived && t.dependencies.iter().any(|d| removed_ids.contains(d)))
        .map(|t| t.id.clone())
        .collect();

    for holder in holders {
        let Some(before) = tasks.get(&holder).cloned() else {
            continue;
        };
        let mut after = before.clone();
        after.dependencies.retain(|d| !removed_ids.contains(d));
        after.updated_at = Utc::now();
        tasks.insert(holder, after.clone());
        changes.push(TaskChange::Updated { before, after });
    }
}

/// Ids an event should carry. A delete event names only the tasks that were
/// actually removed; dependents that were merely rewired stay out of it.
fn event_task_ids(kind: ChangeKind, changes: &[TaskChange]) -> Vec<String> {
    changes
        .iter()
        .filter(|change| {
            kind != ChangeKind::TaskDeleted || matches!(change, TaskChange::Deleted { .. })
        })
        .map(|change| change.task_id().to_string())
        .collect()
}

/// Replay a change's before-image into the map (undo direction).
pub(crate) fn apply_before_image(data: &mut TodoDataFile, change: &TaskChange) {
    match change {
        TaskChange::Created { after } => {
            data.tasks.shift_remove(&after.id);
        }
        TaskChange::Updated { before, .. }
        | TaskChange::Deleted { before }
        | TaskChange::Archived { before, .. } => {
            data.tasks.insert(before.id.clone(), before.clone());
        }
    }
}

/// Replay a change's after-image into the map (redo direction, used to back
/// out of a failed undo persist).
pub(crate) fn apply_after_image(data: &mut TodoDataFile, change: &TaskChange) {
    match change {
        TaskChange::Created { after }
        | TaskChange::Updated { after, .. }
        | TaskChange::Archived { after, .. } => {
            data.tasks.insert(after.id.clone(), after.clone());
        }
        TaskChange::Deleted { before } => {
            data.tasks.shift_remove(&before.id);
        }
    }
}

pub(crate) fn apply_patch(task: &mut Task, patch: TaskPatch) {
    if let Some(title) = patch.title {
        task.title = title.trim().to_string();
    }
    if let Some(description) = patch.description {
        task.description = description;
    }
    if let Some(status) = patch.status {
        task.status = status;
    }
    if let Some(priority) = patch.priority {
        task.priority = priority;
    }
    if let Some(tags) = patch.tags {
        task.tags = tags;
    }
    if let Some(dependencies) = patch.dependencies {
        task.dependencies = dependencies;
    }
}
