//! Atomic multi-task operations.
//!
//! Two phases, strictly separated. Validation resolves every target, checks
//! the patch (or delete impact) against a staged copy of the task map, and
//! aborts the whole call with a per-id failure report if anything is wrong.
//! Only then does the apply phase run: batched persistence, one operation
//! record for the whole set, one flush. A dry run stops after validation and
//! returns the same impact report with nothing mutated.

use std::collections::BTreeSet;

use chrono::Utc;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::error::{BulkFailure, Error, Result};
use crate::events::ChangeKind;
use crate::graph;
use crate::history::TaskChange;
use crate::repository::{apply_patch, scrub_archived_edges, DeleteStrategy, TaskRepository};
use crate::task::{self, Task, TaskPatch};

/// Options for [`BulkCoordinator::bulk_update`]
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkOptions {
    pub dry_run: bool,
}

/// Options for [`BulkCoordinator::bulk_delete`]
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkDeleteOptions {
    pub force: bool,
    pub strategy: DeleteStrategy,
    pub dry_run: bool,
}

/// What happened (or would happen) to one target
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BulkAction {
    Update,
    Delete {
        /// Dependents removed alongside the target (cascade strategy)
        #[serde(skip_serializing_if = "Vec::is_empty")]
        cascaded: Vec<String>,
        /// Dependents whose dependency sets were rewritten (reassign)
        #[serde(skip_serializing_if = "Vec::is_empty")]
        reassigned: Vec<String>,
        /// Target was already gone, removed by an earlier cascade in the
        /// same bulk call
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        removed_by_cascade: bool,
    },
}

/// Per-target entry in a bulk report
#[derive(Debug, Clone, Serialize)]
pub struct BulkItem {
    /// The id as the caller supplied it
    pub input: String,
    /// Resolved canonical id
    pub id: String,
    #[serde(flatten)]
    pub action: BulkAction,
}

/// Outcome of a (possibly dry-run) bulk operation
#[derive(Debug, Clone, Serialize)]
pub struct BulkResult {
    pub dry_run: bool,
    pub items: Vec<BulkItem>,
}

/// Orchestrator for all-or-nothing multi-task mutations
pub struct BulkCoordinator;

impl BulkCoordinator {
    /// Apply one patch to many tasks atomically.
    pub fn bulk_update(
        repo: &mut TaskRepository,
        inputs: &[String],
        patch: &TaskPatch,
        options: BulkOptions,
    ) -> Result<BulkResult> {
        if inputs.is_empty() {
            return Err(Error::Validation("bulk update needs at least one target".to_string()));
        }
        if patch.is_empty() {
            return Err(Error::Validation("patch contains no fields".to_string()));
        }

        // Validation pass over a staged copy: each target is checked against
        // the state the patch would leave behind for the targets before it,
        // so cycles between co-targets are caught up front.
        let mut staged = repo.data().tasks.clone();
        let mut failures = Vec::new();
        let mut items = Vec::new();
        let mut targets: Vec<String> = Vec::new();
        let mut seen = BTreeSet::new();

        for input in inputs {
            let id = match resolve_target(repo, input, &mut seen, &mut failures) {
                Some(id) => id,
                None => continue,
            };
            if let Err(err) = validate_patch_staged(&staged, &id, patch) {
                failures.push(failure_for(input, &err));
                continue;
            }
            let mut after = staged[&id].clone();
            apply_patch(&mut after, patch.clone());
            staged.insert(id.clone(), after);

            items.push(BulkItem {
                input: input.clone(),
                id: id.clone(),
                action: BulkAction::Update,
            });
            targets.push(id);
        }

        if !failures.is_empty() {
            return Err(Error::BulkFailed { failures });
        }
        if options.dry_run {
            debug!(targets = targets.len(), "bulk update dry run");
            return Ok(BulkResult { dry_run: true, items });
        }

        let now = Utc::now();
        let mut changes = Vec::with_capacity(targets.len());
        for id in &targets {
            let before = repo.data().tasks[id].clone();
            let mut after = before.clone();
            apply_patch(&mut after, patch.clone());
            after.updated_at = now;
            changes.push(TaskChange::Updated { before, after });
        }

        repo.commit_batched(
            format!("bulk update {} task(s)", targets.len()),
            changes,
            ChangeKind::BulkApplied,
        )?;
        Ok(BulkResult { dry_run: false, items })
    }

    /// Delete many tasks atomically, with the same conflict rules as
    /// single-task delete. Dependents inside the requested set never count
    /// as conflicts; external dependents require `force` and a strategy.
    pub fn bulk_delete(
        repo: &mut TaskRepository,
        inputs: &[String],
        options: BulkDeleteOptions,
    ) -> Result<BulkResult> {
        if inputs.is_empty() {
            return Err(Error::Validation("bulk delete needs at least one target".to_string()));
        }

        let mut failures = Vec::new();
        let mut resolved: Vec<(String, String)> = Vec::new(); // (input, id)
        let mut seen = BTreeSet::new();
        for input in inputs {
            if let Some(id) = resolve_target(repo, input, &mut seen, &mut failures) {
                resolved.push((input.clone(), id));
            }
        }
        let target_set: BTreeSet<String> = resolved.iter().map(|(_, id)| id.clone()).collect();

        // Plan against a staged copy so earlier deletions shape the impact
        // of later ones.
        let mut staged = repo.data().tasks.clone();
        let mut items = Vec::new();
        let mut changes = Vec::new();

        for (input, id) in &resolved {
            if !staged.contains_key(id) {
                items.push(BulkItem {
                    input: input.clone(),
                    id: id.clone(),
                    action: BulkAction::Delete {
                        cascaded: Vec::new(),
                        reassigned: Vec::new(),
                        removed_by_cascade: true,
                    },
                });
                continue;
            }

            let dependents = graph::affected_by(&staged, id);
            let external: Vec<String> = dependents
                .iter()
                .filter(|d| !target_set.contains(*d))
                .cloned()
                .collect();
            if !external.is_empty() && !options.force {
                let err = Error::DeleteBlocked {
                    id: id.clone(),
                    dependents: external,
                };
                failures.push(failure_for(input, &err));
                continue;
            }

            let action = plan_delete(&mut staged, id, &dependents, options, &mut changes);
            items.push(BulkItem {
                input: input.clone(),
                id: id.clone(),
                action,
            });
        }

        if !failures.is_empty() {
            return Err(Error::BulkFailed { failures });
        }
        if options.dry_run {
            debug!(targets = resolved.len(), "bulk delete dry run");
            return Ok(BulkResult { dry_run: true, items });
        }

        repo.commit_batched(
            format!("bulk delete {} task(s)", resolved.len()),
            changes,
            ChangeKind::BulkApplied,
        )?;
        Ok(BulkResult { dry_run: false, items })
    }
}

/// Remove one target from the staged map per the chosen strategy, pushing
/// the resulting change records.
fn plan_delete(
    staged: &mut IndexMap<String, Task>,
    id: &str,
    dependents: &BTreeSet<String>,
    options: BulkDeleteOptions,
    changes: &mut Vec<TaskChange>,
) -> BulkAction {
    match options.strategy {
        DeleteStrategy::Cascade if options.force => {
            let mut cascaded: Vec<String> = graph::transitive_dependents(staged, id)
                .into_iter()
                .collect();
            let mut victims = cascaded.clone();
            victims.push(id.to_string());
            let mut removed_ids = BTreeSet::new();
            for victim in &victims {
                if let Some(task) = staged.shift_remove(victim) {
                    removed_ids.insert(task.id.clone());
                    changes.push(TaskChange::Deleted { before: task });
                }
            }
            scrub_archived_edges(staged, &removed_ids, changes);
            cascaded.sort();
            BulkAction::Delete {
                cascaded,
                reassigned: Vec::new(),
                removed_by_cascade: false,
            }
        }
        _ => {
            let target_deps = staged[id].dependencies.clone();
            let mut reassigned = Vec::new();
            for dependent_id in dependents {
                let Some(dependent) = staged.get(dependent_id) else {
                    continue;
                };
                let mut after = dependent.clone();
                let before = dependent.clone();
                after.dependencies.remove(id);
                if options.strategy == DeleteStrategy::ReassignToParents {
                    after.dependencies.extend(target_deps.iter().cloned());
                }
                after.updated_at = Utc::now();
                staged.insert(dependent_id.clone(), after.clone());
                changes.push(TaskChange::Updated { before, after });
                reassigned.push(dependent_id.clone());
            }
            if let Some(task) = staged.shift_remove(id) {
                changes.push(TaskChange::Deleted { before: task });
            }
            scrub_archived_edges(staged, &BTreeSet::from([id.to_string()]), changes);
            BulkAction::Delete {
                cascaded: Vec::new(),
                reassigned,
                removed_by_cascade: false,
            }
        }
    }
}

fn resolve_target(
    repo: &TaskRepository,
    input: &str,
    seen: &mut BTreeSet<String>,
    failures: &mut Vec<BulkFailure>,
) -> Option<String> {
    match repo.resolve_id(input) {
        Ok(id) => {
            if !seen.insert(id.clone()) {
                failures.push(BulkFailure {
                    input: input.to_string(),
                    code: crate::error::codes::VALIDATION.to_string(),
                    message: format!("duplicate target: {id}"),
                });
                return None;
            }
            Some(id)
        }
        Err(err) => {
            failures.push(failure_for(input, &err));
            None
        }
    }
}

fn failure_for(input: &str, err: &Error) -> BulkFailure {
    BulkFailure {
        input: input.to_string(),
        code: err.code().to_string(),
        message: err.to_string(),
    }
}

/// Patch validation against a staged task map (co-target aware).
fn validate_patch_staged(
    staged: &IndexMap<String, Task>,
    id: &str,
    patch: &TaskPatch,
) -> Result<()> {
    if let Some(title) = &patch.title {
        task::validate_title(title)?;
    }
    if let Some(deps) = &patch.dependencies {
        let unknown = graph::unknown_dependencies(staged, deps);
        if !unknown.is_empty() {
            return Err(Error::Validation(format!(
                "unknown or archived dependencies: {}",
                unknown.join(", ")
            )));
        }
        if let Some(chain) = graph::find_cycle(staged, id, deps) {
            return Err(Error::CircularDependency { chain });
        }
    }
    Ok(())
}
