//! Dependency graph queries over the task map.
//!
//! Edges point from a task to the tasks it depends on. Archived tasks are
//! outside the graph: they can neither be depended on nor contribute edges.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::task::Task;

/// Dependencies named in `deps` that do not exist or are archived
pub fn unknown_dependencies(tasks: &IndexMap<String, Task>, deps: &BTreeSet<String>) -> Vec<String> {
    deps.iter()
        .filter(|dep| !tasks.get(*dep).is_some_and(|task| !task.archived))
        .cloned()
        .collect()
}

/// Would giving `task_id` the dependency set `new_deps` close a cycle?
pub fn would_create_cycle(
    tasks: &IndexMap<String, Task>,
    task_id: &str,
    new_deps: &BTreeSet<String>,
) -> bool {
    find_cycle(tasks, task_id, new_deps).is_some()
}

/// Like [`would_create_cycle`], but returns the offending chain
/// `task_id -> dep -> ... -> task_id` for error reporting.
pub fn find_cycle(
    tasks: &IndexMap<String, Task>,
    task_id: &str,
    new_deps: &BTreeSet<String>,
) -> Option<Vec<String>> {
    for dep in new_deps {
        if dep == task_id {
            return Some(vec![task_id.to_string(), task_id.to_string()]);
        }
        let mut path = vec![task_id.to_string()];
        let mut visited = BTreeSet::new();
        if walk_to_target(tasks, dep, task_id, &mut visited, &mut path) {
            path.push(task_id.to_string());
            return Some(path);
        }
    }
    None
}

// Depth-first walk along existing dependency edges, short-circuiting the
// moment `target` is reached.
fn walk_to_target(
    tasks: &IndexMap<String, Task>,
    current: &str,
    target: &str,
    visited: &mut BTreeSet<String>,
    path: &mut Vec<String>,
) -> bool {
    if !visited.insert(current.to_string()) {
        return false;
    }
    let Some(task) = tasks.get(current) else {
        return false;
    };
    if task.archived {
        return false;
    }

    path.push(current.to_string());
    for dep in &task.dependencies {
        if dep == target {
            return true;
        }
        if walk_to_target(tasks, dep, target, visited, path) {
            return true;
        }
    }

    path.pop();
    false
}

/// Non-archived tasks that directly depend on `task_id`
pub fn affected_by(tasks: &IndexMap<String, Task>, task_id: &str) -> BTreeSet<String> {
    tasks
        .values()
        .filter(|task| !task.archived && task.dependencies.contains(task_id))
        .map(|task| task.id.clone())
        .collect()
}

/// Every non-archived task that transitively depends on `task_id`
/// (the cascade set for a forced delete).
pub fn transitive_dependents(tasks: &IndexMap<String, Task>, task_id: &str) -> BTreeSet<String> {
    let mut result = BTreeSet::new();
    let mut frontier = vec![task_id.to_string()];

    while let Some(current) = frontier.pop() {
        for dependent in affected_by(tasks, &current) {
            if result.insert(dependent.clone()) {
                frontier.push(dependent);
            }
        }
    }

    result
}
