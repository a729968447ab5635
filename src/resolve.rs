//! Tolerant task-id resolution.
//!
//! Users routinely supply truncated or slightly wrong ids. Every operation
//! that takes an id funnels through [`resolve`], so errors and suggestions
//! stay consistent: exact match first, then unique prefix, then an
//! ambiguity error listing candidates, then a not-found error carrying the
//! closest known ids by edit distance.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::task::Task;

/// Maximum accepted id length
pub const MAX_ID_LEN: usize = 64;

/// Check the shape of a user-supplied id: lowercase alphanumerics plus
/// `-` / `_`, between 1 and [`MAX_ID_LEN`] characters.
pub fn validate_id_format(input: &str) -> bool {
    let trimmed = input.trim();
    !trimmed.is_empty()
        && trimmed.len() <= MAX_ID_LEN
        && trimmed
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
}

/// Resolve a possibly-partial id to a canonical one.
///
/// Exact matches may hit archived tasks (they keep their ids for audit and
/// undo); prefix matching and suggestions only consider active tasks.
pub fn resolve(tasks: &IndexMap<String, Task>, input: &str, suggestion_count: usize) -> Result<String> {
    let trimmed = input.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err(Error::Validation("task id must not be empty".to_string()));
    }

    if let Some(task) = tasks.get(trimmed.as_str()) {
        return Ok(task.id.clone());
    }

    let mut matches: Vec<String> = tasks
        .values()
        .filter(|task| !task.archived && task.id.starts_with(&trimmed))
        .map(|task| task.id.clone())
        .collect();

    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => Err(Error::NotFound {
            input: input.trim().to_string(),
            suggestions: suggest_similar(tasks, &trimmed, suggestion_count),
        }),
        _ => {
            matches.sort();
            Err(Error::Ambiguous {
                input: input.trim().to_string(),
                candidates: matches,
            })
        }
    }
}

/// The `k` active ids closest to `input` by edit distance over id and title,
/// best first, ties broken alphabetically.
pub fn suggest_similar(tasks: &IndexMap<String, Task>, input: &str, k: usize) -> Vec<String> {
    let needle = input.trim().to_lowercase();
    let mut scored: Vec<(usize, &String)> = tasks
        .values()
        .filter(|task| !task.archived)
        .map(|task| {
            let by_id = levenshtein(&needle, &task.id.to_lowercase());
            let by_title = levenshtein(&needle, &task.title.to_lowercase());
            (by_id.min(by_title), &task.id)
        })
        .collect();

    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    scored.into_iter().take(k).map(|(_, id)| id.clone()).collect()
}

/// Classic two-row Levenshtein distance over unicode scalars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskPriority, TaskStatus};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn task(id: &str, title: &str) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            title: title.to_string(),
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

    fn map(tasks: Vec<Task>) -> IndexMap<String, Task> {
        tasks.into_iter().map(|t| (t.id.clone(), t)).collect()
    }

    #[test]
    fn exact_match_wins() {
        let tasks = map(vec![task("task-001", "one"), task("task-0011", "eleven")]);
        assert_eq!(resolve(&tasks, "task-001", 3).unwrap(), "task-001");
    }

    #[test]
    fn unique_prefix_resolves() {
        let tasks = map(vec![task("task-001", "one"), task("task-042", "other")]);
        assert_eq!(resolve(&tasks, "task-04", 3).unwrap(), "task-042");
    }

    #[test]
    fn shared_prefix_is_ambiguous() {
        let tasks = map(vec![task("task-001", "one"), task("task-002", "two")]);
        match resolve(&tasks, "task-00", 3) {
            Err(Error::Ambiguous { candidates, .. }) => {
                assert_eq!(candidates, vec!["task-001", "task-002"]);
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn miss_carries_closest_suggestions() {
        let tasks = map(vec![
            task("task-alpha", "first"),
            task("task-beta", "second"),
            task("unrelated", "third"),
        ]);
        match resolve(&tasks, "task-alpah", 2) {
            Err(Error::NotFound { suggestions, .. }) => {
                assert_eq!(suggestions.len(), 2);
                assert_eq!(suggestions[0], "task-alpha");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn archived_tasks_resolve_exactly_but_not_by_prefix() {
        let mut archived = task("task-old", "old");
        archived.archived = true;
        let tasks = map(vec![archived, task("task-new", "new")]);

        assert_eq!(resolve(&tasks, "task-old", 3).unwrap(), "task-old");
        assert!(matches!(
            resolve(&tasks, "task-ol", 3),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn id_format_rules() {
        assert!(validate_id_format("task-001"));
        assert!(validate_id_format("a_b-c9"));
        assert!(!validate_id_format(""));
        assert!(!validate_id_format("Task-001"));
        assert!(!validate_id_format("has space"));
        assert!(!validate_id_format(&"x".repeat(MAX_ID_LEN + 1)));
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
