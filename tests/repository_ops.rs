mod support;

use support::{create_titled, create_with_deps, deps, TestStore};
use tjm::error::Error;
use tjm::repository::{DeleteOptions, DeleteStrategy};
use tjm::task::{NewTask, Pagination, TaskFilter, TaskPatch, TaskPriority, TaskStatus};

#[test]
fn created_task_survives_reopen() {
    let fixture = TestStore::new();
    let created = {
        let mut repo = fixture.open();
        let mut fields = NewTask::titled("Ship release notes");
        fields.priority = TaskPriority::High;
        fields.tags = deps(&["docs"]);
        repo.create_task(fields).unwrap()
    };

    let repo = fixture.open();
    let loaded = repo.get_task(&created.id).unwrap();
    assert_eq!(loaded, created);
    assert_eq!(repo.data().version, 1);
}

#[test]
fn generated_ids_use_prefix_and_stay_unique() {
    let fixture = TestStore::new();
    let mut repo = fixture.open();

    let mut ids = std::collections::BTreeSet::new();
    for i in 0..50 {
        let task = create_titled(&mut repo, &format!("task number {i}"));
        assert!(task.id.starts_with("task-"), "unexpected id {}", task.id);
        assert!(ids.insert(task.id));
    }
}

#[test]
fn update_changes_fields_and_bumps_updated_at() {
    let fixture = TestStore::new();
    let mut repo = fixture.open();
    let created = create_titled(&mut repo, "Initial title");

    let patch = TaskPatch {
        title: Some("Renamed".to_string()),
        status: Some(TaskStatus::InProgress),
        ..TaskPatch::default()
    };
    let updated = repo.update_task(&created.id, patch).unwrap();

    assert_eq!(updated.title, "Renamed");
    assert_eq!(updated.status, TaskStatus::InProgress);
    assert!(updated.updated_at >= created.updated_at);
    assert_eq!(updated.created_at, created.created_at);
}

#[test]
fn empty_patch_is_rejected() {
    let fixture = TestStore::new();
    let mut repo = fixture.open();
    let created = create_titled(&mut repo, "Something");

    let err = repo.update_task(&created.id, TaskPatch::default()).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn cycle_is_rejected_with_zero_observable_effect() {
    let fixture = TestStore::new();
    let mut repo = fixture.open();
    let a = create_titled(&mut repo, "a");
    let b = create_with_deps(&mut repo, "b", &[&a.id]);
    let version_before = repo.data().version;

    // a depending on b would close the loop a <- b <- a
    let patch = TaskPatch {
        dependencies: Some(deps(&[&b.id])),
        ..TaskPatch::default()
    };
    let err = repo.update_task(&a.id, patch).unwrap_err();

    match err {
        Error::CircularDependency { chain } => {
            assert_eq!(chain.first(), Some(&a.id));
            assert_eq!(chain.last(), Some(&a.id));
            assert!(chain.contains(&b.id));
        }
        other => panic!("expected CircularDependency, got {other:?}"),
    }
    assert!(repo.get_task(&a.id).unwrap().dependencies.is_empty());
    assert_eq!(repo.data().version, version_before);
    assert_eq!(repo.undo_history(None).len(), 2); // only the two creates
}

#[test]
fn unknown_dependency_is_rejected() {
    let fixture = TestStore::new();
    let mut repo = fixture.open();

    let mut fields = NewTask::titled("depends on nothing real");
    fields.dependencies = deps(&["task-nope"]);
    assert!(matches!(
        repo.create_task(fields),
        Err(Error::Validation(_))
    ));
}

#[test]
fn delete_without_force_reports_every_dependent() {
    let fixture = TestStore::new();
    let mut repo = fixture.open();
    let base = create_titled(&mut repo, "base");
    let dep1 = create_with_deps(&mut repo, "dep1", &[&base.id]);
    let dep2 = create_with_deps(&mut repo, "dep2", &[&base.id]);

    let err = repo
        .delete_task(&base.id, DeleteOptions::default())
        .unwrap_err();
    match err {
        Error::DeleteBlocked { id, dependents } => {
            assert_eq!(id, base.id);
            assert!(dependents.contains(&dep1.id));
            assert!(dependents.contains(&dep2.id));
            assert_eq!(dependents.len(), 2);
        }
        other => panic!("expected DeleteBlocked, got {other:?}"),
    }
    assert!(repo.get_task(&base.id).is_ok());
}

#[test]
fn force_cascade_removes_transitive_dependents() {
    let fixture = TestStore::new();
    let mut repo = fixture.open();
    let base = create_titled(&mut repo, "base");
    let mid = create_with_deps(&mut repo, "mid", &[&base.id]);
    let leaf = create_with_deps(&mut repo, "leaf", &[&mid.id]);
    let unrelated = create_titled(&mut repo, "unrelated");

    let removed = repo
        .delete_task(
            &base.id,
            DeleteOptions {
                force: true,
                strategy: DeleteStrategy::Cascade,
            },
        )
        .unwrap();

    let removed_ids: Vec<&str> = removed.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(removed.len(), 3);
    for id in [&base.id, &mid.id, &leaf.id] {
        assert!(removed_ids.contains(&id.as_str()));
        assert!(matches!(repo.get_task(id), Err(Error::NotFound { .. })));
    }
    assert!(repo.get_task(&unrelated.id).is_ok());
}

#[test]
fn force_reassign_drops_the_edge_by_default() {
    let fixture = TestStore::new();
    let mut repo = fixture.open();
    let root = create_titled(&mut repo, "root");
    let middle = create_with_deps(&mut repo, "middle", &[&root.id]);
    let dependent = create_with_deps(&mut repo, "dependent", &[&middle.id]);

    repo.delete_task(
        &middle.id,
        DeleteOptions {
            force: true,
            strategy: DeleteStrategy::Reassign,
        },
    )
    .unwrap();

    let rewired = repo.get_task(&dependent.id).unwrap();
    assert!(rewired.dependencies.is_empty());
    assert!(repo.get_task(&root.id).is_ok());
}

#[test]
fn reassign_to_parents_inherits_the_deleted_tasks_dependencies() {
    let fixture = TestStore::new();
    let mut repo = fixture.open();
    let root = create_titled(&mut repo, "root");
    let middle = create_with_deps(&mut repo, "middle", &[&root.id]);
    let dependent = create_with_deps(&mut repo, "dependent", &[&middle.id]);

    repo.delete_task(
        &middle.id,
        DeleteOptions {
            force: true,
            strategy: DeleteStrategy::ReassignToParents,
        },
    )
    .unwrap();

    let rewired = repo.get_task(&dependent.id).unwrap();
    assert_eq!(rewired.dependencies, deps(&[&root.id]));
}

#[test]
fn archive_hides_from_default_listing_but_keeps_the_record() {
    let fixture = TestStore::new();
    let mut repo = fixture.open();
    let keep = create_titled(&mut repo, "keep");
    let hide = create_titled(&mut repo, "hide");

    repo.archive_task(&hide.id).unwrap();

    let listed = repo.list_tasks(&TaskFilter::default(), &Pagination::default());
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, keep.id);

    let all = repo.list_tasks(
        &TaskFilter {
            include_archived: true,
            ..TaskFilter::default()
        },
        &Pagination::default(),
    );
    assert_eq!(all.len(), 2);

    // Exact lookup still reaches the archived record.
    assert!(repo.get_task(&hide.id).unwrap().archived);
}

#[test]
fn delete_scrubs_edges_held_by_archived_tasks() {
    let fixture = TestStore::new();
    let mut repo = fixture.open();
    let base = create_titled(&mut repo, "base");
    let holder = create_with_deps(&mut repo, "holder", &[&base.id]);
    repo.archive_task(&holder.id).unwrap();

    // The archived dependent does not block the delete, and its record must
    // not keep pointing at an id that no longer exists.
    repo.delete_task(&base.id, DeleteOptions::default()).unwrap();
    assert!(repo.get_task(&holder.id).unwrap().dependencies.is_empty());

    // Undo restores the deleted task and the archived record's edge.
    repo.undo_last().unwrap();
    assert!(repo.get_task(&base.id).is_ok());
    assert_eq!(
        repo.get_task(&holder.id).unwrap().dependencies,
        deps(&[&base.id])
    );
}

#[test]
fn archive_is_blocked_while_dependents_exist() {
    let fixture = TestStore::new();
    let mut repo = fixture.open();
    let base = create_titled(&mut repo, "base");
    create_with_deps(&mut repo, "dep", &[&base.id]);

    assert!(matches!(
        repo.archive_task(&base.id),
        Err(Error::DeleteBlocked { .. })
    ));
}

#[test]
fn listing_filters_and_paginates() {
    let fixture = TestStore::new();
    let mut repo = fixture.open();
    for i in 0..5 {
        let mut fields = NewTask::titled(format!("task {i}"));
        fields.priority = if i % 2 == 0 {
            TaskPriority::High
        } else {
            TaskPriority::Low
        };
        repo.create_task(fields).unwrap();
    }

    let high = repo.list_tasks(
        &TaskFilter {
            priority: Some(TaskPriority::High),
            ..TaskFilter::default()
        },
        &Pagination::default(),
    );
    assert_eq!(high.len(), 3);

    let page = repo.list_tasks(
        &TaskFilter::default(),
        &Pagination {
            offset: 2,
            limit: Some(2),
        },
    );
    assert_eq!(page.len(), 2);

    // Stable order: created_at never decreases across the listing.
    let all = repo.list_tasks(&TaskFilter::default(), &Pagination::default());
    assert!(all.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

#[test]
fn resolve_rejects_garbage_and_suggests_on_miss() {
    let fixture = TestStore::new();
    let mut repo = fixture.open();
    let task = create_titled(&mut repo, "only one");

    assert_eq!(repo.resolve_id(&task.id).unwrap(), task.id);
    match repo.resolve_id("task-zzzzzzz") {
        Err(Error::NotFound { suggestions, .. }) => {
            assert_eq!(suggestions, vec![task.id.clone()]);
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}
