#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tjm::config::EngineConfig;
use tjm::events::{ChangeEvent, ChangeSink};
use tjm::repository::TaskRepository;
use tjm::store::DurableStore;
use tjm::task::{NewTask, Task};

/// Temp-dir backed fixture; the data file lives at `<tmp>/todo.json`.
pub struct TestStore {
    temp: TempDir,
}

/// Route engine logs to the test harness; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl TestStore {
    pub fn new() -> Self {
        init_tracing();
        Self {
            temp: TempDir::new().expect("tempdir"),
        }
    }

    pub fn data_path(&self) -> PathBuf {
        self.temp.path().join("todo.json")
    }

    pub fn dir(&self) -> &std::path::Path {
        self.temp.path()
    }

    pub fn open(&self) -> TaskRepository {
        self.open_with(EngineConfig::default())
    }

    pub fn open_with(&self, config: EngineConfig) -> TaskRepository {
        let store = DurableStore::new(self.data_path(), 1000);
        TaskRepository::open(store, config).expect("open repository")
    }
}

pub fn create_titled(repo: &mut TaskRepository, title: &str) -> Task {
    repo.create_task(NewTask::titled(title)).expect("create task")
}

pub fn create_with_deps(repo: &mut TaskRepository, title: &str, deps: &[&str]) -> Task {
    let mut fields = NewTask::titled(title);
    fields.dependencies = deps.iter().map(|d| d.to_string()).collect();
    repo.create_task(fields).expect("create task with deps")
}

pub fn deps(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|d| d.to_string()).collect()
}

/// Sink that records every event for assertions.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub events: Arc<Mutex<Vec<ChangeEvent>>>,
}

impl ChangeSink for RecordingSink {
    fn emit(&mut self, event: &ChangeEvent) -> tjm::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
