use crate::task::{next_task_id, TaskError, TaskName};

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info_span, trace, Instrument};

/// A joinable group of named tasks whose failures are collected into a map.
///
/// Each task signals failure through its return value; an `Err` outcome is
/// recorded under the task's name and surfaced by
/// [`join`](ErrorGroup::join). A failing task is never retried and never
/// aborts its siblings.
///
/// Names are not required to be unique: when two tasks share a name and both
/// fail, the task that completes last owns the map entry, and completion
/// order is a race. Callers that need one error per logical task must pick
/// distinct names.
#[derive(Clone)]
pub struct ErrorGroup {
  tasks: TaskTracker,
  errors: Arc<Mutex<HashMap<TaskName, TaskError>>>,
}

impl ErrorGroup {
  /// Creates an idle group with an empty error map.
  pub fn new() -> Self {
    Self {
      tasks: TaskTracker::new(),
      errors: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// Spawns `task` under `name` onto the current Tokio runtime and registers
  /// it with the group's join point. Returns immediately.
  ///
  /// A task that panics instead of returning an `Err` records nothing; the
  /// panic is caught and logged so the join point is never wedged. Tasks
  /// should signal failure only through their return value.
  ///
  /// # Panics
  ///
  /// Panics if called from outside a Tokio runtime context.
  pub fn launch<F>(&self, name: impl Into<TaskName>, task: F) -> &Self
  where
    F: Future<Output = Result<(), TaskError>> + Send + 'static,
  {
    let name = name.into();
    let task_id = next_task_id();
    let span = info_span!("named_task", %task_id, task = %name);
    let errors = self.errors.clone();

    self.tasks.spawn(
      async move {
        match AssertUnwindSafe(task).catch_unwind().await {
          Ok(Ok(())) => trace!("named task completed"),
          Ok(Err(err)) => {
            debug!(error = %err, "named task reported an error");
            // The guard is held only across this single insert.
            errors.lock().insert(name, err);
          }
          Err(_) => error!("named task panicked, no error recorded"),
        }
      }
      .instrument(span),
    );
    self
  }

  /// Suspends until every previously launched task has finished, then
  /// returns the collected errors: `None` when no task failed, otherwise the
  /// full name-to-error map.
  pub async fn join(&self) -> Option<HashMap<TaskName, TaskError>> {
    self.tasks.close();
    self.tasks.wait().await;

    let collected: HashMap<TaskName, TaskError> = self.errors.lock().drain().collect();
    if collected.is_empty() {
      None
    } else {
      Some(collected)
    }
  }
}

impl Default for ErrorGroup {
  fn default() -> Self {
    Self::new()
  }
}

/// Builds an [`ErrorGroup`] and launches a single named task on it.
///
/// Purely a construction convenience; the caller still calls
/// [`join`](ErrorGroup::join) on the returned group.
pub fn launch_named<F>(name: impl Into<TaskName>, task: F) -> ErrorGroup
where
  F: Future<Output = Result<(), TaskError>> + Send + 'static,
{
  let group = ErrorGroup::new();
  group.launch(name, task);
  group
}
