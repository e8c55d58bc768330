use crate::task::{next_task_id, TaskFuture};

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio_util::task::TaskTracker;
use tracing::{error, info_span, trace, Instrument};

/// A group of concurrently executing tasks with a single join point.
///
/// Every launched task starts immediately; there is no admission limit and no
/// result or error surface. [`join`](TaskGroup::join) suspends the caller
/// until everything launched so far has finished. Failures are the task's own
/// business: a panicking task is caught and logged, and the join point is
/// unaffected. There is no cancellation; a launched task always runs to
/// completion.
///
/// `launch` returns `&Self`, so launches chain builder-style:
/// `group.launch(a).launch(b).join().await`.
///
/// Launches racing an in-flight `join` on another caller may or may not be
/// observed by that `join`. Launch-then-join from a single caller is always
/// observed.
#[derive(Clone)]
pub struct TaskGroup {
  tasks: TaskTracker,
}

impl TaskGroup {
  /// Creates an idle group.
  pub fn new() -> Self {
    Self {
      tasks: TaskTracker::new(),
    }
  }

  /// Spawns `task` onto the current Tokio runtime and registers it with the
  /// group's join point. Returns immediately.
  ///
  /// # Panics
  ///
  /// Panics if called from outside a Tokio runtime context.
  pub fn launch<F>(&self, task: F) -> &Self
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let task_id = next_task_id();
    self.tasks.spawn(
      async move {
        if AssertUnwindSafe(task).catch_unwind().await.is_err() {
          error!("group task panicked during execution");
        } else {
          trace!("group task completed");
        }
      }
      .instrument(info_span!("group_task", %task_id)),
    );
    self
  }

  /// Number of launched tasks that have not yet finished.
  pub fn running_count(&self) -> usize {
    self.tasks.len()
  }

  /// Suspends until every previously launched task has finished.
  pub async fn join(&self) {
    self.tasks.close();
    self.tasks.wait().await;
  }
}

impl Default for TaskGroup {
  fn default() -> Self {
    Self::new()
  }
}

/// Builds a [`TaskGroup`] and launches every future in `tasks` on it.
///
/// Purely a construction convenience; the caller still calls
/// [`join`](TaskGroup::join) on the returned group.
pub fn launch_all<I>(tasks: I) -> TaskGroup
where
  I: IntoIterator<Item = TaskFuture>,
{
  let group = TaskGroup::new();
  for task in tasks {
    group.launch(task);
  }
  group
}
