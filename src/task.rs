use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

lazy_static::lazy_static! {
  static ref NEXT_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// A caller-supplied name for a task, used as the key of an error group's
/// error map. Names are not required to be unique.
pub type TaskName = String;

/// The error currency of the crate: named tasks and pool workers report
/// failure with any boxed error type.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The type of future a task group executes.
/// It must be `Send` and `'static`, and produce no output.
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Hands out process-wide task ids, used only to correlate log lines.
pub(crate) fn next_task_id() -> u64 {
  NEXT_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed)
}
