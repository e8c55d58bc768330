use crate::error::PoolError;
use crate::task::{next_task_id, TaskError};

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info_span, trace, warn, Instrument};

type SideEffectFn<E> = dyn Fn(E) -> BoxFuture<'static, Result<(), TaskError>> + Send + Sync;

/// A bounded worker pool for side effects only.
///
/// The same admission gate and join mechanics as [`WorkerPool`], without the
/// hand-off conduit or consumer task: both success and failure outcomes are
/// discarded. The smaller footprint fits callers that only need effects
/// performed under bounded parallelism.
///
/// [`WorkerPool`]: crate::WorkerPool
pub struct SimpleWorkerPool<E: Send + 'static> {
  pool_name: Arc<String>,
  gate: Arc<Semaphore>,
  workers: TaskTracker,
  process: Arc<SideEffectFn<E>>,
  tokio_handle: TokioHandle,
}

impl<E: Send + 'static> SimpleWorkerPool<E> {
  /// Creates a pool with at most `worker_limit` concurrent workers.
  ///
  /// A `worker_limit` of zero is clamped to one.
  pub fn new<P, Fut>(
    worker_limit: usize,
    tokio_handle: TokioHandle,
    pool_name: &str,
    process: P,
  ) -> Self
  where
    P: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
  {
    Self {
      pool_name: Arc::new(pool_name.to_string()),
      gate: Arc::new(Semaphore::new(worker_limit.max(1))),
      workers: TaskTracker::new(),
      process: Arc::new(move |element: E| process(element).boxed()),
      tokio_handle,
    }
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  /// Number of admitted elements whose workers have not yet finished.
  pub fn in_flight(&self) -> usize {
    self.workers.len()
  }

  /// Admits `element` and spawns a worker for it, suspending while
  /// `worker_limit` workers are already in flight.
  ///
  /// Calling `add` after [`wait`](SimpleWorkerPool::wait) has begun is
  /// rejected with [`PoolError::PoolDraining`].
  pub async fn add(&self, element: E) -> Result<(), PoolError> {
    if self.workers.is_closed() {
      warn!(pool = %*self.pool_name, "add called on a draining pool, element rejected");
      return Err(PoolError::PoolDraining);
    }

    let permit = match self.gate.clone().acquire_owned().await {
      Ok(permit) => permit,
      Err(_) => {
        error!(pool = %*self.pool_name, "admission gate closed, element rejected");
        return Err(PoolError::GateClosed);
      }
    };

    let task_id = next_task_id();
    trace!(pool = %*self.pool_name, %task_id, "element admitted, spawning worker");

    let process = self.process.clone();
    let worker = async move {
      // The permit drops on every exit path, including unwinding.
      let _permit = permit;
      match AssertUnwindSafe(process(element)).catch_unwind().await {
        Ok(Ok(())) => trace!(%task_id, "worker completed"),
        Ok(Err(err)) => {
          debug!(%task_id, error = %err, "worker reported an error, outcome discarded");
        }
        Err(_) => {
          error!(%task_id, "worker panicked during processing");
        }
      }
    };
    self.workers.spawn_on(
      worker.instrument(info_span!("pool_worker", pool = %*self.pool_name, %task_id)),
      &self.tokio_handle,
    );
    Ok(())
  }

  /// Suspends until every admitted element has been processed.
  pub async fn wait(&self) {
    self.workers.close();
    self.workers.wait().await;
  }
}
