use crate::error::PoolError;
use crate::task::{next_task_id, TaskError};

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info_span, trace, warn, Instrument};

type ProcessFn<E, R> = dyn Fn(E) -> BoxFuture<'static, Result<R, TaskError>> + Send + Sync;

/// A bounded worker pool that forwards successful results to a single serial
/// consumer.
///
/// Each element added to the pool is processed by exactly one worker, with at
/// most `worker_limit` workers in flight. [`add`](WorkerPool::add) is the
/// backpressure point: it suspends the caller while the admission gate is
/// saturated, so producers can never race ahead of the pool unboundedly.
///
/// Successful results are handed off to the consumer closure supplied at
/// construction. The consumer runs on one dedicated task, so it is never
/// invoked concurrently with itself; captured accumulator state needs no
/// additional locking. Results arrive in some permutation of worker
/// completion order — there is no admission-order guarantee.
///
/// Worker errors are dropped, not surfaced. Elements whose processing fails
/// never reach the consumer.
pub struct WorkerPool<E: Send + 'static, R: Send + 'static> {
  pool_name: Arc<String>,
  gate: Arc<Semaphore>,
  workers: TaskTracker,
  process: Arc<ProcessFn<E, R>>,
  result_tx: Mutex<Option<UnboundedSender<R>>>,
  consumer_handle: Mutex<Option<JoinHandle<()>>>,
  tokio_handle: TokioHandle,
}

impl<E: Send + 'static, R: Send + 'static> WorkerPool<E, R> {
  /// Creates a pool with at most `worker_limit` concurrent workers and
  /// spawns its consumer task on `tokio_handle`.
  ///
  /// A `worker_limit` of zero is clamped to one.
  pub fn new<P, Fut, C>(
    worker_limit: usize,
    tokio_handle: TokioHandle,
    pool_name: &str,
    process: P,
    consume: C,
  ) -> Self
  where
    P: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, TaskError>> + Send + 'static,
    C: FnMut(R) + Send + 'static,
  {
    let pool_name = Arc::new(pool_name.to_string());
    let (result_tx, mut result_rx) = mpsc::unbounded_channel::<R>();

    let consumer_span = info_span!("pool_consumer", pool = %*pool_name);
    let consumer_handle = tokio_handle.spawn(
      async move {
        let mut consume = consume;
        while let Some(result) = result_rx.recv().await {
          consume(result);
        }
        debug!("hand-off conduit closed and drained, consumer exiting");
      }
      .instrument(consumer_span),
    );

    Self {
      pool_name,
      gate: Arc::new(Semaphore::new(worker_limit.max(1))),
      workers: TaskTracker::new(),
      process: Arc::new(move |element: E| process(element).boxed()),
      result_tx: Mutex::new(Some(result_tx)),
      consumer_handle: Mutex::new(Some(consumer_handle)),
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
  /// `add` may be called concurrently from any number of callers on a shared
  /// pool. Calling it after [`wait`](WorkerPool::wait) has begun is rejected
  /// with [`PoolError::PoolDraining`].
  pub async fn add(&self, element: E) -> Result<(), PoolError> {
    if self.workers.is_closed() {
      warn!(pool = %*self.pool_name, "add called on a draining pool, element rejected");
      return Err(PoolError::PoolDraining);
    }
    let result_tx = match &*self.result_tx.lock().unwrap() {
      Some(tx) => tx.clone(),
      None => {
        warn!(pool = %*self.pool_name, "add called on a draining pool, element rejected");
        return Err(PoolError::PoolDraining);
      }
    };

    // The backpressure point: suspend until a slot frees up.
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
      // The permit drops on every exit path, including unwinding, so one
      // misbehaving worker can never seal the gate permanently.
      let _permit = permit;
      match AssertUnwindSafe(process(element)).catch_unwind().await {
        Ok(Ok(result)) => {
          if result_tx.send(result).is_err() {
            warn!(%task_id, "hand-off conduit closed, result lost");
          }
        }
        Ok(Err(err)) => {
          debug!(%task_id, error = %err, "worker reported an error, result dropped");
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

  /// Suspends until every admitted element has been processed and the
  /// consumer has drained every forwarded result.
  pub async fn wait(&self) {
    self.workers.close();
    self.workers.wait().await;

    // All workers have deregistered, so nothing can send on the conduit any
    // more. Dropping the pool's sender is the close signal the consumer
    // drains against; it must not be issued before the wait above completes.
    drop(self.result_tx.lock().unwrap().take());

    let consumer = self.consumer_handle.lock().unwrap().take();
    if let Some(handle) = consumer {
      if let Err(join_error) = handle.await {
        error!(pool = %*self.pool_name, "error joining consumer task: {:?}", join_error);
      }
    } else {
      trace!(pool = %*self.pool_name, "consumer already joined by an earlier wait");
    }
  }
}

impl<E: Send + 'static, R: Send + 'static> Drop for WorkerPool<E, R> {
  fn drop(&mut self) {
    // Never block in drop. Outstanding workers and the consumer keep running
    // on the runtime; the conduit closes once the sender half drops with us.
    if self.consumer_handle.get_mut().unwrap().is_some() {
      debug!(
        pool = %*self.pool_name,
        "pool dropped without wait(), outstanding workers and consumer are detached"
      );
    }
  }
}
