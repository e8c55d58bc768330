use futures_cohort::{PoolError, SimpleWorkerPool, TaskError, WorkerPool};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::sleep;

// Helper to initialize tracing for tests. Once ensures it runs once per
// test binary.
fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,futures_cohort=trace"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

#[tokio::test]
async fn test_pool_sums_doubled_elements() {
  setup_tracing_for_test();

  for worker_limit in [1usize, 3, 12] {
    let sum = Arc::new(AtomicUsize::new(0));
    let consumer_sum = sum.clone();
    let pool = WorkerPool::new(
      worker_limit,
      Handle::current(),
      "sum_pool",
      |e: usize| async move { Ok::<_, TaskError>(e * 2) },
      move |r| {
        consumer_sum.fetch_add(r, Ordering::SeqCst);
      },
    );

    for e in [1usize, 2, 3, 4, 5, 6] {
      pool.add(e).await.unwrap();
    }
    pool.wait().await;

    assert_eq!(sum.load(Ordering::SeqCst), 42, "wrong sum for worker limit {}", worker_limit);
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_limit_never_exceeded() {
  setup_tracing_for_test();
  const WORKER_LIMIT: usize = 4;
  const ELEMENTS: usize = 100;

  let in_flight = Arc::new(AtomicUsize::new(0));
  let high_water = Arc::new(AtomicUsize::new(0));

  let pool = {
    let in_flight = in_flight.clone();
    let high_water = high_water.clone();
    Arc::new(WorkerPool::new(
      WORKER_LIMIT,
      Handle::current(),
      "bounded_pool",
      move |e: usize| {
        let in_flight = in_flight.clone();
        let high_water = high_water.clone();
        async move {
          let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
          high_water.fetch_max(now, Ordering::SeqCst);
          let jitter_ms = rand::rng().random_range(1..5u64);
          sleep(Duration::from_millis(jitter_ms)).await;
          in_flight.fetch_sub(1, Ordering::SeqCst);
          Ok::<_, TaskError>(e)
        }
      },
      |_| {},
    ))
  };

  // A burst of simultaneous adders must still respect the bound.
  let mut adders = Vec::new();
  for chunk in 0..4usize {
    let pool = pool.clone();
    adders.push(tokio::spawn(async move {
      for e in 0..(ELEMENTS / 4) {
        pool.add(chunk * 1000 + e).await.unwrap();
      }
    }));
  }
  for adder in adders {
    adder.await.unwrap();
  }
  pool.wait().await;

  assert!(
    high_water.load(Ordering::SeqCst) <= WORKER_LIMIT,
    "high-water mark {} exceeded the worker limit",
    high_water.load(Ordering::SeqCst)
  );
  assert_eq!(pool.in_flight(), 0);
}

#[tokio::test]
async fn test_failed_elements_never_reach_consumer() {
  setup_tracing_for_test();
  let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
  let consumer_seen = seen.clone();

  let pool = WorkerPool::new(
    3,
    Handle::current(),
    "odd_only_pool",
    |e: u64| async move {
      if e % 2 == 0 {
        Err::<u64, TaskError>(format!("even element {e} rejected").into())
      } else {
        Ok(e * 10)
      }
    },
    move |r| consumer_seen.lock().push(r),
  );

  for e in 1..=10u64 {
    pool.add(e).await.unwrap();
  }
  pool.wait().await;

  let mut observed = seen.lock().clone();
  observed.sort_unstable();
  assert_eq!(observed, vec![10, 30, 50, 70, 90]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_wait_returns_only_after_consumer_drains() {
  setup_tracing_for_test();
  const ELEMENTS: usize = 1000;

  let consumed = Arc::new(AtomicUsize::new(0));
  let consumer_consumed = consumed.clone();

  let pool = WorkerPool::new(
    8,
    Handle::current(),
    "drain_pool",
    |e: usize| async move {
      let jitter_ms = rand::rng().random_range(0..2u64);
      sleep(Duration::from_millis(jitter_ms)).await;
      Ok::<_, TaskError>(e)
    },
    move |_| {
      consumer_consumed.fetch_add(1, Ordering::SeqCst);
    },
  );

  for e in 0..ELEMENTS {
    pool.add(e).await.unwrap();
  }
  pool.wait().await;

  // Checked immediately after wait(): the consumer must already have drained
  // every forwarded result.
  assert_eq!(consumed.load(Ordering::SeqCst), ELEMENTS);
}

#[tokio::test]
async fn test_add_blocks_while_gate_is_saturated() {
  setup_tracing_for_test();
  let release = Arc::new(Notify::new());
  let blocker_release = release.clone();

  let pool = WorkerPool::new(
    1,
    Handle::current(),
    "saturated_pool",
    move |e: u32| {
      let release = blocker_release.clone();
      async move {
        if e == 0 {
          // Hold the only slot until the test says otherwise.
          release.notified().await;
        }
        Ok::<_, TaskError>(e)
      }
    },
    |_| {},
  );

  pool.add(0).await.unwrap();

  // One slot, and it is held: the next add must suspend.
  let second_add = pool.add(1);
  tokio::pin!(second_add);

  tokio::select! {
    _ = &mut second_add => {
      panic!("add should have blocked while the gate was saturated");
    },
    _ = sleep(Duration::from_millis(50)) => {
      // This is the expected outcome.
    }
  }

  release.notify_one();
  tokio::time::timeout(Duration::from_millis(500), second_add)
    .await
    .expect("add did not resume after a slot freed")
    .unwrap();

  pool.wait().await;
}

#[tokio::test]
async fn test_add_after_wait_is_rejected() {
  setup_tracing_for_test();
  let pool = WorkerPool::new(
    2,
    Handle::current(),
    "sealed_pool",
    |e: u32| async move { Ok::<_, TaskError>(e) },
    |_| {},
  );

  pool.add(1).await.unwrap();
  pool.wait().await;

  assert_eq!(pool.add(2).await, Err(PoolError::PoolDraining));
}

#[tokio::test]
async fn test_worker_panic_loses_result_but_pool_survives() {
  setup_tracing_for_test();
  let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
  let consumer_seen = seen.clone();

  let pool = WorkerPool::new(
    1,
    Handle::current(),
    "survivor_pool",
    |e: u32| async move {
      if e == 7 {
        panic!("worker blew up on purpose");
      }
      Ok::<_, TaskError>(e)
    },
    move |r| consumer_seen.lock().push(r),
  );

  for e in [7u32, 8, 9] {
    pool.add(e).await.unwrap();
  }
  pool.wait().await;

  let mut observed = seen.lock().clone();
  observed.sort_unstable();
  assert_eq!(observed, vec![8, 9]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simple_pool_side_effects_under_limit() {
  setup_tracing_for_test();
  const WORKER_LIMIT: usize = 3;

  let in_flight = Arc::new(AtomicUsize::new(0));
  let high_water = Arc::new(AtomicUsize::new(0));
  let performed = Arc::new(AtomicUsize::new(0));

  let pool = {
    let in_flight = in_flight.clone();
    let high_water = high_water.clone();
    let performed = performed.clone();
    SimpleWorkerPool::new(
      WORKER_LIMIT,
      Handle::current(),
      "side_effect_pool",
      move |_e: usize| {
        let in_flight = in_flight.clone();
        let high_water = high_water.clone();
        let performed = performed.clone();
        async move {
          let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
          high_water.fetch_max(now, Ordering::SeqCst);
          let jitter_ms = rand::rng().random_range(1..4u64);
          sleep(Duration::from_millis(jitter_ms)).await;
          performed.fetch_add(1, Ordering::SeqCst);
          in_flight.fetch_sub(1, Ordering::SeqCst);
          Ok(())
        }
      },
    )
  };

  for e in 0..60 {
    pool.add(e).await.unwrap();
  }
  pool.wait().await;

  assert_eq!(performed.load(Ordering::SeqCst), 60);
  assert!(high_water.load(Ordering::SeqCst) <= WORKER_LIMIT);
  assert_eq!(pool.in_flight(), 0);
}

#[tokio::test]
async fn test_simple_pool_failures_are_discarded() {
  setup_tracing_for_test();
  let performed = Arc::new(AtomicUsize::new(0));

  let pool = {
    let performed = performed.clone();
    SimpleWorkerPool::new(
      2,
      Handle::current(),
      "lossy_pool",
      move |e: u32| {
        let performed = performed.clone();
        async move {
          if e % 2 == 0 {
            return Err::<(), TaskError>(format!("element {e} failed").into());
          }
          performed.fetch_add(1, Ordering::SeqCst);
          Ok(())
        }
      },
    )
  };

  for e in 0..10u32 {
    pool.add(e).await.unwrap();
  }
  pool.wait().await;

  assert_eq!(performed.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_panicking_worker_releases_its_slot() {
  setup_tracing_for_test();
  let performed = Arc::new(AtomicUsize::new(0));

  let pool = {
    let performed = performed.clone();
    SimpleWorkerPool::new(
      1,
      Handle::current(),
      "panic_pool",
      move |e: u32| {
        let performed = performed.clone();
        async move {
          if e == 0 {
            panic!("worker blew up on purpose");
          }
          performed.fetch_add(1, Ordering::SeqCst);
          Ok(())
        }
      },
    )
  };

  pool.add(0).await.unwrap();
  // With a single slot, this only completes if the panicking worker
  // released it.
  tokio::time::timeout(Duration::from_millis(500), pool.add(1))
    .await
    .expect("slot was not released after a worker panic")
    .unwrap();
  pool.wait().await;

  assert_eq!(performed.load(Ordering::SeqCst), 1);
}
