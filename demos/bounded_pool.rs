use futures_cohort::{TaskError, WorkerPool};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Bounded Worker Pool Example (limit: 2) ---");

  let pool = WorkerPool::new(
    2,
    Handle::current(),
    "demo_pool",
    |e: u64| async move {
      info!("processing element {}", e);
      tokio::time::sleep(Duration::from_millis(300)).await;
      Ok::<_, TaskError>(e * 2)
    },
    |r| info!("consumed result {}", r),
  );

  for e in 1..=6u64 {
    // Suspends here whenever both workers are busy.
    pool.add(e).await.expect("pool accepts elements until wait()");
    info!("element {} admitted ({} in flight)", e, pool.in_flight());
  }

  info!("All elements admitted. Waiting for drain...");
  pool.wait().await;
  info!("--- Bounded Worker Pool Example End ---");
}
