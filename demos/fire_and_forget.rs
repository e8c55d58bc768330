use futures_cohort::{SimpleWorkerPool, TaskError};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Fire-and-Forget Pool Example (limit: 3) ---");

  let pool = SimpleWorkerPool::new(
    3,
    Handle::current(),
    "side_effect_pool",
    |e: u64| async move {
      if e % 5 == 0 {
        // Failures are discarded by the pool; log locally if it matters.
        return Err::<(), TaskError>(format!("element {e} is unlucky").into());
      }
      tokio::time::sleep(Duration::from_millis(100)).await;
      info!("side effect performed for element {}", e);
      Ok(())
    },
  );

  for e in 1..=12u64 {
    pool.add(e).await.expect("pool accepts elements until wait()");
  }

  info!("All elements admitted. Waiting for the workers...");
  pool.wait().await;
  info!("--- Fire-and-Forget Pool Example End ---");
}
