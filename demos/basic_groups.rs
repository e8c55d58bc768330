use futures_cohort::TaskGroup;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false) // Disable module paths for cleaner example output
    .init();

  info!("--- Task Group Example ---");

  let group = TaskGroup::new();
  for i in 0..4u64 {
    group.launch(async move {
      info!("task {} starting", i);
      tokio::time::sleep(Duration::from_millis(200 + i * 100)).await;
      info!("task {} finished", i);
    });
  }

  info!("All tasks launched ({} running). Joining...", group.running_count());
  group.join().await;
  info!("--- Task Group Example End ---");
}
