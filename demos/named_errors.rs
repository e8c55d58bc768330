use futures_cohort::{ErrorGroup, TaskError};
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Named Error Collection Example ---");

  let group = ErrorGroup::new();
  group.launch("fetch", async {
    tokio::time::sleep(Duration::from_millis(150)).await;
    Err::<(), TaskError>("upstream returned 503".into())
  });
  group.launch("parse", async {
    tokio::time::sleep(Duration::from_millis(80)).await;
    Ok(())
  });
  group.launch("store", async {
    tokio::time::sleep(Duration::from_millis(220)).await;
    Err::<(), TaskError>("disk full".into())
  });

  match group.join().await {
    Some(errors) => {
      for (name, error) in &errors {
        info!("task '{}' failed: {}", name, error);
      }
    }
    None => info!("every task succeeded"),
  }

  info!("--- Named Error Collection Example End ---");
}
