//! A Tokio-based toolkit for fan-out/fan-in execution: joinable task groups,
//! named error collection, and bounded worker pools that feed a single serial
//! result consumer.

mod err_group;
mod error;
mod group;
mod pool;
mod simple_pool;
mod task;

pub use err_group::{launch_named, ErrorGroup};
pub use error::PoolError;
pub use group::{launch_all, TaskGroup};
pub use pool::WorkerPool;
pub use simple_pool::SimpleWorkerPool;
pub use task::{TaskError, TaskFuture, TaskName};
