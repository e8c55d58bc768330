use thiserror::Error;

/// Errors that can occur on a pool's admission path.
#[derive(Error, Debug, PartialEq)]
pub enum PoolError {
  #[error("pool is draining or drained, cannot accept new elements")]
  PoolDraining,

  #[error("pool's admission gate was closed unexpectedly")]
  GateClosed,
}
