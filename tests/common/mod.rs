// tests/common/mod.rs

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use tokio::task::LocalSet;
use tokio::time::timeout;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs a cooperative scenario on a current-thread `LocalSet` under the
/// standard timeout. The bus handle is not `Send`, so every blocking-path
/// test goes through here.
pub async fn run_local<F: Future>(scenario: F) -> F::Output {
  LocalSet::new()
    .run_until(timeout(TEST_TIMEOUT, scenario))
    .await
    .expect("scenario timed out")
}

/// Yields a handful of times so freshly spawned or woken tasks get to run.
pub async fn breathe() {
  for _ in 0..8 {
    tokio::task::yield_now().await;
  }
}
