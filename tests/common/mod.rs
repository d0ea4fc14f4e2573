// tests/common/mod.rs

#![allow(dead_code)]

pub use autodeploy_test_utils::builders;
pub use autodeploy_test_utils::fixtures;
pub use autodeploy_test_utils::{init_tracing, with_timeout};

use std::time::Duration;

/// Poll `cond` every 20 ms until it holds or `limit` passes.
pub async fn eventually(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
