pub mod builders;
pub mod fake_evaluator;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Await `f`, failing the test if it takes longer than 10 seconds.
///
/// Guards async engine calls whose own timeout could be skipped by a hung
/// blocking task.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    match tokio::time::timeout(std::time::Duration::from_secs(10), f).await {
        Ok(out) => out,
        Err(_) => panic!("async test step did not finish within 10 seconds"),
    }
}

/// Block until `scheduler` has no pending or active work, failing the test
/// with the blocked items after 5 seconds.
pub fn wait_drained(scheduler: &nodeflow::work::WorkScheduler) {
    let drained = scheduler.wait_idle(std::time::Duration::from_secs(5));
    assert!(
        drained,
        "work scheduler did not drain; blocked: {:?}",
        scheduler.blocked()
    );
}
