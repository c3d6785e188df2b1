#![allow(dead_code)]

pub use nodeflow_test_utils::builders;
pub use nodeflow_test_utils::fake_evaluator;
pub use nodeflow_test_utils::{init_tracing, wait_drained, with_timeout};
