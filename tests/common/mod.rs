#![allow(dead_code)]

use std::sync::Arc;

use dagflow::{Dag, MemoryContext};

pub use dagflow_test_utils::recording::{
    Event, ExecutionLog, RecordingOperator, recorded, recorded_failing, recorded_slow,
};
pub use dagflow_test_utils::{init_tracing, with_timeout};

/// Empty graph named `name` with a fresh in-memory context.
pub fn new_dag(name: &str) -> Dag {
    init_tracing();
    Dag::new(name, Arc::new(MemoryContext::new()))
}
