// tests/operators.rs

mod common;

use std::sync::{Arc, Mutex};

use anyhow::bail;
use common::*;
use dagflow::context::value_to_env_string;
use dagflow::{
    AsyncFnOperator, CommandOperator, Dag, FnOperator, MemoryContext, Node, NodeStatus,
    Operator, RunContext,
};
use dagflow_test_utils::capture::LogCapture;
use serde_json::{Value, json};

#[test]
fn memory_context_basic_operations() {
    let ctx = MemoryContext::new();
    assert_eq!(ctx.count(), 0);

    ctx.set("a", json!(1));
    ctx.set("b", json!("two"));
    ctx.set("a", json!(3));

    assert_eq!(ctx.count(), 2);
    assert!(ctx.has("a"));
    assert_eq!(ctx.get("a"), Some(json!(3)));
    assert_eq!(ctx.get("missing"), None);

    let mut keys = ctx.keys();
    keys.sort();
    assert_eq!(keys, vec!["a", "b"]);
    assert_eq!(ctx.values().len(), 2);

    let mut pairs: Vec<(String, Value)> = ctx.iter().collect();
    pairs.sort_by(|l, r| l.0.cmp(&r.0));
    assert_eq!(
        pairs,
        vec![("a".to_string(), json!(3)), ("b".to_string(), json!("two"))]
    );

    ctx.remove("a");
    ctx.remove("a");
    assert!(!ctx.has("a"));
    assert_eq!(ctx.count(), 1);
}

#[test]
fn context_iteration_is_a_snapshot() {
    let ctx = MemoryContext::from_pairs([("k", json!(true))]);
    let iter = ctx.iter();
    ctx.set("later", json!(null));

    assert_eq!(iter.count(), 1);
    assert_eq!(ctx.count(), 2);
}

#[test]
fn env_rendering_of_context_values() {
    assert_eq!(value_to_env_string(&json!("plain")), "plain");
    assert_eq!(value_to_env_string(&json!(null)), "");
    assert_eq!(value_to_env_string(&json!(42)), "42");
    assert_eq!(value_to_env_string(&json!([1, "x"])), r#"[1,"x"]"#);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_operators_share_the_context() {
    init_tracing();
    let ctx = Arc::new(MemoryContext::new());
    let mut dag = Dag::new("g", ctx.clone());

    for i in 0..8 {
        let key = format!("branch_{i}");
        dag.add_child(
            "g",
            Node::new(
                key.clone(),
                FnOperator::new(move |ctx, _| {
                    ctx.set(&key, json!(i));
                    Ok(())
                }),
            ),
        );
    }
    dag.add_child(
        "branch_0",
        Node::new(
            "total",
            AsyncFnOperator::new(|ctx: Arc<dyn RunContext>| async move {
                let sum: i64 = ctx.values().iter().filter_map(Value::as_i64).sum();
                ctx.set("total", json!(sum));
                anyhow::Ok(())
            }),
        ),
    );
    for i in 1..8 {
        dag.link(&format!("branch_{i}"), "total");
    }

    with_timeout(dag.solve_with(dagflow::SolverConfig::default().workers(4)))
        .await
        .unwrap();

    assert_eq!(ctx.get("total"), Some(json!(28)));
}

#[tokio::test]
async fn fn_operator_receives_its_inputs() {
    init_tracing();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let op = FnOperator::with_inputs(vec![json!("x"), json!(2)], move |_ctx, inputs| {
        sink.lock().unwrap().extend_from_slice(inputs);
        Ok(())
    });
    assert_eq!(op.inputs().len(), 2);
    assert_eq!(op.describe(), "fn (2 inputs)");

    let mut dag = new_dag("g");
    dag.add_child("g", Node::new("f", op));
    with_timeout(dag.solve()).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![json!("x"), json!(2)]);
}

#[tokio::test]
async fn fn_operator_error_fails_the_node() {
    let mut dag = new_dag("g");
    dag.add_child(
        "g",
        Node::new("f", FnOperator::new(|_ctx, _inputs| bail!("no input given"))),
    );

    with_timeout(dag.solve()).await.unwrap();

    assert_eq!(dag.status_of("f"), Some(NodeStatus::Failed));
    let err = dag.node("f").and_then(|n| n.last_error()).unwrap();
    assert_eq!(err.to_string(), "no input given");
}

#[tokio::test]
async fn panicking_operator_is_a_failure_not_a_hang() {
    let mut dag = new_dag("g");
    dag.add_child(
        "g",
        Node::new(
            "boom",
            AsyncFnOperator::new(|_ctx| async {
                let explode = true;
                if explode {
                    panic!("operator exploded");
                }
                anyhow::Ok(())
            }),
        )
        .required(true),
    );

    let err = with_timeout(dag.solve()).await.unwrap_err();

    assert!(matches!(err, dagflow::DagflowError::NodeFailed { ref node, .. } if node == "boom"));
    let cause = dag.node("boom").and_then(|n| n.last_error()).unwrap();
    assert!(cause.to_string().contains("did not complete"));
}

#[cfg(unix)]
mod command {
    use super::*;

    #[tokio::test]
    async fn exports_context_and_env_to_the_command() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");

        let ctx = Arc::new(MemoryContext::from_pairs([
            ("target", json!("release")),
            ("jobs", json!(4)),
        ]));
        let mut dag = Dag::new("g", ctx);
        dag.add_child(
            "g",
            Node::new(
                "write",
                CommandOperator::new(format!(
                    "echo \"$TARGET $JOBS $EXTRA\" > {}",
                    out.display()
                ))
                .env("EXTRA", "yes"),
            ),
        );

        with_timeout(dag.solve()).await.unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written.trim(), "release 4 yes");
    }

    #[tokio::test]
    async fn runs_in_the_configured_directory() {
        let dir = tempfile::tempdir().unwrap();

        let mut dag = new_dag("g");
        dag.add_child(
            "g",
            Node::new("touch", CommandOperator::new("touch marker").cwd(dir.path())),
        );

        with_timeout(dag.solve()).await.unwrap();

        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn non_zero_exit_fails_with_the_code() {
        let mut dag = new_dag("g");
        dag.add_child("g", Node::new("fail", CommandOperator::new("exit 3")));

        with_timeout(dag.solve()).await.unwrap();

        let err = dag.node("fail").and_then(|n| n.last_error()).unwrap();
        assert_eq!(err.to_string(), "command `exit 3` exited with code 3");
    }

    #[test]
    fn describes_itself_with_the_command() {
        let op = CommandOperator::new("make all");
        assert_eq!(op.command(), "make all");
        assert_eq!(op.describe(), "cmd: make all");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn injected_logger_receives_solver_events() {
    let capture = LogCapture::new();
    let log = ExecutionLog::new();
    let mut dag = Dag::with_logger(
        "logged",
        Arc::new(MemoryContext::new()),
        capture.dispatch(tracing::Level::DEBUG),
    );
    dag.add_child("logged", recorded("step_one", &log));
    dag.add_child("step_one", recorded("step_two", &log));

    with_timeout(dag.solve()).await.unwrap();

    let output = capture.contents();
    assert!(output.contains("added node"));
    assert!(output.contains("starting dag solver"));
    assert!(output.contains("solving node"));
    assert!(output.contains("step_two"));
    assert!(output.contains("dag solver finished"));
}
