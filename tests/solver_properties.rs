// tests/solver_properties.rs

mod common;

use std::collections::BTreeSet;

use common::*;
use dagflow::{Dag, DagflowError, NodeStatus, SolverConfig};
use proptest::prelude::*;

/// One generated node: its parent indices (empty means "under the root")
/// and its failure policy.
#[derive(Debug, Clone)]
struct NodePlan {
    parents: BTreeSet<usize>,
    fails: bool,
    required: bool,
    continue_on_err: bool,
}

// Acyclic by construction: node `i` may only depend on nodes `0..i`.
fn graph_strategy(max_nodes: usize) -> impl Strategy<Value = Vec<NodePlan>> {
    (1..=max_nodes).prop_flat_map(|n| {
        proptest::collection::vec(
            (
                proptest::collection::vec(any::<usize>(), 0..3),
                prop::bool::weighted(0.25),
                prop::bool::weighted(0.2),
                any::<bool>(),
            ),
            n,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (deps, fails, required, continue_on_err))| NodePlan {
                    parents: if i == 0 {
                        BTreeSet::new()
                    } else {
                        deps.into_iter().map(|d| d % i).collect()
                    },
                    fails,
                    required,
                    continue_on_err,
                })
                .collect()
        })
    })
}

fn name(i: usize) -> String {
    format!("n{i}")
}

fn build(plans: &[NodePlan], log: &ExecutionLog) -> Dag {
    let mut dag = new_dag("root");
    for (i, plan) in plans.iter().enumerate() {
        let op = if plan.fails {
            RecordingOperator::new(&name(i), log).failing()
        } else {
            RecordingOperator::new(&name(i), log)
        };
        let node = dagflow::Node::new(name(i), op)
            .required(plan.required)
            .continue_on_err(plan.continue_on_err);

        let mut parents = plan.parents.iter().map(|&p| name(p));
        match parents.next() {
            None => dag.add_child("root", node),
            Some(first) => {
                dag.add_child(&first, node);
                for parent in parents {
                    dag.link(&parent, &name(i));
                }
            }
        }
    }
    dag
}

/// Nodes that must run when no required node fails: every parent ran and
/// either succeeded or failed with `continue_on_err`.
fn expected_to_run(plans: &[NodePlan]) -> BTreeSet<usize> {
    let mut runs = BTreeSet::new();
    for (i, plan) in plans.iter().enumerate() {
        let ready = plan.parents.iter().all(|&p| {
            runs.contains(&p) && (!plans[p].fails || plans[p].continue_on_err)
        });
        if ready {
            runs.insert(i);
        }
    }
    runs
}

fn solve(dag: &mut Dag, workers: usize) -> Result<(), DagflowError> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    rt.block_on(with_timeout(
        dag.solve_with(SolverConfig::default().workers(workers)),
    ))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_node_runs_at_most_once_and_after_its_parents(
        plans in graph_strategy(12),
        workers in 1usize..4,
    ) {
        let log = ExecutionLog::new();
        let mut dag = build(&plans, &log);
        prop_assert!(dag.is_solvable());

        let result = solve(&mut dag, workers);

        for (i, plan) in plans.iter().enumerate() {
            let me = name(i);
            prop_assert!(log.runs_of(&me) <= 1, "{} ran {} times", me, log.runs_of(&me));
            if log.ran(&me) {
                for &p in &plan.parents {
                    prop_assert!(
                        log.finished_before_start(&name(p), &me),
                        "{} started before parent {} finished", me, name(p)
                    );
                }
            }
        }

        match result {
            Ok(()) => {
                let expected = expected_to_run(&plans);
                for (i, plan) in plans.iter().enumerate() {
                    let me = name(i);
                    prop_assert_eq!(log.ran(&me), expected.contains(&i), "{}", me);
                    prop_assert!(!(plan.required && plan.fails && log.ran(&me)));

                    let status = dag.status_of(&me).unwrap();
                    prop_assert!(status.is_terminal(), "{} left {}", me, status);
                    if !log.ran(&me) {
                        prop_assert_eq!(status, NodeStatus::Skipped);
                    }
                }
            }
            Err(DagflowError::NodeFailed { node, .. }) => {
                let idx: usize = node[1..].parse().unwrap();
                prop_assert!(plans[idx].required && plans[idx].fails);
                prop_assert_eq!(dag.status_of(&node), Some(NodeStatus::Failed));

                // Anything that ran was reachable without a required failure
                // in its ancestry.
                let reachable = expected_to_run(&plans);
                for (i, _) in plans.iter().enumerate() {
                    if log.ran(&name(i)) {
                        prop_assert!(reachable.contains(&i));
                    }
                }
            }
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }

    #[test]
    fn failure_free_graphs_run_every_node(
        plans in graph_strategy(15),
    ) {
        let plans: Vec<NodePlan> = plans
            .into_iter()
            .map(|s| NodePlan { fails: false, ..s })
            .collect();
        let log = ExecutionLog::new();
        let mut dag = build(&plans, &log);

        prop_assert!(solve(&mut dag, 2).is_ok());
        prop_assert_eq!(log.started().len(), plans.len());
        prop_assert_eq!(dag.summary().succeeded, plans.len());
    }
}
