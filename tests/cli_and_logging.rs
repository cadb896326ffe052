// tests/cli_and_logging.rs

use std::io::Write;

use clap::Parser;
use dagflow::cli::{CliArgs, LogLevel};
use dagflow::config::{build_dag_with_logger, default_config_path, parse_and_validate};
use dagflow::logging::{level_from_log_level, parse_level_str, silent, subscriber};
use dagflow::{Dag, MemoryContext, Node, NodeStatus, NoopOperator};
use dagflow_test_utils::capture::LogCapture;
use dagflow_test_utils::with_timeout;
use tempfile::NamedTempFile;

#[test]
fn cli_defaults() {
    let args = CliArgs::try_parse_from(["dagflow"]).unwrap();

    assert_eq!(args.config, default_config_path().display().to_string());
    assert_eq!(args.workers, None);
    assert!(args.log_level.is_none());
    assert!(!args.dry_run);
}

#[test]
fn cli_flags() {
    let args = CliArgs::try_parse_from([
        "dagflow",
        "--config",
        "ci.toml",
        "--workers",
        "4",
        "--log-level",
        "debug",
        "--dry-run",
    ])
    .unwrap();

    assert_eq!(args.config, "ci.toml");
    assert_eq!(args.workers, Some(4));
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    assert!(args.dry_run);
}

#[test]
fn cli_rejects_unknown_log_level() {
    assert!(CliArgs::try_parse_from(["dagflow", "--log-level", "loud"]).is_err());
}

#[test]
fn level_parsing() {
    assert_eq!(parse_level_str(" Warning "), Some(tracing::Level::WARN));
    assert_eq!(parse_level_str("TRACE"), Some(tracing::Level::TRACE));
    assert_eq!(parse_level_str("verbose"), None);
    assert_eq!(level_from_log_level(LogLevel::Error), tracing::Level::ERROR);
}

#[tokio::test]
async fn graphs_can_log_to_a_silent_or_dedicated_sink() {
    let mut quiet = Dag::with_logger(
        "quiet",
        std::sync::Arc::new(MemoryContext::new()),
        silent(),
    );
    quiet.add_child("quiet", Node::new("step", NoopOperator));
    with_timeout(quiet.solve()).await.unwrap();
    assert_eq!(quiet.status_of("step"), Some(NodeStatus::Success));

    let cfg = parse_and_validate("[task.only]\ncmd = \"true\"\n").unwrap();
    let dag = build_dag_with_logger(&cfg, subscriber(tracing::Level::WARN));
    assert_eq!(dag.num_of_nodes(), 2);
}

#[test]
fn config_build_logs_to_the_injected_logger() {
    let capture = LogCapture::new();
    let cfg = parse_and_validate("[dag]\nname = \"nightly\"\n\n[task.only]\ncmd = \"true\"\n")
        .unwrap();

    let dag = build_dag_with_logger(&cfg, capture.dispatch(tracing::Level::DEBUG));

    assert_eq!(dag.num_of_nodes(), 2);
    let output = capture.contents();
    assert!(output.contains("added node"), "{output}");
    assert!(output.contains("built dag from config"), "{output}");
    assert!(output.contains("nightly"), "{output}");
}

#[tokio::test]
async fn dry_run_validates_without_executing() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");

    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        "[task.touch]\ncmd = \"touch {}\"\nrequired = true\n",
        marker.display()
    )
    .unwrap();
    let path = file.path().display().to_string();

    let args = CliArgs::try_parse_from([
        "dagflow",
        "--config",
        path.as_str(),
        "--dry-run",
    ])
    .unwrap();

    with_timeout(dagflow::run(args)).await.unwrap();
    assert!(!marker.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn run_reports_required_failures() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        "[task.gate]\ncmd = \"exit 1\"\nrequired = true\n\n[task.next]\ncmd = \"true\"\nafter = [\"gate\"]\n"
    )
    .unwrap();
    let path = file.path().display().to_string();

    let args = CliArgs::try_parse_from([
        "dagflow",
        "--config",
        path.as_str(),
        "--workers",
        "2",
    ])
    .unwrap();

    let err = with_timeout(dagflow::run(args)).await.unwrap_err();
    assert!(format!("{err:#}").contains("required node `gate` failed"));
}
