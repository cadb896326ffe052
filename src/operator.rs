// src/operator.rs

//! Work units executed by the solver, one per node.
//!
//! - [`NoopOperator`] does nothing and always succeeds (used for graph roots).
//! - [`CommandOperator`] runs a shell command with the run context exported
//!   as environment variables.
//! - [`FnOperator`] calls a blocking closure on the blocking thread pool.
//! - [`AsyncFnOperator`] awaits a closure-produced future.
//!
//! The trait is open: callers may implement [`Operator`] for their own types.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::context::{RunContext, value_to_env_string};

/// Boxed future returned by [`Operator::run`].
pub type OperatorFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A unit of work attached to a node.
///
/// The solver calls [`run`](Operator::run) exactly once per node per run.
/// Any error marks the node failed and is kept verbatim for reporting.
pub trait Operator: Send + Sync {
    fn run(&self, ctx: Arc<dyn RunContext>) -> OperatorFuture<'_>;

    /// Short human-readable description, used in logs and dry-run output.
    fn describe(&self) -> String {
        "operator".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOperator;

impl Operator for NoopOperator {
    fn run(&self, _ctx: Arc<dyn RunContext>) -> OperatorFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn describe(&self) -> String {
        "noop".to_string()
    }
}

/// Run a shell command (`sh -c` on Unix, `cmd /C` on Windows).
///
/// The child inherits the current process environment, plus one variable
/// per context entry with the key upper-cased, plus any variables set with
/// [`CommandOperator::env`]. Explicit variables win over context entries.
#[derive(Debug, Clone)]
pub struct CommandOperator {
    cmd: String,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl CommandOperator {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    /// Run the command from `dir` instead of the current directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
        self.env.insert(key.into(), val.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.cmd
    }

    async fn run_inner(&self, ctx: Arc<dyn RunContext>) -> Result<()> {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        for (key, val) in ctx.iter() {
            cmd.env(key.to_uppercase(), value_to_env_string(&val));
        }
        for (key, val) in &self.env {
            cmd.env(key, val);
        }
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning `{}`", self.cmd))?;

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, self.cmd.clone(), "stdout")));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, self.cmd.clone(), "stderr")));

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for `{}`", self.cmd))?;

        // Drain the pipes so the last lines are logged before we report.
        for reader in [stdout, stderr].into_iter().flatten() {
            let _ = reader.await;
        }

        if !status.success() {
            match status.code() {
                Some(code) => bail!("command `{}` exited with code {}", self.cmd, code),
                None => bail!("command `{}` was terminated by a signal", self.cmd),
            }
        }

        Ok(())
    }
}

impl Operator for CommandOperator {
    fn run(&self, ctx: Arc<dyn RunContext>) -> OperatorFuture<'_> {
        Box::pin(self.run_inner(ctx))
    }

    fn describe(&self) -> String {
        format!("cmd: {}", self.cmd)
    }
}

async fn forward_lines<R>(reader: R, cmd: String, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(cmd = %cmd, stream, "{}", line);
    }
}

type BlockingFn = dyn Fn(&dyn RunContext, &[Value]) -> Result<()> + Send + Sync;

/// Call a caller-supplied blocking function with bound inputs.
///
/// The function runs on Tokio's blocking pool, so it may block freely.
#[derive(Clone)]
pub struct FnOperator {
    inputs: Arc<Vec<Value>>,
    func: Arc<BlockingFn>,
}

impl FnOperator {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&dyn RunContext, &[Value]) -> Result<()> + Send + Sync + 'static,
    {
        Self::with_inputs(Vec::new(), func)
    }

    pub fn with_inputs<F>(inputs: Vec<Value>, func: F) -> Self
    where
        F: Fn(&dyn RunContext, &[Value]) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            inputs: Arc::new(inputs),
            func: Arc::new(func),
        }
    }

    pub fn inputs(&self) -> &[Value] {
        &self.inputs
    }
}

impl fmt::Debug for FnOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOperator")
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

impl Operator for FnOperator {
    fn run(&self, ctx: Arc<dyn RunContext>) -> OperatorFuture<'_> {
        let func = Arc::clone(&self.func);
        let inputs = Arc::clone(&self.inputs);

        Box::pin(async move {
            tokio::task::spawn_blocking(move || func(ctx.as_ref(), inputs.as_slice()))
                .await
                .context("function operator did not run to completion")?
        })
    }

    fn describe(&self) -> String {
        format!("fn ({} inputs)", self.inputs.len())
    }
}

type AsyncFn = dyn Fn(Arc<dyn RunContext>) -> OperatorFuture<'static> + Send + Sync;

/// Await a future produced by a caller-supplied closure.
#[derive(Clone)]
pub struct AsyncFnOperator {
    func: Arc<AsyncFn>,
}

impl AsyncFnOperator {
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(Arc<dyn RunContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            func: Arc::new(move |ctx: Arc<dyn RunContext>| -> OperatorFuture<'static> {
                Box::pin(func(ctx))
            }),
        }
    }
}

impl fmt::Debug for AsyncFnOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFnOperator").finish_non_exhaustive()
    }
}

impl Operator for AsyncFnOperator {
    fn run(&self, ctx: Arc<dyn RunContext>) -> OperatorFuture<'_> {
        (self.func)(ctx)
    }

    fn describe(&self) -> String {
        "async fn".to_string()
    }
}
