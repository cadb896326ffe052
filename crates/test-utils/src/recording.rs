use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use dagflow::operator::OperatorFuture;
use dagflow::{Node, Operator, RunContext};

/// One entry in an [`ExecutionLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(String),
    Finished(String),
}

/// Shared, ordered record of operator starts and finishes.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    events: Arc<Mutex<Vec<Event>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Names in the order their operators started.
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Started(n) => Some(n),
                Event::Finished(_) => None,
            })
            .collect()
    }

    /// Names in the order their operators finished.
    pub fn finished(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Finished(n) => Some(n),
                Event::Started(_) => None,
            })
            .collect()
    }

    /// How many times `name` was started.
    pub fn runs_of(&self, name: &str) -> usize {
        self.started().iter().filter(|n| *n == name).count()
    }

    pub fn ran(&self, name: &str) -> bool {
        self.runs_of(name) > 0
    }

    /// `true` iff `first` finished before `second` started.
    pub fn finished_before_start(&self, first: &str, second: &str) -> bool {
        let events = self.events();
        let done = events
            .iter()
            .position(|e| *e == Event::Finished(first.to_string()));
        let start = events
            .iter()
            .position(|e| *e == Event::Started(second.to_string()));
        matches!((done, start), (Some(d), Some(s)) if d < s)
    }

    /// Largest number of runs of `name` that overlapped in time.
    pub fn peak_concurrency_of(&self, name: &str) -> usize {
        let mut running = 0usize;
        let mut peak = 0;
        for event in self.events() {
            match event {
                Event::Started(n) if n == name => {
                    running += 1;
                    peak = peak.max(running);
                }
                Event::Finished(n) if n == name => running = running.saturating_sub(1),
                _ => {}
            }
        }
        peak
    }

    /// Largest number of operators that were running at the same moment.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn start(&self, name: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Started(name.to_string()));
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn finish(&self, name: &str) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(Event::Finished(name.to_string()));
    }
}

/// Operator that records itself in an [`ExecutionLog`], optionally sleeps,
/// and optionally fails.
#[derive(Debug, Clone)]
pub struct RecordingOperator {
    name: String,
    log: ExecutionLog,
    delay: Duration,
    fail: bool,
}

impl RecordingOperator {
    pub fn new(name: &str, log: &ExecutionLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl Operator for RecordingOperator {
    fn run(&self, _ctx: Arc<dyn RunContext>) -> OperatorFuture<'_> {
        Box::pin(async move {
            self.log.start(&self.name);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.log.finish(&self.name);

            if self.fail {
                bail!("{} failed on purpose", self.name);
            }
            Ok(())
        })
    }

    fn describe(&self) -> String {
        format!("recording {}", self.name)
    }
}

/// Node whose operator records into `log` and succeeds immediately.
pub fn recorded(name: &str, log: &ExecutionLog) -> Node {
    Node::new(name, RecordingOperator::new(name, log))
}

/// Node whose operator records into `log`, sleeps for `ms`, then succeeds.
pub fn recorded_slow(name: &str, log: &ExecutionLog, ms: u64) -> Node {
    Node::new(
        name,
        RecordingOperator::new(name, log).delay(Duration::from_millis(ms)),
    )
}

/// Node whose operator records into `log` and then fails.
pub fn recorded_failing(name: &str, log: &ExecutionLog) -> Node {
    Node::new(name, RecordingOperator::new(name, log).failing())
}
