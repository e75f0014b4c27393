use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use etldag::exec::{Artifact, ExecutionError, StepContext, StepFuture, StepHandler};

/// A fake handler that:
/// - records which steps were "run", in start order
/// - records the dependency artifacts each step received
/// - fails or panics for configured steps, succeeds for the rest
/// - optionally sleeps, so tests can observe concurrency
#[derive(Debug, Default)]
pub struct FakeHandler {
    failing: HashSet<String>,
    panicking: HashSet<String>,
    delay: Option<Duration>,
    executed: Mutex<Vec<String>>,
    received: Mutex<HashMap<String, Vec<String>>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(mut self, step: &str) -> Self {
        self.failing.insert(step.to_string());
        self
    }

    pub fn panic_on(mut self, step: &str) -> Self {
        self.panicking.insert(step.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Artifact produced for a successful step.
    pub fn artifact_for(step: &str) -> String {
        format!("artifact:{step}")
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn was_executed(&self, step: &str) -> bool {
        self.executed.lock().unwrap().iter().any(|s| s == step)
    }

    /// Dependency artifacts handed to `step`, if it ran.
    pub fn received_dependencies(&self, step: &str) -> Option<Vec<String>> {
        self.received.lock().unwrap().get(step).cloned()
    }

    /// Highest number of handlers observed running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

impl StepHandler for FakeHandler {
    fn execute(&self, ctx: StepContext) -> StepFuture<'_> {
        Box::pin(async move {
            let step = ctx.step.to_string();
            {
                self.executed.lock().unwrap().push(step.clone());
                self.received.lock().unwrap().insert(
                    step.clone(),
                    ctx.dependencies
                        .iter()
                        .map(|(_, artifact)| artifact.to_string())
                        .collect(),
                );
            }

            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.panicking.contains(&step) {
                panic!("fake handler panic for {step}");
            }
            if self.failing.contains(&step) {
                return Err(ExecutionError::failed(format!("fake failure for {step}")));
            }
            Ok(Artifact::new(Self::artifact_for(&step)))
        })
    }
}
