// src/engine/report.rs

//! Final per-step report of an execution run.

use std::fmt;
use std::time::Duration;

use crate::dag::{StepId, StepState};
use crate::exec::{Artifact, ExecutionError};

/// Why a step ended up `skipped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// This upstream step failed.
    UpstreamFailed(StepId),
    /// The run was cancelled (fail-fast or interrupt) before it started.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UpstreamFailed(step) => write!(f, "upstream step {step} failed"),
            SkipReason::Cancelled => f.write_str("run cancelled"),
        }
    }
}

/// Terminal outcome of one step.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: StepId,
    pub state: StepState,
    pub artifact: Option<Artifact>,
    /// The originating error, for failed steps.
    pub error: Option<ExecutionError>,
    /// Dependents skipped because this step failed, in manifest order.
    pub skipped_dependents: Vec<StepId>,
    pub skip_reason: Option<SkipReason>,
    /// Wall time spent in the handler.
    pub duration: Option<Duration>,
}

impl StepReport {
    pub(crate) fn new(step: StepId, state: StepState) -> Self {
        Self {
            step,
            state,
            artifact: None,
            error: None,
            skipped_dependents: Vec::new(),
            skip_reason: None,
            duration: None,
        }
    }
}

/// Report for a whole run, one entry per selected step in manifest order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    steps: Vec<StepReport>,
}

impl RunReport {
    pub(crate) fn new(steps: Vec<StepReport>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[StepReport] {
        &self.steps
    }

    pub fn get(&self, id: &str) -> Option<&StepReport> {
        self.steps.iter().find(|r| r.step.to_string() == id)
    }

    pub fn state_of(&self, id: &str) -> Option<StepState> {
        self.get(id).map(|r| r.state)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|r| r.state == StepState::Failed)
    }

    pub fn count(&self, state: StepState) -> usize {
        self.steps.iter().filter(|r| r.state == state).count()
    }

    /// True when every step succeeded.
    pub fn is_success(&self) -> bool {
        self.steps.iter().all(|r| r.state == StepState::Succeeded)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} step(s): {} succeeded, {} failed, {} skipped",
            self.steps.len(),
            self.count(StepState::Succeeded),
            self.count(StepState::Failed),
            self.count(StepState::Skipped),
        )?;

        for failure in self.failures() {
            match &failure.error {
                Some(err) => writeln!(f, "  FAILED  {}: {}", failure.step, err)?,
                None => writeln!(f, "  FAILED  {}", failure.step)?,
            }
            for skipped in &failure.skipped_dependents {
                writeln!(f, "    skipped {skipped}")?;
            }
        }

        let cancelled = self
            .steps
            .iter()
            .filter(|r| r.skip_reason == Some(SkipReason::Cancelled))
            .count();
        if cancelled > 0 {
            writeln!(f, "  {cancelled} step(s) not started because the run was cancelled")?;
        }

        Ok(())
    }
}
