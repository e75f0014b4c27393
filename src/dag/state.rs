// src/dag/state.rs

//! Per-run state of a step.

use std::fmt;

/// Lifecycle of a step during one execution run.
///
/// States only move forward:
///
/// ```text
/// Pending -> Ready -> Running -> Succeeded | Failed
/// Pending | Ready -> Skipped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepState {
    /// Waiting for pipeline dependencies to succeed.
    Pending,
    /// Dependencies satisfied; handed to the coordinator but not started.
    Ready,
    /// The step handler is executing.
    Running,
    Succeeded,
    Failed,
    /// Never executed, because an upstream step failed or the run was
    /// cancelled.
    Skipped,
}

impl StepState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepState::Succeeded | StepState::Failed | StepState::Skipped
        )
    }

    /// Whether moving from `self` to `next` respects the lifecycle.
    pub fn can_advance_to(self, next: StepState) -> bool {
        use StepState::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, Skipped)
                | (Ready, Running)
                | (Ready, Skipped)
                | (Running, Succeeded)
                | (Running, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Ready => "ready",
            StepState::Running => "running",
            StepState::Succeeded => "succeeded",
            StepState::Failed => "failed",
            StepState::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::StepState::*;

    #[test]
    fn terminal_states_never_move() {
        for from in [Succeeded, Failed, Skipped] {
            for to in [Pending, Ready, Running, Succeeded, Failed, Skipped] {
                assert!(!from.can_advance_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn running_cannot_be_skipped() {
        assert!(!Running.can_advance_to(Skipped));
        assert!(Ready.can_advance_to(Skipped));
        assert!(!Pending.can_advance_to(Running));
    }
}
