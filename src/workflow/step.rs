use std::fmt;

use serde::{Deserialize, Serialize};

use super::form::FormSnapshot;

/// The three steps of the generation wizard, in order.
///
/// Overview → ModelStage → GenerationStage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkflowStep {
    Overview,
    ModelStage,
    GenerationStage,
}

impl WorkflowStep {
    pub fn next(self) -> Option<WorkflowStep> {
        match self {
            WorkflowStep::Overview => Some(WorkflowStep::ModelStage),
            WorkflowStep::ModelStage => Some(WorkflowStep::GenerationStage),
            WorkflowStep::GenerationStage => None,
        }
    }

    /// 1-based position, as shown in the step indicator.
    pub fn number(self) -> u8 {
        match self {
            WorkflowStep::Overview => 1,
            WorkflowStep::ModelStage => 2,
            WorkflowStep::GenerationStage => 3,
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStep::Overview => write!(f, "Overview"),
            WorkflowStep::ModelStage => write!(f, "Model"),
            WorkflowStep::GenerationStage => write!(f, "Trajectory"),
        }
    }
}

/// Tracks where the user is in the wizard and guards navigation.
///
/// Forward movement needs the current step's submission to have succeeded
/// and the next step's guard to hold. Backward movement is always allowed to
/// an earlier step. Guard violations are silent no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardState {
    current: WorkflowStep,
    submission_succeeded: bool,
    history: Vec<WorkflowStep>,
}

impl Default for WizardState {
    fn default() -> Self {
        Self::new()
    }
}

impl WizardState {
    pub fn new() -> Self {
        Self {
            current: WorkflowStep::Overview,
            submission_succeeded: false,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> WorkflowStep {
        self.current
    }

    /// Steps left behind, oldest first.
    pub fn history(&self) -> &[WorkflowStep] {
        &self.history
    }

    /// Records that the current step's submission went through.
    pub fn mark_succeeded(&mut self) {
        self.submission_succeeded = true;
    }

    pub fn submission_succeeded(&self) -> bool {
        self.submission_succeeded
    }

    /// Guard predicate for a step.
    ///
    /// - `Overview` is always enterable.
    /// - `ModelStage` needs exactly one model source and, when training, a
    ///   positive cell size.
    /// - `GenerationStage` has no guard of its own: it is enterable only as
    ///   the successor of a succeeded model-stage submission, or when the
    ///   wizard is already there.
    pub fn can_enter(&self, step: WorkflowStep, form: &FormSnapshot) -> bool {
        match step {
            WorkflowStep::Overview => true,
            WorkflowStep::ModelStage => form.model_stage_ready(),
            WorkflowStep::GenerationStage => {
                self.current == WorkflowStep::GenerationStage
                    || (self.current == WorkflowStep::ModelStage && self.submission_succeeded)
            }
        }
    }

    /// Moves one step forward. Returns whether the step changed.
    pub fn advance(&mut self, form: &FormSnapshot) -> bool {
        if !self.submission_succeeded {
            return false;
        }
        let Some(next) = self.current.next() else {
            return false;
        };
        if !self.can_enter(next, form) {
            return false;
        }
        self.history.push(self.current);
        self.current = next;
        self.submission_succeeded = false;
        true
    }
}

// The terminal wizard only walks forward; going back is what an interactive
// view does.
#[cfg(test)]
impl WizardState {
    /// Goes back to an earlier step. Form data is not touched.
    pub fn retreat(&mut self, target: WorkflowStep) -> bool {
        if target >= self.current {
            return false;
        }
        self.history.push(self.current);
        self.current = target;
        self.submission_succeeded = false;
        true
    }
}
