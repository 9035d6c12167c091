// World-bible generation for a project.
//
// The user fills in three inputs, submits, and watches the background task.
// A failed submission or a failed task returns to editing with the same
// inputs so the user can retry.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use inkstone_common::types::{BibleInputs, ProjectId};

use crate::backend::Backend;
use crate::error::{RejectReason, SessionError};
use crate::progress::{watch_task, ProgressEvent, ProgressWatch, TaskOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BibleFlowState {
    Editing { inputs: BibleInputs, error: Option<String> },
    Running { inputs: BibleInputs, task_id: String },
    Completed { task_id: String },
}

impl BibleFlowState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Editing { .. } => "editing",
            Self::Running { .. } => "running",
            Self::Completed { .. } => "completed",
        }
    }
}

pub struct BibleFlow<B: Backend> {
    backend: Arc<B>,
    project_id: ProjectId,
    state: BibleFlowState,
}

impl<B: Backend> BibleFlow<B> {
    pub fn new(backend: Arc<B>, project_id: ProjectId, inputs: BibleInputs) -> Self {
        Self { backend, project_id, state: BibleFlowState::Editing { inputs, error: None } }
    }

    pub fn state(&self) -> &BibleFlowState {
        &self.state
    }

    /// Replace the inputs. Only allowed while editing.
    pub fn edit(&mut self, inputs: BibleInputs) -> Result<(), RejectReason> {
        match &self.state {
            BibleFlowState::Editing { .. } => {
                self.state = BibleFlowState::Editing { inputs, error: None };
                Ok(())
            }
            other => Err(RejectReason::InvalidTransition { from: other.name(), action: "edit" }),
        }
    }

    /// Submit the inputs and start watching the task.
    pub async fn submit(&mut self) -> Result<ProgressWatch, SessionError> {
        let inputs = match &self.state {
            BibleFlowState::Editing { inputs, .. } => inputs.clone(),
            other => {
                return Err(RejectReason::InvalidTransition { from: other.name(), action: "submit" }
                    .into())
            }
        };
        validate(&inputs)?;

        match self.backend.submit_bible(self.project_id, inputs.clone()).await {
            Ok(submission) => {
                info!(project_id = self.project_id, task_id = %submission.task_id, "bible generation submitted");
                let watch = watch_task(self.backend.clone(), self.project_id, submission.task_id.clone());
                self.state = BibleFlowState::Running { inputs, task_id: submission.task_id };
                Ok(watch)
            }
            Err(error) => {
                warn!(project_id = self.project_id, %error, "bible submission failed");
                self.state = BibleFlowState::Editing { inputs, error: Some(error.to_string()) };
                Err(error.into())
            }
        }
    }

    /// Record how the running task ended.
    pub fn settle(&mut self, outcome: &TaskOutcome) {
        let BibleFlowState::Running { inputs, task_id } = &self.state else {
            return;
        };
        self.state = match outcome {
            TaskOutcome::Completed => BibleFlowState::Completed { task_id: task_id.clone() },
            TaskOutcome::Failed { message } => {
                warn!(project_id = self.project_id, %task_id, %message, "bible generation failed");
                BibleFlowState::Editing { inputs: inputs.clone(), error: Some(message.clone()) }
            }
        };
    }

    /// Submit, follow the task to its end, and settle.
    pub async fn run(
        &mut self,
        on_event: impl FnMut(&ProgressEvent),
    ) -> Result<TaskOutcome, SessionError> {
        let watch = self.submit().await?;
        let outcome = watch.finish(on_event).await;
        self.settle(&outcome);
        Ok(outcome)
    }
}

fn validate(inputs: &BibleInputs) -> Result<(), RejectReason> {
    for (field, value) in [
        ("protagonist", &inputs.protagonist),
        ("cheat", &inputs.cheat),
        ("power_system", &inputs.power_system),
    ] {
        if value.trim().is_empty() {
            return Err(RejectReason::EmptyInput(field));
        }
    }
    Ok(())
}
