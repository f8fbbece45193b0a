use crate::backend::{GenerationResult, ModelStats};

use super::cache::{CacheArtifact, CacheOffer};
use super::form::FormSnapshot;
use super::job::Job;
use super::notification::NotificationCenter;
use super::step::WizardState;

/// Last progress report shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub value: u8,
    pub message: String,
}

/// All state the wizard components share, passed by reference to whoever
/// drives a step.
#[derive(Debug, Clone, Default)]
pub struct WorkflowContext {
    pub wizard: WizardState,
    pub form: FormSnapshot,
    /// The job whose channel is open, if any.
    pub job: Option<Job>,
    pub progress: ProgressState,
    pub cache: Option<CacheArtifact>,
    pub cache_offer: Option<CacheOffer>,
    pub stats: Option<ModelStats>,
    pub generation: Option<GenerationResult>,
    pub notifications: NotificationCenter,
}

impl WorkflowContext {
    pub fn new(form: FormSnapshot, notification_ttl_ms: u64) -> Self {
        let cache = form
            .cache_artifact_ref
            .as_deref()
            .map(CacheArtifact::user_supplied);
        Self {
            form,
            cache,
            notifications: NotificationCenter::new(notification_ttl_ms),
            ..Default::default()
        }
    }

    pub fn reset_progress(&mut self) {
        self.progress = ProgressState::default();
    }
}
