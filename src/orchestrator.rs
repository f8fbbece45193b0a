use std::cell::Cell;
use std::future::Future;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::backend::{Backend, BackendError};
use crate::cache_lifecycle::{CacheDecision, CacheLifecycleManager};
use crate::error::WizardError;
use crate::progress::{ProgressObserver, ProgressStreamConsumer, StreamOutcome};
use crate::workflow::{
    CacheArtifact, CacheState, DEFAULT_MAX_UPLOAD_BYTES, Job, JobKind, ModelSource,
    WorkflowContext, WorkflowStep, validate_sample_file,
};

const TRAIN_FAILED: &str = "Failed to create ngram dictionaries. Please try again.";
const STATS_FAILED: &str = "Failed to extract stats data from cache";
const GENERATE_FAILED: &str = "Failed to generate trajectories. Please try again.";
const GENERATE_OK: &str = "Trajectories generated successfully!";
const STREAM_FAILED: &str = "Connection to progress stream failed";

/// What a successful submission led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The wizard moved to this step.
    Advanced(WorkflowStep),
    /// Training finished; the artifact waits for a [`CacheDecision`].
    CacheOffered { cache_file: String },
    /// Trajectories were generated and stored in the context.
    Generated,
    /// The view went away before the submission finished.
    TornDown,
}

/// Clears the in-flight flag when the submission ends, however it ends.
struct InFlightGuard<'a>(&'a Cell<bool>);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a Cell<bool>) -> Result<Self, WizardError> {
        if flag.replace(true) {
            return Err(WizardError::InFlight);
        }
        Ok(Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Submits the current wizard step to the backend.
///
/// At most one submission is outstanding at a time; a second one is
/// rejected with [`WizardError::InFlight`] before anything is sent.
pub struct SubmissionOrchestrator<B, O = ()> {
    backend: B,
    observer: O,
    in_flight: Cell<bool>,
    max_upload_bytes: u64,
}

impl<B: Backend, O: ProgressObserver> SubmissionOrchestrator<B, O> {
    pub fn new(backend: B, observer: O) -> Self {
        Self {
            backend,
            observer,
            in_flight: Cell::new(false),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: u64) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    /// Submits the current step. A running training job is followed until
    /// it finishes.
    pub async fn submit(&self, ctx: &mut WorkflowContext) -> Result<SubmitOutcome, WizardError> {
        self.submit_with_teardown(ctx, std::future::pending()).await
    }

    /// Like [`submit`](Self::submit), but gives up as soon as `teardown`
    /// resolves. A training job's progress channel is closed; a pending
    /// request is dropped and its result never lands in the context.
    pub async fn submit_with_teardown<T>(
        &self,
        ctx: &mut WorkflowContext,
        teardown: T,
    ) -> Result<SubmitOutcome, WizardError>
    where
        T: Future<Output = ()>,
    {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let step = ctx.wizard.current();
        info!(%step, "submitting step");

        match step {
            WorkflowStep::Overview => self.submit_overview(ctx),
            WorkflowStep::ModelStage => self.submit_model(ctx, teardown).await,
            WorkflowStep::GenerationStage => {
                unless_torn_down(self.submit_generation(ctx), teardown)
                    .await
                    .unwrap_or(Ok(SubmitOutcome::TornDown))
            }
        }
    }

    /// Settles the artifact offered after training.
    pub async fn resolve_cache(
        &self,
        ctx: &mut WorkflowContext,
        decision: &CacheDecision,
    ) -> Result<SubmitOutcome, WizardError> {
        self.resolve_cache_with_teardown(ctx, decision, std::future::pending())
            .await
    }

    /// Like [`resolve_cache`](Self::resolve_cache). An interrupted rename
    /// leaves the offer open.
    pub async fn resolve_cache_with_teardown<T>(
        &self,
        ctx: &mut WorkflowContext,
        decision: &CacheDecision,
        teardown: T,
    ) -> Result<SubmitOutcome, WizardError>
    where
        T: Future<Output = ()>,
    {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let manager = CacheLifecycleManager::new(&self.backend);
        match unless_torn_down(manager.resolve(ctx, decision), teardown).await {
            Some(resolved) => {
                resolved?;
                Ok(SubmitOutcome::Advanced(ctx.wizard.current()))
            }
            None => {
                if let Some(offer) = ctx.cache_offer.as_mut()
                    && offer.state == CacheState::Saving
                {
                    offer.state = CacheState::Offered;
                }
                Ok(SubmitOutcome::TornDown)
            }
        }
    }

    fn submit_overview(&self, ctx: &mut WorkflowContext) -> Result<SubmitOutcome, WizardError> {
        if !ctx.wizard.can_enter(WorkflowStep::ModelStage, &ctx.form) {
            // Report the precise reason.
            ctx.form.validate_model_stage()?;
            return Err(WizardError::Validation(
                "the model stage cannot be entered yet".into(),
            ));
        }
        ctx.wizard.mark_succeeded();
        ctx.wizard.advance(&ctx.form);
        Ok(SubmitOutcome::Advanced(ctx.wizard.current()))
    }

    async fn submit_model<T>(
        &self,
        ctx: &mut WorkflowContext,
        teardown: T,
    ) -> Result<SubmitOutcome, WizardError>
    where
        T: Future<Output = ()>,
    {
        if let Some(offer) = ctx.cache_offer.as_ref().filter(|offer| offer.is_open()) {
            return Err(WizardError::Validation(format!(
                "decide what to do with cache `{}` first",
                offer.default_name
            )));
        }

        match ctx.form.validate_model_stage()? {
            ModelSource::Cache(name) => {
                let name = name.to_string();
                unless_torn_down(self.load_cache(ctx, name), teardown)
                    .await
                    .unwrap_or(Ok(SubmitOutcome::TornDown))
            }
            ModelSource::Sample { path, cell_size } => {
                let path = path.to_path_buf();
                validate_sample_file(&path, self.max_upload_bytes)?;
                self.train(ctx, path, cell_size, teardown).await
            }
        }
    }

    async fn load_cache(
        &self,
        ctx: &mut WorkflowContext,
        name: String,
    ) -> Result<SubmitOutcome, WizardError> {
        info!(cache = %name, "loading stats from cache");
        let stats = match self.backend.stats_from_cache(&name).await {
            Ok(stats) => stats,
            Err(e) => return Err(fail(ctx, STATS_FAILED, e)),
        };

        ctx.stats = Some(stats);
        ctx.cache = Some(CacheArtifact::user_supplied(name));
        ctx.wizard.mark_succeeded();
        ctx.wizard.advance(&ctx.form);
        Ok(SubmitOutcome::Advanced(ctx.wizard.current()))
    }

    async fn train<T>(
        &self,
        ctx: &mut WorkflowContext,
        path: PathBuf,
        cell_size: u32,
        teardown: T,
    ) -> Result<SubmitOutcome, WizardError>
    where
        T: Future<Output = ()>,
    {
        info!(sample = %path.display(), cell_size, "starting training");
        ctx.reset_progress();
        ctx.cache_offer = None;

        let task_id = match self.backend.train(&path, cell_size).await {
            Ok(resp) => resp.task_id,
            Err(e) => return Err(fail(ctx, TRAIN_FAILED, e)),
        };
        info!(job_id = %task_id, "training job accepted");
        ctx.job = Some(Job::new(task_id.clone(), JobKind::TrainModel));

        let channel = match self.backend.open_progress(&task_id).await {
            Ok(channel) => channel,
            Err(e) => {
                ctx.job = None;
                return Err(fail(ctx, STREAM_FAILED, e));
            }
        };

        let mut consumer = ProgressStreamConsumer::new(task_id, channel);
        match consumer.run(ctx, &self.observer, teardown).await {
            StreamOutcome::Completed { cache_file } => Ok(SubmitOutcome::CacheOffered { cache_file }),
            StreamOutcome::Failed { message } => Err(WizardError::Server(message)),
            StreamOutcome::Dropped => Err(WizardError::Transport(STREAM_FAILED.into())),
            StreamOutcome::TornDown => Ok(SubmitOutcome::TornDown),
        }
    }

    async fn submit_generation(
        &self,
        ctx: &mut WorkflowContext,
    ) -> Result<SubmitOutcome, WizardError> {
        let req = ctx.form.validate_generation_stage()?;
        info!(
            count = req.num_trajectories,
            method = %req.generation_method,
            cache = %req.cache_file,
            "generating trajectories"
        );

        let result = match self.backend.generate(&req).await {
            Ok(result) => result,
            Err(e) => return Err(fail(ctx, GENERATE_FAILED, e)),
        };

        if req.delete_cache_after
            && let Some(cache) = ctx.cache.as_mut()
        {
            cache.pending_deletion = true;
        }
        ctx.generation = Some(result);
        ctx.notifications.success(GENERATE_OK);
        ctx.wizard.mark_succeeded();
        Ok(SubmitOutcome::Generated)
    }
}

/// Runs `work` unless `teardown` resolves first.
async fn unless_torn_down<W, T>(work: W, teardown: T) -> Option<W::Output>
where
    W: Future,
    T: Future<Output = ()>,
{
    tokio::select! {
        biased;
        () = teardown => {
            info!("submission abandoned");
            None
        }
        output = work => Some(output),
    }
}

/// Raises the step's error notification and converts the failure.
fn fail(ctx: &mut WorkflowContext, message: &str, err: BackendError) -> WizardError {
    warn!(error = %err, "{message}");
    ctx.notifications.error(message);
    err.into()
}
