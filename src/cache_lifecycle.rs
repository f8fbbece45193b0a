//! Keep-or-discard decision for a freshly trained cache artifact.

use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::error::WizardError;
use crate::workflow::{CacheOffer, CacheState, WorkflowContext};

/// What the user chose to do with the offered artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    /// Keep it, optionally under a new name.
    Save(Option<String>),
    /// Use it once for generation, then let the server delete it.
    Discard,
}

/// Resolves the open [`CacheOffer`] in a context.
pub struct CacheLifecycleManager<'a, B> {
    backend: &'a B,
}

impl<'a, B: Backend> CacheLifecycleManager<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    pub async fn resolve(
        &self,
        ctx: &mut WorkflowContext,
        decision: &CacheDecision,
    ) -> Result<(), WizardError> {
        match decision {
            CacheDecision::Save(name) => self.save(ctx, name.as_deref()).await,
            CacheDecision::Discard => self.discard(ctx),
        }
    }

    /// Keeps the artifact. A name different from the server's default is
    /// applied with a rename call; a failed rename leaves the offer open.
    pub async fn save(
        &self,
        ctx: &mut WorkflowContext,
        new_name: Option<&str>,
    ) -> Result<(), WizardError> {
        let offer = open_offer(&mut ctx.cache_offer)?;

        let name = if offer.needs_rename(new_name) {
            let new_name = new_name.map(str::trim).unwrap_or_default().to_string();
            offer.state = CacheState::Saving;
            info!(old = %offer.default_name, new = %new_name, "renaming cache");
            match self.backend.rename_cache(&offer.default_name, &new_name).await {
                Ok(message) => {
                    ctx.notifications.success(message);
                    new_name
                }
                Err(e) => {
                    warn!(error = %e, "cache rename failed");
                    offer.state = CacheState::Offered;
                    ctx.notifications
                        .error(format!("Failed to rename cache: {}", e.message()));
                    return Err(e.into());
                }
            }
        } else {
            offer.default_name.clone()
        };

        offer.artifact.name = name.clone();
        offer.state = CacheState::Resolved;
        info!(cache = %name, state = %offer.state, "cache kept");
        ctx.cache = Some(offer.artifact.clone());
        ctx.form.cache_artifact_ref = Some(name);
        ctx.form.delete_cache_after_use = false;
        adopt(ctx);
        Ok(())
    }

    /// Adopts the default name and flags the artifact for deletion after
    /// the next generation request.
    pub fn discard(&self, ctx: &mut WorkflowContext) -> Result<(), WizardError> {
        let offer = open_offer(&mut ctx.cache_offer)?;
        offer.state = CacheState::Deleting;
        offer.artifact.pending_deletion = true;
        info!(cache = %offer.default_name, "cache will be deleted after use");

        ctx.cache = Some(offer.artifact.clone());
        ctx.form.cache_artifact_ref = Some(offer.default_name.clone());
        ctx.form.delete_cache_after_use = true;
        offer.state = CacheState::Resolved;
        info!(cache = %offer.default_name, state = %offer.state, "cache discarded");
        adopt(ctx);
        Ok(())
    }
}

fn open_offer(offer: &mut Option<CacheOffer>) -> Result<&mut CacheOffer, WizardError> {
    offer
        .as_mut()
        .filter(|offer| offer.is_open())
        .ok_or_else(|| WizardError::Validation("no cache artifact is awaiting a decision".into()))
}

/// The trained artifact replaces the sample as the form's model source, so
/// the model stage stays submittable if the user goes back to it.
fn adopt(ctx: &mut WorkflowContext) {
    if let Some(sample) = ctx.form.sample_file.take() {
        debug!(sample = %sample.display(), "sample replaced by trained cache");
    }
    ctx.wizard.mark_succeeded();
    if ctx.wizard.advance(&ctx.form) {
        info!(step = %ctx.wizard.current(), "advanced after cache decision");
    }
}
