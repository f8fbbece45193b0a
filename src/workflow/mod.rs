mod cache;
mod context;
mod form;
mod job;
mod notification;
mod step;

pub use cache::{CacheArtifact, CacheOffer, CacheOrigin, CacheState};
pub use context::{ProgressState, WorkflowContext};
pub use form::{
    DEFAULT_MAX_UPLOAD_BYTES, FormSnapshot, GenerationMethod, ModelSource, validate_sample_file,
};
pub use job::{Job, JobKind, RetryConfig};
pub use notification::{DEFAULT_TTL_MS, Notification, NotificationKind};
pub use step::WorkflowStep;
