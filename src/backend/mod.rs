pub mod channel;
pub mod client;
pub mod error;
pub mod types;

use std::path::Path;

pub use channel::ProgressChannel;
pub use client::BackendClient;
pub use error::BackendError;
pub use types::{
    GenerationRequest, GenerationResult, MapMatchRequest, MapMatchResponse, ModelStats,
    TrainResponse,
};

/// The calls the workflow controller makes against the trajectory service.
///
/// Implemented over HTTP by [`BackendClient`]; tests substitute scripted
/// in-memory backends.
pub trait Backend {
    type Channel: ProgressChannel;

    /// Starts a training job. Never retried: it creates server-side work.
    async fn train(&self, sample_file: &Path, cell_size: u32)
    -> Result<TrainResponse, BackendError>;

    /// Opens the push channel reporting a job's progress.
    async fn open_progress(&self, task_id: &str) -> Result<Self::Channel, BackendError>;

    async fn stats_from_cache(&self, cache_file: &str) -> Result<ModelStats, BackendError>;

    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResult, BackendError>;

    /// Renames a cache artifact, returning the server's message.
    async fn rename_cache(&self, old_name: &str, new_name: &str) -> Result<String, BackendError>;
}
