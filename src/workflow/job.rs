use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a server-side job is doing. Generation answers in the same
/// request/response exchange and never becomes a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    TrainModel,
}

/// Tracks the lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Configuration for retrying idempotent backend calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given retry attempt using exponential backoff.
    /// delay = base_delay_ms * 2^(attempt - 1)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        self.base_delay_ms * 2u64.pow(attempt.saturating_sub(1))
    }
}

/// A server-side unit of work whose progress arrives over a push channel.
///
/// Created when a submission response yields a job id, dropped from the
/// workflow context once its channel closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub last_progress: u8,
    pub last_message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: impl Into<String>, kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            status: JobStatus::Pending,
            last_progress: 0,
            last_message: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a progress report verbatim. Values are not required to grow.
    pub fn record_progress(&mut self, progress: u8, message: &str) {
        self.status = JobStatus::Running;
        self.last_progress = progress;
        self.last_message = message.to_string();
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self, message: &str) {
        self.status = JobStatus::Completed;
        self.last_progress = 100;
        self.last_message = message.to_string();
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, message: &str) {
        self.status = JobStatus::Failed;
        self.last_message = message.to_string();
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_creation_defaults() {
        let job = Job::new("t1", JobKind::TrainModel);
        assert_eq!(job.id, "t1");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.last_progress, 0);
        assert!(job.last_message.is_empty());
    }

    #[test]
    fn progress_is_applied_verbatim() {
        let mut job = Job::new("t1", JobKind::TrainModel);
        job.record_progress(40, "tokenizing");
        job.record_progress(20, "building bigrams");
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.last_progress, 20);
        assert_eq!(job.last_message, "building bigrams");
    }

    #[test]
    fn completion_sets_full_progress() {
        let mut job = Job::new("t1", JobKind::TrainModel);
        job.record_progress(90, "almost");
        job.complete("done");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.last_progress, 100);
        assert!(job.status.is_terminal());
    }

    #[test]
    fn failure_keeps_last_progress() {
        let mut job = Job::new("t1", JobKind::TrainModel);
        job.record_progress(30, "working");
        job.fail("bad csv");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.last_progress, 30);
        assert_eq!(job.last_message, "bad csv");
    }

    #[test]
    fn retry_config_exponential_backoff() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 1000,
        };
        assert_eq!(config.delay_for_attempt(1), 1000);
        assert_eq!(config.delay_for_attempt(2), 2000);
        assert_eq!(config.delay_for_attempt(3), 4000);
        assert_eq!(config.delay_for_attempt(4), 8000);
    }
}
