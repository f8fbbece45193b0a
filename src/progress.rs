//! Consumer for the training job's push channel.
//!
//! The server emits four tagged JSON shapes (`progress`, `complete`,
//! `error`, `keepalive`). They are applied strictly in arrival order; the
//! channel is closed exactly once, on the first terminal message or on
//! teardown, and nothing is applied afterwards.

use std::future::Future;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::backend::{ModelStats, ProgressChannel};
use crate::error::WizardError;
use crate::workflow::{CacheArtifact, CacheOffer, ProgressState, WorkflowContext};

const STREAM_FAILED: &str = "Connection to progress stream failed";
const DEFAULT_COMPLETE_MESSAGE: &str = "Model trained successfully";
const DEFAULT_ERROR_MESSAGE: &str = "Training failed";

/// One decoded message from the progress channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Progress {
        progress: u8,
        #[serde(default)]
        message: String,
    },
    Complete {
        #[serde(default)]
        stats: ModelStats,
        #[serde(rename = "cache_file", alias = "cacheFile")]
        cache_file: String,
        #[serde(default)]
        message: String,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    Keepalive,
}

const KNOWN_TAGS: &[&str] = &["progress", "complete", "error", "keepalive"];

impl ProgressEvent {
    /// Decodes one payload. Anything unrecognized is a protocol error.
    pub fn decode(raw: &str) -> Result<ProgressEvent, WizardError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| WizardError::Protocol(format!("malformed message: {e}")))?;
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| WizardError::Protocol("message has no type tag".into()))?;
        if !KNOWN_TAGS.contains(&tag.as_str()) {
            return Err(WizardError::Protocol(format!("unknown message type `{tag}`")));
        }
        let event: ProgressEvent = serde_json::from_value(value)
            .map_err(|e| WizardError::Protocol(format!("bad `{tag}` message: {e}")))?;
        if let ProgressEvent::Progress { progress, .. } = &event
            && *progress > 100
        {
            return Err(WizardError::Protocol(format!(
                "progress {progress} is out of range"
            )));
        }
        Ok(event)
    }
}

/// Receives progress updates as they are applied.
pub trait ProgressObserver {
    fn on_progress(&self, value: u8, message: &str);

    fn on_closed(&self) {}
}

impl ProgressObserver for () {
    fn on_progress(&self, _value: u8, _message: &str) {}
}

impl<T: ProgressObserver + ?Sized> ProgressObserver for &T {
    fn on_progress(&self, value: u8, message: &str) {
        (**self).on_progress(value, message);
    }

    fn on_closed(&self) {
        (**self).on_closed();
    }
}

/// How a progress channel ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Training finished; the artifact is now offered to the user.
    Completed { cache_file: String },
    /// The server reported an error.
    Failed { message: String },
    /// The channel errored or ended without a terminal message.
    Dropped,
    /// The view went away before the job finished.
    TornDown,
}

/// Applies one job's channel messages to the workflow context.
pub struct ProgressStreamConsumer<C: ProgressChannel> {
    channel: C,
    job_id: String,
    closed: bool,
}

impl<C: ProgressChannel> ProgressStreamConsumer<C> {
    pub fn new(job_id: impl Into<String>, channel: C) -> Self {
        Self {
            channel,
            job_id: job_id.into(),
            closed: false,
        }
    }

    /// Applies one raw payload. Returns the outcome if it was terminal.
    pub fn apply(
        &mut self,
        ctx: &mut WorkflowContext,
        raw: &str,
        observer: &dyn ProgressObserver,
    ) -> Option<StreamOutcome> {
        if self.closed {
            debug!(job_id = %self.job_id, "message after close ignored");
            return None;
        }

        let event = match ProgressEvent::decode(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "ignoring progress message");
                return None;
            }
        };

        match event {
            ProgressEvent::Keepalive => {
                trace!(job_id = %self.job_id, "keepalive");
                None
            }
            ProgressEvent::Progress { progress, message } => {
                debug!(job_id = %self.job_id, progress, %message, "progress");
                if let Some(job) = self.job_mut(ctx) {
                    job.record_progress(progress, &message);
                }
                observer.on_progress(progress, &message);
                ctx.progress = ProgressState {
                    value: progress,
                    message,
                };
                None
            }
            ProgressEvent::Complete {
                stats,
                cache_file,
                message,
            } => {
                let message = non_empty_or(message, DEFAULT_COMPLETE_MESSAGE);
                info!(job_id = %self.job_id, %cache_file, "training complete");
                if let Some(job) = self.job_mut(ctx) {
                    job.complete(&message);
                }
                observer.on_progress(100, &message);
                ctx.progress = ProgressState {
                    value: 100,
                    message: message.clone(),
                };
                ctx.stats = Some(stats);
                ctx.cache = Some(CacheArtifact::server_generated(cache_file.clone()));
                ctx.notifications.success(message);
                ctx.cache_offer = Some(CacheOffer::new(cache_file.clone()));
                self.close(ctx, observer);
                Some(StreamOutcome::Completed { cache_file })
            }
            ProgressEvent::Error { message } => {
                let message = non_empty_or(message, DEFAULT_ERROR_MESSAGE);
                warn!(job_id = %self.job_id, %message, "training failed");
                if let Some(job) = self.job_mut(ctx) {
                    job.fail(&message);
                }
                ctx.notifications.error(message.clone());
                self.close(ctx, observer);
                Some(StreamOutcome::Failed { message })
            }
        }
    }

    /// Reads the channel until a terminal message, a drop, or teardown.
    pub async fn run<T>(
        &mut self,
        ctx: &mut WorkflowContext,
        observer: &dyn ProgressObserver,
        teardown: T,
    ) -> StreamOutcome
    where
        T: Future<Output = ()>,
    {
        tokio::pin!(teardown);
        while !self.closed {
            tokio::select! {
                biased;
                _ = &mut teardown => {
                    info!(job_id = %self.job_id, "teardown while job running");
                    self.close(ctx, observer);
                    return StreamOutcome::TornDown;
                }
                next = self.channel.next_message() => match next {
                    Some(Ok(raw)) => {
                        if let Some(outcome) = self.apply(ctx, &raw, observer) {
                            return outcome;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(job_id = %self.job_id, error = %e, "progress channel failed");
                        return self.drop_stream(ctx, observer);
                    }
                    None => {
                        warn!(job_id = %self.job_id, "progress channel ended before completion");
                        return self.drop_stream(ctx, observer);
                    }
                },
            }
        }
        StreamOutcome::TornDown
    }

    fn drop_stream(
        &mut self,
        ctx: &mut WorkflowContext,
        observer: &dyn ProgressObserver,
    ) -> StreamOutcome {
        if let Some(job) = self.job_mut(ctx) {
            job.fail(STREAM_FAILED);
        }
        ctx.notifications.error(STREAM_FAILED);
        self.close(ctx, observer);
        StreamOutcome::Dropped
    }

    fn job_mut<'a>(&self, ctx: &'a mut WorkflowContext) -> Option<&'a mut crate::workflow::Job> {
        ctx.job.as_mut().filter(|job| job.id == self.job_id)
    }

    fn close(&mut self, ctx: &mut WorkflowContext, observer: &dyn ProgressObserver) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.channel.close();
        if ctx.job.as_ref().is_some_and(|job| job.id == self.job_id)
            && let Some(job) = ctx.job.take()
        {
            info!(
                job_id = %job.id,
                status = ?job.status,
                finished = job.status.is_terminal(),
                "job released"
            );
        }
        observer.on_closed();
    }
}

fn non_empty_or(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::workflow::{
        CacheOrigin, FormSnapshot, Job, JobKind, NotificationKind, WorkflowStep,
    };
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Channel that replays a fixed script and counts `close` calls.
    pub(crate) struct ScriptedChannel {
        pub script: VecDeque<Result<String, BackendError>>,
        pub closes: Rc<Cell<u32>>,
        /// Stay open (pending forever) once the script is exhausted.
        pub hang_at_end: bool,
    }

    impl ScriptedChannel {
        pub(crate) fn new(messages: &[&str]) -> Self {
            Self {
                script: messages.iter().map(|m| Ok(m.to_string())).collect(),
                closes: Rc::new(Cell::new(0)),
                hang_at_end: false,
            }
        }
    }

    impl ProgressChannel for ScriptedChannel {
        async fn next_message(&mut self) -> Option<Result<String, BackendError>> {
            match self.script.pop_front() {
                Some(item) => Some(item),
                None if self.hang_at_end => std::future::pending().await,
                None => None,
            }
        }

        fn close(&mut self) {
            self.closes.set(self.closes.get() + 1);
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        values: RefCell<Vec<u8>>,
        closed: Cell<u32>,
    }

    impl ProgressObserver for RecordingObserver {
        fn on_progress(&self, value: u8, _message: &str) {
            self.values.borrow_mut().push(value);
        }

        fn on_closed(&self) {
            self.closed.set(self.closed.get() + 1);
        }
    }

    fn training_ctx(job_id: &str) -> WorkflowContext {
        let mut ctx = WorkflowContext::new(
            FormSnapshot {
                sample_file: Some("demo.csv".into()),
                ..Default::default()
            },
            5000,
        );
        ctx.job = Some(Job::new(job_id, JobKind::TrainModel));
        ctx
    }

    fn progress(value: u8) -> String {
        format!(r#"{{"type": "progress", "progress": {value}, "message": "step {value}"}}"#)
    }

    const COMPLETE: &str = r#"{"type": "complete", "stats": {"cellsCreated": 7}, "cache_file": "model_abc.cache", "message": "Ngram dictionaries created"}"#;

    #[test]
    fn decode_all_shapes() {
        assert_eq!(
            ProgressEvent::decode(&progress(40)).unwrap(),
            ProgressEvent::Progress {
                progress: 40,
                message: "step 40".into()
            }
        );
        assert_eq!(
            ProgressEvent::decode(r#"{"type": "keepalive"}"#).unwrap(),
            ProgressEvent::Keepalive
        );
        assert!(matches!(
            ProgressEvent::decode(COMPLETE).unwrap(),
            ProgressEvent::Complete { .. }
        ));
        assert_eq!(
            ProgressEvent::decode(r#"{"type": "error", "message": "bad csv"}"#).unwrap(),
            ProgressEvent::Error {
                message: "bad csv".into()
            }
        );
    }

    #[test]
    fn decode_accepts_camel_case_cache_file() {
        let event = ProgressEvent::decode(
            r#"{"type": "complete", "stats": {}, "cacheFile": "t1_cache.pkl", "message": ""}"#,
        )
        .unwrap();
        match event {
            ProgressEvent::Complete { cache_file, .. } => assert_eq!(cache_file, "t1_cache.pkl"),
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_unknown_and_malformed() {
        for raw in [
            r#"{"type": "heartbeat"}"#,
            r#"{"progress": 10}"#,
            r#"{"type": "progress", "progress": 101}"#,
            r#"{"type": "progress", "progress": -1}"#,
            r#"{"type": "complete", "stats": {}}"#,
            "not json",
        ] {
            assert!(
                matches!(ProgressEvent::decode(raw), Err(WizardError::Protocol(_))),
                "{raw} should be a protocol error"
            );
        }
    }

    #[test]
    fn progress_applied_verbatim_in_order() {
        let mut ctx = training_ctx("t1");
        let observer = RecordingObserver::default();
        let mut consumer = ProgressStreamConsumer::new("t1", ScriptedChannel::new(&[]));

        for value in [10, 40, 30, 90] {
            assert!(consumer.apply(&mut ctx, &progress(value), &observer).is_none());
            assert_eq!(ctx.progress.value, value);
        }
        assert_eq!(*observer.values.borrow(), vec![10, 40, 30, 90]);
        assert_eq!(ctx.job.as_ref().unwrap().last_progress, 90);
        assert_eq!(ctx.progress.message, "step 90");
    }

    #[test]
    fn keepalive_and_unknown_change_nothing() {
        let mut ctx = training_ctx("t1");
        let mut consumer = ProgressStreamConsumer::new("t1", ScriptedChannel::new(&[]));
        consumer.apply(&mut ctx, &progress(20), &());

        assert!(consumer.apply(&mut ctx, r#"{"type": "keepalive"}"#, &()).is_none());
        assert!(consumer.apply(&mut ctx, r#"{"type": "mystery"}"#, &()).is_none());
        assert!(consumer.apply(&mut ctx, "{", &()).is_none());
        assert_eq!(ctx.progress.value, 20);
        assert!(!consumer.closed);
        assert!(ctx.notifications.latest().is_none());
    }

    #[test]
    fn complete_offers_cache_and_closes_once() {
        let mut ctx = training_ctx("t1");
        let channel = ScriptedChannel::new(&[]);
        let closes = channel.closes.clone();
        let observer = RecordingObserver::default();
        let mut consumer = ProgressStreamConsumer::new("t1", channel);

        let outcome = consumer.apply(&mut ctx, COMPLETE, &observer);
        assert_eq!(
            outcome,
            Some(StreamOutcome::Completed {
                cache_file: "model_abc.cache".into()
            })
        );
        assert_eq!(ctx.progress.value, 100);
        assert_eq!(ctx.stats.as_ref().unwrap().cells_created, 7);
        let cache = ctx.cache.as_ref().unwrap();
        assert_eq!(cache.origin, CacheOrigin::ServerGenerated);
        assert_eq!(cache.name, "model_abc.cache");
        assert!(ctx.cache_offer.as_ref().unwrap().is_open());
        let note = ctx.notifications.active().unwrap();
        assert_eq!(note.kind, NotificationKind::Success);
        assert_eq!(note.message, "Ngram dictionaries created");
        assert!(ctx.job.is_none());
        // The wizard waits for the cache decision.
        assert_eq!(ctx.wizard.current(), WorkflowStep::Overview);
        assert!(!ctx.wizard.submission_succeeded());

        assert!(consumer.closed);
        assert_eq!(closes.get(), 1);
        assert_eq!(observer.closed.get(), 1);
    }

    #[test]
    fn messages_after_close_are_ignored() {
        let mut ctx = training_ctx("t1");
        let channel = ScriptedChannel::new(&[]);
        let closes = channel.closes.clone();
        let mut consumer = ProgressStreamConsumer::new("t1", channel);
        consumer.apply(&mut ctx, COMPLETE, &());

        let before_progress = ctx.progress.clone();
        let before_note = ctx.notifications.latest().cloned();
        assert!(consumer.apply(&mut ctx, &progress(5), &()).is_none());
        assert!(
            consumer
                .apply(&mut ctx, r#"{"type": "error", "message": "late"}"#, &())
                .is_none()
        );
        assert!(consumer.apply(&mut ctx, COMPLETE, &()).is_none());

        assert_eq!(ctx.progress, before_progress);
        assert_eq!(ctx.notifications.latest().cloned(), before_note);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn error_before_complete_raises_error_and_discards_job() {
        let mut ctx = training_ctx("t1");
        let mut consumer = ProgressStreamConsumer::new("t1", ScriptedChannel::new(&[]));
        consumer.apply(&mut ctx, &progress(40), &());

        let outcome = consumer.apply(&mut ctx, r#"{"type": "error", "message": "bad csv"}"#, &());
        assert_eq!(
            outcome,
            Some(StreamOutcome::Failed {
                message: "bad csv".into()
            })
        );
        assert!(ctx.job.is_none());
        assert!(ctx.cache_offer.is_none());
        assert_eq!(ctx.progress.value, 40);
        let note = ctx.notifications.active().unwrap();
        assert_eq!(note.kind, NotificationKind::Error);
        assert_eq!(note.message, "bad csv");
    }

    #[tokio::test]
    async fn run_stops_at_first_terminal_message() {
        let mut ctx = training_ctx("t1");
        let p10 = progress(10);
        let channel = ScriptedChannel::new(&[
            &p10,
            r#"{"type": "keepalive"}"#,
            COMPLETE,
            r#"{"type": "error", "message": "never seen"}"#,
        ]);
        let closes = channel.closes.clone();
        let mut consumer = ProgressStreamConsumer::new("t1", channel);

        let outcome = consumer
            .run(&mut ctx, &(), std::future::pending())
            .await;
        assert!(matches!(outcome, StreamOutcome::Completed { .. }));
        assert_eq!(closes.get(), 1);
        assert_eq!(
            ctx.notifications.active().unwrap().kind,
            NotificationKind::Success
        );
    }

    #[tokio::test]
    async fn run_reports_dropped_channel() {
        let mut ctx = training_ctx("t1");
        let p10 = progress(10);
        let mut channel = ScriptedChannel::new(&[&p10]);
        channel
            .script
            .push_back(Err(BackendError::Decode("connection reset".into())));
        let closes = channel.closes.clone();
        let mut consumer = ProgressStreamConsumer::new("t1", channel);

        let outcome = consumer.run(&mut ctx, &(), std::future::pending()).await;
        assert_eq!(outcome, StreamOutcome::Dropped);
        assert_eq!(closes.get(), 1);
        assert!(ctx.job.is_none());
        assert_eq!(
            ctx.notifications.active().unwrap().message,
            "Connection to progress stream failed"
        );
    }

    #[tokio::test]
    async fn run_treats_early_end_as_drop() {
        let mut ctx = training_ctx("t1");
        let p50 = progress(50);
        let mut consumer = ProgressStreamConsumer::new("t1", ScriptedChannel::new(&[&p50]));
        let outcome = consumer.run(&mut ctx, &(), std::future::pending()).await;
        assert_eq!(outcome, StreamOutcome::Dropped);
        assert_eq!(ctx.progress.value, 50);
    }

    #[tokio::test]
    async fn teardown_closes_without_notification() {
        let mut ctx = training_ctx("t1");
        let p10 = progress(10);
        let mut channel = ScriptedChannel::new(&[&p10]);
        channel.hang_at_end = true;
        let closes = channel.closes.clone();
        let mut consumer = ProgressStreamConsumer::new("t1", channel);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let teardown = async move {
            let _ = rx.await;
        };
        let (outcome, _) = tokio::join!(consumer.run(&mut ctx, &(), teardown), async move {
            tokio::task::yield_now().await;
            let _ = tx.send(());
        });

        assert_eq!(outcome, StreamOutcome::TornDown);
        assert_eq!(closes.get(), 1);
        assert!(ctx.job.is_none());
        assert!(ctx.notifications.latest().is_none());
        assert_eq!(ctx.progress.value, 10);
    }
}
