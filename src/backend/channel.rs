use std::collections::VecDeque;

use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Response;
use tracing::{debug, info};

use super::error::BackendError;

/// A read-only server-push subscription delivering raw message payloads.
///
/// `close` must be called once the consumer is done; it drops the
/// underlying connection and is idempotent.
pub trait ProgressChannel {
    /// Next message payload, or `None` once the server ended the stream.
    async fn next_message(&mut self) -> Option<Result<String, BackendError>>;

    fn close(&mut self);
}

/// Splits a server-sent-events byte stream into message payloads.
///
/// `data:` lines accumulate until a blank line dispatches them (joined with
/// `\n`). Comments and other fields are skipped. A line that is itself a
/// JSON object is dispatched on its own, so plain JSON-lines streams work too.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            self.handle_line(line, &mut out);
        }
        out
    }

    /// Flushes whatever is left when the stream ends.
    pub fn finish(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw).into_owned();
            self.handle_line(line.trim_end_matches('\r'), &mut out);
        }
        self.dispatch(&mut out);
        out
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(out);
        } else if line.starts_with(':') {
            // comment
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        } else if line.trim_start().starts_with('{') {
            self.dispatch(out);
            out.push(line.trim().to_string());
        }
    }

    fn dispatch(&mut self, out: &mut Vec<String>) {
        if !self.data.is_empty() {
            out.push(self.data.join("\n"));
            self.data.clear();
        }
    }
}

/// Progress channel backed by a streaming HTTP response.
pub struct SseChannel {
    task_id: String,
    stream: Option<BoxStream<'static, Result<Vec<u8>, reqwest::Error>>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
}

impl SseChannel {
    pub fn new(task_id: impl Into<String>, response: Response) -> Self {
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Self {
            task_id: task_id.into(),
            stream: Some(stream),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
        }
    }
}

#[cfg(test)]
impl SseChannel {
    pub(crate) fn is_closed(&self) -> bool {
        self.stream.is_none() && self.pending.is_empty()
    }
}

impl ProgressChannel for SseChannel {
    async fn next_message(&mut self) -> Option<Result<String, BackendError>> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Some(Ok(message));
            }
            let stream = self.stream.as_mut()?;
            match stream.next().await {
                Some(Ok(chunk)) => {
                    let messages = self.decoder.push(&chunk);
                    self.pending.extend(messages);
                }
                Some(Err(e)) => {
                    self.stream = None;
                    return Some(Err(BackendError::Transport(e)));
                }
                None => {
                    debug!(task_id = %self.task_id, "progress stream ended by server");
                    self.stream = None;
                    let rest = self.decoder.finish();
                    self.pending.extend(rest);
                }
            }
        }
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            info!(task_id = %self.task_id, "progress channel closed");
        }
        self.pending.clear();
    }
}
