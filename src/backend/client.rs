use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::channel::SseChannel;
use super::error::BackendError;
use super::types::{
    GenerationRequest, GenerationResult, MapMatchRequest, MapMatchResponse, ModelStats,
    StatsRequest, StatsResponse, TrainResponse, message_from_body,
};
use super::Backend;
use crate::workflow::RetryConfig;

const TRAIN_PATH: &str = "/trajectory/generate/ngrams";
const PROGRESS_PATH: &str = "/trajectory/progress/";
const STATS_PATH: &str = "/trajectory/get-stats-from-cache/";
const GENERATE_PATH: &str = "/trajectory/generate/";
const RENAME_PATH: &str = "/trajectory/rename-cache/";
const MAP_MATCH_PATH: &str = "/trajectory/map-match/";
const DOWNLOAD_PATH: &str = "/trajectory/download/";

/// HTTP client for the trajectory service.
pub struct BackendClient {
    client: Client,
    base_url: String,
    retry: RetryConfig,
    request_timeout: Duration,
}

impl BackendClient {
    /// The request timeout applies to request/response calls only; the
    /// progress channel is long-lived and has none.
    pub fn with_settings(
        base_url: &str,
        retry: RetryConfig,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Runs an idempotent call, retrying transport failures with backoff.
    async fn with_retry<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Err(e) if e.is_transport() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay_ms = self.retry.delay_for_attempt(attempt);
                    warn!(
                        op,
                        attempt,
                        max = self.retry.max_retries,
                        delay_ms,
                        error = %e,
                        "retrying backend call"
                    );
                    sleep(Duration::from_millis(delay_ms)).await;
                }
                other => return other,
            }
        }
    }

    async fn post_stats(&self, cache_file: &str) -> Result<ModelStats, BackendError> {
        let response = self
            .client
            .post(self.url(STATS_PATH))
            .timeout(self.request_timeout)
            .json(&StatsRequest {
                cache_file: cache_file.to_string(),
            })
            .send()
            .await?;
        let body: StatsResponse = decode_json(check_status(response).await?).await?;
        Ok(body.stats)
    }

    async fn post_generate(
        &self,
        req: &GenerationRequest,
    ) -> Result<GenerationResult, BackendError> {
        let form = req
            .form_fields()
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value));
        let response = self
            .client
            .post(self.url(GENERATE_PATH))
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;
        decode_json(check_status(response).await?).await
    }

    async fn post_rename(&self, old_name: &str, new_name: &str) -> Result<String, BackendError> {
        let form = Form::new()
            .text("old_name", old_name.to_string())
            .text("new_name", new_name.to_string());
        let response = self
            .client
            .post(self.url(RENAME_PATH))
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        Ok(message_from_body(&body))
    }

    async fn post_map_match(&self, req: &MapMatchRequest) -> Result<MapMatchResponse, BackendError> {
        let response = self
            .client
            .post(self.url(MAP_MATCH_PATH))
            .timeout(self.request_timeout)
            .json(req)
            .send()
            .await?;
        decode_json(check_status(response).await?).await
    }

    /// The file name is a single escaped path segment, never a sub-path.
    fn download_url(&self, filename: &str) -> Result<Url, BackendError> {
        let mut url = Url::parse(&self.url(DOWNLOAD_PATH))
            .map_err(|e| BackendError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| BackendError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push(filename);
        Ok(url)
    }

    async fn get_download(&self, filename: &str) -> Result<Vec<u8>, BackendError> {
        let url = self.download_url(filename)?;
        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let bytes = check_status(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// Snaps generated trajectories to the road network.
    pub async fn map_match(&self, req: &MapMatchRequest) -> Result<MapMatchResponse, BackendError> {
        debug!(filename = %req.filename, percentage = req.percentage, "map-match");
        self.with_retry("map_match", || self.post_map_match(req)).await
    }

    /// Fetches a server file (generated, matched or cache) as raw bytes.
    pub async fn download(&self, filename: &str) -> Result<Vec<u8>, BackendError> {
        debug!(filename, "download");
        self.with_retry("download", || self.get_download(filename)).await
    }

    /// Downloads `filename` into `dest`, returning the number of bytes written.
    pub async fn download_to(&self, filename: &str, dest: &Path) -> Result<u64, BackendError> {
        let bytes = self.download(filename).await?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}

impl Backend for BackendClient {
    type Channel = SseChannel;

    async fn train(
        &self,
        sample_file: &Path,
        cell_size: u32,
    ) -> Result<TrainResponse, BackendError> {
        let data = tokio::fs::read(sample_file).await?;
        let file_name = sample_file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("sample.csv")
            .to_string();
        let mime = if file_name.to_ascii_lowercase().ends_with(".json") {
            "application/json"
        } else {
            "text/csv"
        };
        debug!(file = %file_name, bytes = data.len(), cell_size, "submitting training job");

        let part = Part::bytes(data).file_name(file_name).mime_str(mime)?;
        let form = Form::new()
            .text("cell_size", cell_size.to_string())
            .part("file", part);
        let response = self
            .client
            .post(self.url(TRAIN_PATH))
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;
        decode_json(check_status(response).await?).await
    }

    async fn open_progress(&self, task_id: &str) -> Result<SseChannel, BackendError> {
        debug!(task_id, "opening progress channel");
        let response = self
            .client
            .get(self.url(PROGRESS_PATH))
            .query(&[("task_id", task_id)])
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(SseChannel::new(task_id, response))
    }

    async fn stats_from_cache(&self, cache_file: &str) -> Result<ModelStats, BackendError> {
        debug!(cache_file, "loading stats from cache");
        self.with_retry("stats_from_cache", || self.post_stats(cache_file))
            .await
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResult, BackendError> {
        debug!(
            count = req.num_trajectories,
            method = %req.generation_method,
            cache_file = %req.cache_file,
            "submitting generation"
        );
        self.with_retry("generate", || self.post_generate(req)).await
    }

    async fn rename_cache(&self, old_name: &str, new_name: &str) -> Result<String, BackendError> {
        debug!(old_name, new_name, "renaming cache artifact");
        self.with_retry("rename_cache", || self.post_rename(old_name, new_name))
            .await
    }
}

async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    Err(BackendError::Server {
        status: status.as_u16(),
        message: message_from_body(&body),
    })
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
}
