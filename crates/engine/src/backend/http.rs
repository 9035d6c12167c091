// HTTP implementation of the document service contract (reqwest).

use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};
use url::Url;

use inkstone_common::protocol::api::{
    ChapterUpdate, ConsistencyCheckResponse, ContinueRequest, ErrorBody, FixRequest,
    RewriteRequest, SnapshotCreate, TaskSubmission, WritingResponse,
};
use inkstone_common::protocol::chunk::Utf8ChunkDecoder;
use inkstone_common::protocol::sse::SseDecoder;
use inkstone_common::types::{
    BibleInputs, Chapter, ChapterId, ConsistencyIssue, FixProposal, ProjectId, Snapshot,
    SnapshotId, TaskUpdate,
};

use super::{Backend, BackendError, TaskSubscription, TokenStream};
use crate::config::GlobalConfig;

/// Talks to the document service REST API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, token: Option<String>, client: Client) -> Result<Self, BackendError> {
        let base_url = validate_base_url(base_url)?;
        Ok(Self { client, base_url, token })
    }

    /// Build from the global config: base URL, token, request timeout.
    pub fn from_config(config: &GlobalConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|error| BackendError::Transport(error.to_string()))?;
        Self::new(&config.api_url, config.resolved_token(), client)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        // `Url::join` drops the last segment of a base without a trailing slash.
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| BackendError::Transport("base URL cannot be a base".into()))?;
            segments.pop_if_empty();
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = self.authorize(request).send().await.map_err(transport_error)?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(|error| BackendError::Decode(error.to_string()))
    }
}

impl Backend for HttpBackend {
    async fn get_chapter(&self, chapter_id: ChapterId) -> Result<Chapter, BackendError> {
        let url = self.endpoint(&format!("chapters/{chapter_id}"))?;
        self.send_json(self.client.get(url)).await
    }

    async fn update_chapter(
        &self,
        chapter_id: ChapterId,
        content: &str,
    ) -> Result<Chapter, BackendError> {
        let url = self.endpoint(&format!("chapters/{chapter_id}"))?;
        let body = ChapterUpdate { content: content.to_string() };
        self.send_json(self.client.put(url).json(&body)).await
    }

    async fn continue_stream(&self, request: ContinueRequest) -> Result<TokenStream, BackendError> {
        let url = self.endpoint("writing/continue")?;
        let chapter_id = request.chapter_id;
        let response = self.send(self.client.post(url).json(&request)).await?;
        let (tx, stream) = TokenStream::channel();

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut decoder = Utf8ChunkDecoder::new();
            loop {
                let chunk = tokio::select! {
                    chunk = body.next() => chunk,
                    _ = tx.closed() => {
                        debug!(chapter_id, "continuation receiver dropped, closing stream");
                        return;
                    }
                };
                match chunk {
                    Some(Ok(bytes)) => {
                        let text = decoder.push(&bytes);
                        if text.is_empty() {
                            continue;
                        }
                        if tx.send(Ok(text)).await.is_err() {
                            return;
                        }
                    }
                    Some(Err(error)) => {
                        let _ = tx.send(Err(transport_error(error))).await;
                        return;
                    }
                    None => break,
                }
            }
            let tail = decoder.finish();
            if !tail.is_empty() {
                let _ = tx.send(Ok(tail)).await;
            }
            trace!(chapter_id, "continuation stream closed by service");
        });

        Ok(stream)
    }

    async fn rewrite(&self, request: RewriteRequest) -> Result<String, BackendError> {
        let url = self.endpoint("writing/rewrite")?;
        let response: WritingResponse = self.send_json(self.client.post(url).json(&request)).await?;
        Ok(response.content)
    }

    async fn detect_issues(
        &self,
        chapter_id: ChapterId,
    ) -> Result<Vec<ConsistencyIssue>, BackendError> {
        let url = self.endpoint(&format!("consistency/{chapter_id}/check"))?;
        let response: ConsistencyCheckResponse = self.send_json(self.client.post(url)).await?;
        Ok(response.issues)
    }

    async fn generate_fix(
        &self,
        chapter_id: ChapterId,
        request: FixRequest,
    ) -> Result<FixProposal, BackendError> {
        let url = self.endpoint(&format!("consistency/{chapter_id}/fix"))?;
        self.send_json(self.client.post(url).json(&request)).await
    }

    async fn create_snapshot(
        &self,
        chapter_id: ChapterId,
        label: Option<String>,
    ) -> Result<Snapshot, BackendError> {
        let url = self.endpoint(&format!("chapters/{chapter_id}/snapshots"))?;
        self.send_json(self.client.post(url).json(&SnapshotCreate { label })).await
    }

    async fn list_snapshots(&self, chapter_id: ChapterId) -> Result<Vec<Snapshot>, BackendError> {
        let url = self.endpoint(&format!("chapters/{chapter_id}/snapshots"))?;
        self.send_json(self.client.get(url)).await
    }

    async fn get_snapshot(&self, snapshot_id: SnapshotId) -> Result<Snapshot, BackendError> {
        let url = self.endpoint(&format!("snapshots/{snapshot_id}"))?;
        self.send_json(self.client.get(url)).await
    }

    async fn rollback_snapshot(&self, snapshot_id: SnapshotId) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("snapshots/{snapshot_id}/rollback"))?;
        self.send(self.client.post(url)).await.map(|_| ())
    }

    async fn delete_snapshot(&self, snapshot_id: SnapshotId) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("snapshots/{snapshot_id}"))?;
        self.send(self.client.delete(url)).await.map(|_| ())
    }

    async fn submit_bible(
        &self,
        project_id: ProjectId,
        inputs: BibleInputs,
    ) -> Result<TaskSubmission, BackendError> {
        let url = self.endpoint(&format!("projects/{project_id}/generate-bible"))?;
        self.send_json(self.client.post(url).json(&inputs)).await
    }

    async fn subscribe_task(
        &self,
        project_id: ProjectId,
        task_id: &str,
    ) -> Result<TaskSubscription, BackendError> {
        let mut url = self.endpoint(&format!("projects/{project_id}/generate-bible/status"))?;
        url.query_pairs_mut().append_pair("task_id", task_id);
        let request = self.client.get(url).header(reqwest::header::ACCEPT, "text/event-stream");
        let response = self.send(request).await?;
        let (tx, subscription) = TaskSubscription::channel();
        let task_id = task_id.to_string();

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut text = Utf8ChunkDecoder::new();
            let mut frames = SseDecoder::new();
            loop {
                let chunk = tokio::select! {
                    chunk = body.next() => chunk,
                    _ = tx.closed() => {
                        debug!(%task_id, "task subscriber gone, closing event stream");
                        return;
                    }
                };
                let (payloads, finished) = match chunk {
                    Some(Ok(bytes)) => (frames.push(&text.push(&bytes)), false),
                    Some(Err(error)) => {
                        let _ = tx.send(Err(transport_error(error))).await;
                        return;
                    }
                    None => {
                        let mut tail = frames.push(&text.finish());
                        tail.extend(frames.finish());
                        (tail, true)
                    }
                };
                for payload in payloads {
                    let update = serde_json::from_str::<TaskUpdate>(&payload)
                        .map_err(|error| BackendError::Decode(error.to_string()));
                    if let Err(error) = &update {
                        warn!(%task_id, %error, "undecodable task update");
                    }
                    if tx.send(update).await.is_err() {
                        return;
                    }
                }
                if finished {
                    trace!(%task_id, "task event stream closed by service");
                    return;
                }
            }
        });

        Ok(subscription)
    }
}

fn validate_base_url(raw: &str) -> Result<Url, BackendError> {
    let url = Url::parse(raw)
        .map_err(|error| BackendError::Transport(format!("invalid api url `{raw}`: {error}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(BackendError::Transport(format!(
            "api url `{raw}` must use http or https, got `{other}`"
        ))),
    }
}

async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(BackendError::Unauthorized);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .map(|error| error.message())
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body
            }
        });
    Err(BackendError::Status { status: status.as_u16(), detail })
}

fn transport_error(error: reqwest::Error) -> BackendError {
    BackendError::Transport(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBackend {
        HttpBackend::new(base, None, Client::new()).expect("backend should build")
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let backend = backend("http://localhost:8000/api/v1");
        assert_eq!(
            backend.endpoint("chapters/7/snapshots").unwrap().as_str(),
            "http://localhost:8000/api/v1/chapters/7/snapshots"
        );
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let backend = backend("http://localhost:8000/api/v1/");
        assert_eq!(
            backend.endpoint("/snapshots/3/rollback").unwrap().as_str(),
            "http://localhost:8000/api/v1/snapshots/3/rollback"
        );
    }

    #[test]
    fn rejects_non_http_base_url() {
        let error = HttpBackend::new("ftp://example.com", None, Client::new())
            .expect_err("ftp should be rejected");
        assert!(error.to_string().contains("http or https"));
    }

    #[test]
    fn rejects_unparsable_base_url() {
        assert!(HttpBackend::new("not a url", None, Client::new()).is_err());
    }
}
