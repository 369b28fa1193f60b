use crate::error::UploadError;
use crate::models::{
    Asset, DownloadUrlRequest, DownloadUrlResponse, PollResult, StatusResponse, TransferProgress,
    TransferTarget, UploadRequest, UploadUrlRequest, UploadUrlResponse,
};
use crate::services::poller::StatusSource;
use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Receives incremental progress while bytes are written.
pub type ProgressFn = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Chunk size used when streaming the asset body
pub const TRANSFER_CHUNK_SIZE: usize = 64 * 1024; // 64 KB

/// Characters left unescaped by JavaScript's `encodeURIComponent`
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Network primitives for moving an asset into the pipeline
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Negotiate a single-use write target for the named object
    async fn request_target(&self, request: &UploadRequest) -> Result<TransferTarget, UploadError>;

    /// Write the asset's bytes to the target, consuming it
    async fn transfer_bytes(
        &self,
        asset: &Asset,
        target: TransferTarget,
        progress: Option<ProgressFn>,
    ) -> Result<(), UploadError>;
}

/// reqwest-backed client for the pipeline HTTP API
pub struct HttpPipelineClient {
    http: reqwest::Client,
    api_base: String,
}

impl HttpPipelineClient {
    pub fn new(http: reqwest::Client, api_base: String) -> Self {
        Self { http, api_base }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }

    /// Presigned URL for a finished thumbnail, or `None` while it has not
    /// been generated yet.
    pub async fn download_url(&self, storage_key: &str) -> anyhow::Result<Option<String>> {
        let response = self
            .http
            .post(self.endpoint("download-url"))
            .json(&DownloadUrlRequest {
                key: storage_key.to_string(),
            })
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: DownloadUrlResponse = response.json().await?;
                Ok(Some(body.download_url))
            }
            status => Err(anyhow!(
                "Download URL request failed with status {}: {}",
                status,
                response.text().await.unwrap_or_default()
            )),
        }
    }

    /// Fetches the artifact bytes from a download URL
    pub async fn download_artifact(&self, url: &str) -> anyhow::Result<Bytes> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Artifact download failed with status {}", status));
        }
        let data = response.bytes().await?;
        info!("📥 Downloaded artifact ({} bytes)", data.len());
        Ok(data)
    }
}

/// Splits the body into transfer-sized chunks without copying.
fn chunks_of(data: &Bytes) -> Vec<Bytes> {
    (0..data.len())
        .step_by(TRANSFER_CHUNK_SIZE)
        .map(|start| data.slice(start..(start + TRANSFER_CHUNK_SIZE).min(data.len())))
        .collect()
}

/// Streams the body and reports progress as each chunk is pulled by the
/// transport. The final chunk is not reported here; completion is reported
/// only after the server accepts the upload.
fn progress_body(data: Bytes, progress: Option<ProgressFn>) -> reqwest::Body {
    let total = data.len() as u64;
    let mut sent = 0u64;
    let stream = futures::stream::iter(chunks_of(&data).into_iter().map(move |chunk| {
        sent += chunk.len() as u64;
        if sent < total {
            if let Some(report) = &progress {
                report(TransferProgress { sent, total });
            }
        }
        Ok::<Bytes, std::io::Error>(chunk)
    }));

    reqwest::Body::wrap_stream(stream)
}

#[async_trait]
impl TransferClient for HttpPipelineClient {
    async fn request_target(&self, request: &UploadRequest) -> Result<TransferTarget, UploadError> {
        debug!(
            "Requesting upload URL for {} ({})",
            request.sanitized_name, request.content_type
        );

        let response = self
            .http
            .post(self.endpoint("upload-url"))
            .json(&UploadUrlRequest {
                filename: request.sanitized_name.clone(),
                content_type: request.content_type.clone(),
            })
            .send()
            .await
            .map_err(|e| UploadError::Negotiation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Upload URL request rejected with {}: {}", status, body);
            return Err(UploadError::Negotiation(format!(
                "backend responded with status {}",
                status
            )));
        }

        let body: UploadUrlResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Negotiation(format!("invalid response body: {}", e)))?;

        if let Some(expires_in) = body.expires_in {
            debug!("Upload URL for {} expires in {}s", body.key, expires_in);
        }

        Ok(TransferTarget {
            write_url: body.upload_url,
            storage_key: body.key,
        })
    }

    async fn transfer_bytes(
        &self,
        asset: &Asset,
        target: TransferTarget,
        progress: Option<ProgressFn>,
    ) -> Result<(), UploadError> {
        let total = asset.size_bytes();
        info!("📤 Uploading {} ({} bytes)", target.storage_key, total);

        let response = self
            .http
            .put(&target.write_url)
            .header(CONTENT_TYPE, asset.content_type())
            .header(CONTENT_LENGTH, total)
            .body(progress_body(asset.bytes().clone(), progress.clone()))
            .send()
            .await
            .map_err(|e| UploadError::Transfer(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Upload rejected with {}: {}", status, body);
            return Err(UploadError::Transfer(format!(
                "storage responded with status {}",
                status
            )));
        }

        if let Some(report) = &progress {
            report(TransferProgress { sent: total, total });
        }
        Ok(())
    }
}

#[async_trait]
impl StatusSource for HttpPipelineClient {
    async fn fetch_status(&self, storage_key: &str) -> Result<PollResult, UploadError> {
        let url = format!(
            "{}?key={}",
            self.endpoint("status"),
            utf8_percent_encode(storage_key, URI_COMPONENT)
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| UploadError::Poll(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(UploadError::Poll(format!(
                "status endpoint responded with {}",
                status
            )));
        }

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Poll(format!("invalid status body: {}", e)))?;

        body.into_poll_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_component_encoding() {
        let encoded = utf8_percent_encode("1700_NOVA SEASON/x+y.png", URI_COMPONENT).to_string();
        assert_eq!(encoded, "1700_NOVA%20SEASON%2Fx%2By.png");
        let untouched = utf8_percent_encode("a-b_c.d!e~f*g'h(i)", URI_COMPONENT).to_string();
        assert_eq!(untouched, "a-b_c.d!e~f*g'h(i)");
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let client = HttpPipelineClient::new(reqwest::Client::new(), "http://api/prod/".into());
        assert_eq!(client.endpoint("status"), "http://api/prod/status");
    }

    #[test]
    fn test_chunks_of() {
        let data = Bytes::from(vec![7u8; TRANSFER_CHUNK_SIZE * 2 + 10]);
        let chunks = chunks_of(&data);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), TRANSFER_CHUNK_SIZE);
        assert_eq!(chunks[2].len(), 10);
        assert!(chunks_of(&Bytes::new()).is_empty());
    }
}
