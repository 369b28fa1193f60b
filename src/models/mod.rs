use crate::error::UploadError;
use crate::utils::validation::validate_asset_size;
use anyhow::{Context, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A user-selected image, immutable once constructed.
#[derive(Debug, Clone)]
pub struct Asset {
    bytes: Bytes,
    declared_type: String,
    original_name: String,
    size_bytes: u64,
}

impl Asset {
    pub fn new(
        bytes: impl Into<Bytes>,
        declared_type: impl Into<String>,
        original_name: impl Into<String>,
    ) -> Self {
        let bytes = bytes.into();
        let size_bytes = bytes.len() as u64;
        Self {
            bytes,
            declared_type: declared_type.into(),
            original_name: original_name.into(),
            size_bytes,
        }
    }

    /// Reads a file from disk. The declared type is sniffed from the content,
    /// falling back to the extension, and left empty when neither is
    /// recognised, like a browser `File`.
    ///
    /// Files over the size limit are rejected from their metadata without
    /// being read.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        validate_asset_size(metadata.len())?;

        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let original_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let declared_type = match infer::get(&data) {
            Some(kind) => kind.mime_type().to_string(),
            None => mime_guess::from_path(path)
                .first()
                .map(|m| m.to_string())
                .unwrap_or_default(),
        };

        tracing::debug!(
            "Loaded asset {} ({} bytes, type '{}')",
            original_name,
            data.len(),
            declared_type
        );

        Ok(Self::new(data, declared_type, original_name))
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Content type sent with the upload. An empty declared type (what
    /// browsers report for `.jfif`) is sent as JPEG.
    pub fn content_type(&self) -> String {
        if self.declared_type.trim().is_empty() {
            mime::IMAGE_JPEG.to_string()
        } else {
            self.declared_type.clone()
        }
    }
}

/// Name and content type sent to the backend when negotiating a write target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub sanitized_name: String,
    pub content_type: String,
}

/// A single-use, time-limited write location. Consumed by the transfer.
#[derive(Debug, PartialEq, Eq)]
pub struct TransferTarget {
    pub write_url: String,
    pub storage_key: String,
}

/// Outcome of one status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    Pending,
    Ready { artifact_url: String },
    Error { reason: String },
}

/// The processed output of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub storage_key: String,
    pub url: String,
}

/// Bytes sent so far during a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub sent: u64,
    pub total: u64,
}

impl TransferProgress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.sent.min(self.total) * 100) / self.total) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.sent >= self.total
    }
}

/// Observable events emitted while a submission runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    TransferProgress(TransferProgress),
    PollAttempt { attempt: u32, max_attempts: u32 },
}

/// The coordinator's single source of truth. Each variant carries only
/// the data valid in that state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubmissionState {
    #[default]
    Idle,
    Validating,
    RequestingTarget {
        request: UploadRequest,
    },
    Transferring {
        storage_key: String,
    },
    Polling {
        storage_key: String,
        attempt: u32,
        max_attempts: u32,
    },
    Ready {
        storage_key: String,
        artifact_url: String,
    },
    Failed {
        error: UploadError,
    },
}

impl SubmissionState {
    /// States from which a new submission may start.
    pub fn accepts_submission(&self) -> bool {
        matches!(
            self,
            SubmissionState::Idle | SubmissionState::Ready { .. } | SubmissionState::Failed { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionState::Ready { .. } | SubmissionState::Failed { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            SubmissionState::Idle => "idle",
            SubmissionState::Validating => "validating",
            SubmissionState::RequestingTarget { .. } => "requesting_target",
            SubmissionState::Transferring { .. } => "transferring",
            SubmissionState::Polling { .. } => "polling",
            SubmissionState::Ready { .. } => "ready",
            SubmissionState::Failed { .. } => "failed",
        }
    }
}

impl std::fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionState::Idle => write!(f, "Idle"),
            SubmissionState::Validating => write!(f, "Validating image..."),
            SubmissionState::RequestingTarget { .. } => write!(f, "Requesting upload URL..."),
            SubmissionState::Transferring { .. } => write!(f, "Uploading image..."),
            SubmissionState::Polling {
                attempt,
                max_attempts,
                ..
            } => write!(f, "Processing thumbnail... ({}/{})", attempt, max_attempts),
            SubmissionState::Ready { .. } => write!(f, "Thumbnail ready"),
            SubmissionState::Failed { error } => write!(f, "Error: {}", error),
        }
    }
}

// Wire types for the pipeline HTTP API.

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    pub filename: String,
    pub content_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    pub upload_url: String,
    pub key: String,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl StatusResponse {
    /// Maps the wire status onto a [`PollResult`], rejecting a `ready`
    /// response that carries no download URL.
    pub fn into_poll_result(self) -> Result<PollResult, UploadError> {
        match self.status.to_lowercase().as_str() {
            "ready" => match self.download_url {
                Some(url) if !url.is_empty() => Ok(PollResult::Ready { artifact_url: url }),
                _ => Err(UploadError::Poll(
                    "status is 'ready' but no downloadUrl was returned".to_string(),
                )),
            },
            "pending" | "processing" => Ok(PollResult::Pending),
            "error" | "failed" => Ok(PollResult::Error {
                reason: format!("pipeline reported status '{}'", self.status),
            }),
            other => Err(UploadError::Poll(format!("unexpected status '{}'", other))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadUrlRequest {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrlResponse {
    pub download_url: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}
