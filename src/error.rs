use thiserror::Error;

/// Failure taxonomy for a submission.
///
/// Every variant owns plain data so the error can be cloned into
/// [`SubmissionState::Failed`](crate::models::SubmissionState::Failed).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Invalid file type: {0}")]
    InvalidType(String),

    #[error("File size {size} bytes exceeds maximum allowed {max} bytes ({} MB)", .max / 1024 / 1024)]
    TooLarge { size: u64, max: u64 },

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Failed to obtain upload URL: {0}")]
    Negotiation(String),

    #[error("Failed to upload file: {0}")]
    Transfer(String),

    #[error("Failed to check thumbnail status: {0}")]
    Poll(String),

    #[error("Timed out waiting for processing after {attempts} attempts")]
    PollTimeout { attempts: u32 },

    #[error("A submission is already in progress")]
    Busy,

    #[error("Submission cancelled")]
    Cancelled,
}

impl UploadError {
    /// Stable machine-readable code, suitable for UI lookup tables.
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::InvalidType(_) => "INVALID_TYPE",
            UploadError::TooLarge { .. } => "TOO_LARGE",
            UploadError::MissingInput(_) => "MISSING_INPUT",
            UploadError::Negotiation(_) => "NEGOTIATION_ERROR",
            UploadError::Transfer(_) => "TRANSFER_ERROR",
            UploadError::Poll(_) => "POLL_ERROR",
            UploadError::PollTimeout { .. } => "POLL_TIMEOUT",
            UploadError::Busy => "BUSY",
            UploadError::Cancelled => "CANCELLED",
        }
    }

    /// True for failures detected before any network call.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            UploadError::InvalidType(_) | UploadError::TooLarge { .. } | UploadError::MissingInput(_)
        )
    }
}
