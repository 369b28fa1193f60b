pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::config::UploaderConfig;
pub use crate::error::UploadError;
pub use crate::models::{Artifact, Asset, SubmissionState, UploadEvent};
pub use crate::services::coordinator::UploadCoordinator;
pub use crate::services::poller::{Backoff, PollPolicy};
pub use crate::services::transfer::HttpPipelineClient;
