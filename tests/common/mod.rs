#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use thumbnail_uploader::UploadError;
use thumbnail_uploader::models::{Asset, PollResult, TransferProgress, TransferTarget, UploadRequest};
use thumbnail_uploader::services::poller::{Sleeper, StatusSource};
use thumbnail_uploader::services::transfer::{ProgressFn, TransferClient};

/// Simulated clock: sleeping advances virtual time instantly.
#[derive(Default)]
pub struct VirtualClock {
    now_ms: AtomicU64,
    sleeps: Mutex<Vec<Duration>>,
}

impl VirtualClock {
    pub fn now(&self) -> Duration {
        Duration::from_millis(self.now_ms.load(Ordering::SeqCst))
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for VirtualClock {
    async fn sleep(&self, duration: Duration) {
        self.now_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// In-memory pipeline with scripted responses and call accounting.
pub struct ScriptedPipeline {
    pub clock: std::sync::Arc<VirtualClock>,
    pub negotiation: Result<(), UploadError>,
    pub transfer: Result<(), UploadError>,
    pub statuses: Mutex<VecDeque<Result<PollResult, UploadError>>>,
    pub requests: Mutex<Vec<UploadRequest>>,
    pub transfers: AtomicU32,
    pub status_calls: Mutex<Vec<Duration>>,
}

impl ScriptedPipeline {
    pub fn new(clock: std::sync::Arc<VirtualClock>) -> Self {
        Self {
            clock,
            negotiation: Ok(()),
            transfer: Ok(()),
            statuses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            transfers: AtomicU32::new(0),
            status_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_statuses(self, statuses: Vec<Result<PollResult, UploadError>>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn transfer_count(&self) -> u32 {
        self.transfers.load(Ordering::SeqCst)
    }

    pub fn status_count(&self) -> usize {
        self.status_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TransferClient for ScriptedPipeline {
    async fn request_target(&self, request: &UploadRequest) -> Result<TransferTarget, UploadError> {
        self.requests.lock().unwrap().push(request.clone());
        self.negotiation.clone()?;
        Ok(TransferTarget {
            write_url: format!("https://bucket.example/{}", request.sanitized_name),
            storage_key: request.sanitized_name.clone(),
        })
    }

    async fn transfer_bytes(
        &self,
        asset: &Asset,
        _target: TransferTarget,
        progress: Option<ProgressFn>,
    ) -> Result<(), UploadError> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        self.transfer.clone()?;
        if let Some(report) = progress {
            report(TransferProgress {
                sent: asset.size_bytes(),
                total: asset.size_bytes(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StatusSource for ScriptedPipeline {
    async fn fetch_status(&self, _storage_key: &str) -> Result<PollResult, UploadError> {
        self.status_calls.lock().unwrap().push(self.clock.now());
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(PollResult::Pending))
    }
}

pub fn png_asset(size: usize) -> Asset {
    let mut data = vec![0u8; size];
    data[..8].copy_from_slice(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
    Asset::new(data, "image/png", "cover.png")
}
