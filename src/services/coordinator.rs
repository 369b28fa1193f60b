use crate::error::UploadError;
use crate::models::{Artifact, Asset, SubmissionState, UploadEvent, UploadRequest};
use crate::services::poller::{PollPolicy, Sleeper, StatusPoller, StatusSource};
use crate::services::transfer::{ProgressFn, TransferClient};
use crate::utils::naming::{Clock, SystemClock, storage_name};
use crate::utils::validation::validate_asset;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

/// Drives one submission at a time through
/// `Idle → Validating → RequestingTarget → Transferring → Polling → Ready`,
/// short-circuiting into `Failed` on the first error.
///
/// The coordinator is shared behind an `Arc`: one task runs [`submit`],
/// another may call [`reset`] to abandon it. Reset cancels the in-flight
/// network call and bumps a generation counter so that a result arriving
/// for an abandoned submission never reaches the observable state.
///
/// [`submit`]: UploadCoordinator::submit
/// [`reset`]: UploadCoordinator::reset
pub struct UploadCoordinator {
    transfer: Arc<dyn TransferClient>,
    poller: StatusPoller,
    clock: Arc<dyn Clock>,
    state: watch::Sender<SubmissionState>,
    events: broadcast::Sender<UploadEvent>,
    generation: AtomicU64,
    // Held while starting or resetting a submission
    cancel: Mutex<CancellationToken>,
}

enum Admission {
    Started(Asset),
    Busy,
    Missing(UploadError),
}

impl UploadCoordinator {
    /// Coordinator over a client that serves both transfers and status checks.
    pub fn new<C>(client: Arc<C>, policy: PollPolicy) -> Self
    where
        C: TransferClient + StatusSource + 'static,
    {
        let poller = StatusPoller::new(client.clone(), policy);
        Self::from_parts(client, poller)
    }

    pub fn from_parts(transfer: Arc<dyn TransferClient>, poller: StatusPoller) -> Self {
        let (state, _) = watch::channel(SubmissionState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transfer,
            poller,
            clock: Arc::new(SystemClock),
            state,
            events,
            generation: AtomicU64::new(0),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.poller = self.poller.with_sleeper(sleeper);
        self
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SubmissionState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SubmissionState> {
        self.state.subscribe()
    }

    /// Transfer progress and poll attempts. Nothing is buffered for
    /// subscribers that join late.
    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    /// Runs a full submission and returns the artifact once ready.
    ///
    /// Fails with [`UploadError::Busy`] while another submission is active,
    /// leaving that submission untouched, and with [`UploadError::Cancelled`]
    /// when [`reset`](Self::reset) abandoned this one.
    pub async fn submit(&self, asset: Option<Asset>, title: &str) -> Result<Artifact, UploadError> {
        let (asset, generation, cancel) = {
            let mut current = self.cancel.lock().await;

            let mut asset = asset;
            let mut admission = Admission::Busy;
            self.state.send_if_modified(|state| {
                if !state.accepts_submission() {
                    return false;
                }
                admission = match (asset.take(), title.trim().is_empty()) {
                    (Some(asset), false) => {
                        *state = SubmissionState::Validating;
                        Admission::Started(asset)
                    }
                    (asset, _) => {
                        let reason = match asset {
                            None => "select an image first",
                            Some(_) => "enter a title for the thumbnail",
                        };
                        let error = UploadError::MissingInput(reason.to_string());
                        *state = SubmissionState::Failed {
                            error: error.clone(),
                        };
                        Admission::Missing(error)
                    }
                };
                true
            });

            let asset = match admission {
                Admission::Busy => return Err(UploadError::Busy),
                Admission::Missing(error) => return Err(error),
                Admission::Started(asset) => asset,
            };

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *current = CancellationToken::new();
            (asset, generation, current.clone())
        };

        let span = info_span!("submission", id = %Uuid::new_v4(), generation);
        let outcome = self
            .run(asset, title, generation, &cancel)
            .instrument(span)
            .await;

        match outcome {
            Ok(artifact) => {
                let ready = SubmissionState::Ready {
                    storage_key: artifact.storage_key.clone(),
                    artifact_url: artifact.url.clone(),
                };
                if self.transition(generation, ready) {
                    info!("🎉 Thumbnail ready: {}", artifact.url);
                    Ok(artifact)
                } else {
                    Err(UploadError::Cancelled)
                }
            }
            Err(error) => {
                let failed = SubmissionState::Failed {
                    error: error.clone(),
                };
                if self.transition(generation, failed) {
                    error!("❌ Submission failed [{}]: {}", error.code(), error);
                    Err(error)
                } else {
                    Err(UploadError::Cancelled)
                }
            }
        }
    }

    /// Returns the coordinator to `Idle`, cancelling whatever is in flight.
    pub async fn reset(&self) {
        let current = self.cancel.lock().await;
        current.cancel();
        self.generation.fetch_add(1, Ordering::SeqCst);
        let previous = self.state.send_replace(SubmissionState::Idle);
        info!("🔄 Reset from {}", previous.name());
    }

    async fn run(
        &self,
        asset: Asset,
        title: &str,
        generation: u64,
        cancel: &CancellationToken,
    ) -> Result<Artifact, UploadError> {
        validate_asset(&asset)?;

        let request = UploadRequest {
            sanitized_name: storage_name(self.clock.epoch_millis(), title, asset.original_name()),
            content_type: asset.content_type(),
        };
        info!(
            "🖼️  Submitting {} as {} ({} bytes)",
            asset.original_name(),
            request.sanitized_name,
            asset.size_bytes()
        );

        self.advance(
            generation,
            SubmissionState::RequestingTarget {
                request: request.clone(),
            },
        )?;
        let target = cancellable(cancel, self.transfer.request_target(&request)).await?;
        let storage_key = target.storage_key.clone();

        self.advance(
            generation,
            SubmissionState::Transferring {
                storage_key: storage_key.clone(),
            },
        )?;
        let events = self.events.clone();
        let progress: ProgressFn = Arc::new(move |p| {
            let _ = events.send(UploadEvent::TransferProgress(p));
        });
        cancellable(
            cancel,
            self.transfer.transfer_bytes(&asset, target, Some(progress)),
        )
        .await?;

        let max_attempts = self.poller.policy().max_attempts;
        self.advance(
            generation,
            SubmissionState::Polling {
                storage_key: storage_key.clone(),
                attempt: 0,
                max_attempts,
            },
        )?;
        let on_pending = |attempt: u32| {
            self.transition(
                generation,
                SubmissionState::Polling {
                    storage_key: storage_key.clone(),
                    attempt,
                    max_attempts,
                },
            );
            let _ = self.events.send(UploadEvent::PollAttempt {
                attempt,
                max_attempts,
            });
        };
        let url = self
            .poller
            .await_ready(&storage_key, cancel, &on_pending)
            .await?;

        Ok(Artifact { storage_key, url })
    }

    /// Replaces the state only if `generation` is still the live submission.
    fn transition(&self, generation: u64, next: SubmissionState) -> bool {
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *state = next;
            true
        })
    }

    fn advance(&self, generation: u64, next: SubmissionState) -> Result<(), UploadError> {
        if self.transition(generation, next) {
            Ok(())
        } else {
            Err(UploadError::Cancelled)
        }
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T, UploadError>>,
) -> Result<T, UploadError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(UploadError::Cancelled),
        result = operation => result,
    }
}
