use crate::error::UploadError;
use crate::models::PollResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Queries the processing status of an uploaded object
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, storage_key: &str) -> Result<PollResult, UploadError>;
}

/// Suspends the poller between attempts. Swappable so tests can run on a
/// virtual clock.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential { factor: u32, max_interval: Duration },
}

/// Attempt and wait budget for a poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum status checks (default: 30)
    pub max_attempts: u32,
    /// Base delay between checks (default: 2 s)
    pub interval: Duration,
    pub backoff: Backoff,
    /// Optional cap on the total time spent waiting between checks
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_millis(2000),
            backoff: Backoff::Fixed,
            max_wait: None,
        }
    }
}

impl PollPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            backoff: Backoff::Fixed,
            max_wait: None,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Delay to wait after the given 1-based attempt came back pending
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential {
                factor,
                max_interval,
            } => {
                let multiplier = factor.saturating_pow(attempt.saturating_sub(1));
                self.interval
                    .checked_mul(multiplier)
                    .unwrap_or(max_interval)
                    .min(max_interval)
            }
        }
    }
}

/// Polls a [`StatusSource`] until the artifact is ready or the policy's
/// budget runs out.
pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    sleeper: Arc<dyn Sleeper>,
    policy: PollPolicy,
}

impl StatusPoller {
    pub fn new(source: Arc<dyn StatusSource>, policy: PollPolicy) -> Self {
        Self {
            source,
            sleeper: Arc::new(TokioSleeper),
            policy,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Returns the artifact URL from the first `Ready` response.
    ///
    /// `on_pending` is invoked with the 1-based attempt index every time the
    /// status comes back pending. An error state or a failed query aborts
    /// immediately with [`UploadError::Poll`]; running out of attempts (or of
    /// `max_wait`) yields [`UploadError::PollTimeout`]. No wait follows the
    /// final attempt.
    pub async fn await_ready(
        &self,
        storage_key: &str,
        cancel: &CancellationToken,
        on_pending: &(dyn Fn(u32) + Send + Sync),
    ) -> Result<String, UploadError> {
        let max_attempts = self.policy.max_attempts;
        let mut waited = Duration::ZERO;

        for attempt in 1..=max_attempts {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                result = self.source.fetch_status(storage_key) => result?,
            };

            match result {
                PollResult::Ready { artifact_url } => {
                    info!("✅ {} ready after {} attempt(s)", storage_key, attempt);
                    return Ok(artifact_url);
                }
                PollResult::Error { reason } => {
                    warn!("Pipeline failed for {}: {}", storage_key, reason);
                    return Err(UploadError::Poll(reason));
                }
                PollResult::Pending => {
                    debug!(
                        "{} still processing ({}/{})",
                        storage_key, attempt, max_attempts
                    );
                    on_pending(attempt);

                    if attempt == max_attempts {
                        break;
                    }

                    let delay = self.policy.delay_after(attempt);
                    if let Some(max_wait) = self.policy.max_wait {
                        if waited + delay > max_wait {
                            warn!(
                                "Wait budget of {:?} exhausted for {} after {} attempt(s)",
                                max_wait, storage_key, attempt
                            );
                            return Err(UploadError::PollTimeout { attempts: attempt });
                        }
                    }

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                        _ = self.sleeper.sleep(delay) => {}
                    }
                    waited += delay;
                }
            }
        }

        warn!(
            "Gave up on {} after {} attempt(s)",
            storage_key, max_attempts
        );
        Err(UploadError::PollTimeout {
            attempts: max_attempts,
        })
    }
}

/// Sleeper that returns immediately and records every requested delay
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSleeper {
    pub delays: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays scripted results, then keeps answering pending
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<PollResult, UploadError>>>,
        calls: AtomicU32,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<PollResult, UploadError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn fetch_status(&self, _storage_key: &str) -> Result<PollResult, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(PollResult::Pending))
        }
    }

    fn ready(url: &str) -> Result<PollResult, UploadError> {
        Ok(PollResult::Ready {
            artifact_url: url.to_string(),
        })
    }

    #[tokio::test]
    async fn test_stops_on_first_ready() {
        let source = ScriptedSource::new(vec![Ok(PollResult::Pending), ready("https://out/x.png")]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let poller =
            StatusPoller::new(source.clone(), PollPolicy::default()).with_sleeper(sleeper.clone());

        let pending = Mutex::new(Vec::new());
        let url = poller
            .await_ready("k", &CancellationToken::new(), &|n| {
                pending.lock().unwrap().push(n)
            })
            .await
            .unwrap();

        assert_eq!(url, "https://out/x.png");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(*pending.lock().unwrap(), vec![1]);
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![Duration::from_millis(2000)]
        );
    }

    #[tokio::test]
    async fn test_times_out_after_max_attempts() {
        let source = ScriptedSource::new(vec![]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let poller =
            StatusPoller::new(source.clone(), PollPolicy::default()).with_sleeper(sleeper.clone());

        let err = poller
            .await_ready("k", &CancellationToken::new(), &|_| {})
            .await
            .unwrap_err();

        assert_eq!(err, UploadError::PollTimeout { attempts: 30 });
        assert_eq!(source.calls.load(Ordering::SeqCst), 30);
        let delays = sleeper.delays.lock().unwrap();
        assert_eq!(delays.len(), 29);
        assert!(delays.iter().all(|d| *d == Duration::from_millis(2000)));
    }

    #[tokio::test]
    async fn test_error_response_is_fatal() {
        let source = ScriptedSource::new(vec![
            Ok(PollResult::Pending),
            Err(UploadError::Poll("status endpoint responded with 500".into())),
        ]);
        let poller = StatusPoller::new(source.clone(), PollPolicy::default())
            .with_sleeper(Arc::new(RecordingSleeper::default()));

        let err = poller
            .await_ready("k", &CancellationToken::new(), &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Poll(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        let source = ScriptedSource::new(vec![Ok(PollResult::Error {
            reason: "pipeline reported status 'failed'".into(),
        })]);
        let poller = StatusPoller::new(source.clone(), PollPolicy::default())
            .with_sleeper(Arc::new(RecordingSleeper::default()));
        let err = poller
            .await_ready("k", &CancellationToken::new(), &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Poll(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exponential_backoff_is_capped() {
        let policy = PollPolicy::fixed(6, Duration::from_millis(100)).with_backoff(
            Backoff::Exponential {
                factor: 2,
                max_interval: Duration::from_millis(500),
            },
        );
        let sleeper = Arc::new(RecordingSleeper::default());
        let poller =
            StatusPoller::new(ScriptedSource::new(vec![]), policy).with_sleeper(sleeper.clone());

        let _ = poller
            .await_ready("k", &CancellationToken::new(), &|_| {})
            .await;

        let millis: Vec<u128> = sleeper
            .delays
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(millis, vec![100, 200, 400, 500, 500]);
    }

    #[tokio::test]
    async fn test_max_wait_budget() {
        let policy = PollPolicy::fixed(100, Duration::from_secs(2))
            .with_max_wait(Duration::from_secs(5));
        let source = ScriptedSource::new(vec![]);
        let poller = StatusPoller::new(source.clone(), policy)
            .with_sleeper(Arc::new(RecordingSleeper::default()));

        let err = poller
            .await_ready("k", &CancellationToken::new(), &|_| {})
            .await
            .unwrap_err();
        // waits of 2s + 2s fit, the third would exceed 5s
        assert_eq!(err, UploadError::PollTimeout { attempts: 3 });
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_wait() {
        let cancel = CancellationToken::new();
        let poller = StatusPoller::new(ScriptedSource::new(vec![]), PollPolicy::default());

        let trigger = cancel.clone();
        let err = poller
            .await_ready("k", &cancel, &move |_| trigger.cancel())
            .await
            .unwrap_err();
        assert_eq!(err, UploadError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_spacing() {
        let source = ScriptedSource::new(vec![]);
        let poller = StatusPoller::new(source.clone(), PollPolicy::default());

        let started = tokio::time::Instant::now();
        let err = poller
            .await_ready("k", &CancellationToken::new(), &|_| {})
            .await
            .unwrap_err();

        assert_eq!(err, UploadError::PollTimeout { attempts: 30 });
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(58));
        assert!(elapsed < Duration::from_secs(59));
    }
}
