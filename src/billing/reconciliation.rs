use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::adapters::AccountSource;
use super::cache::CachedAccountReader;
use super::models::SubscriptionSnapshot;
use super::session::{
    AttemptDecision, CycleOutcome, PollingSession, SessionState, SyncOutcome,
};
use super::trigger::checkout_reference;
use crate::config;
use crate::error::{SyncError, SyncResult};

/// key: sync-options -> caller supplied session settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub enabled: bool,
    pub max_attempts: u32,
    pub polling_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: config::DEFAULT_MAX_ATTEMPTS,
            polling_interval: Duration::from_millis(config::DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl SyncOptions {
    pub fn from_env() -> Self {
        Self {
            enabled: true,
            max_attempts: *config::SYNC_MAX_ATTEMPTS,
            polling_interval: config::poll_interval(),
        }
    }

    /// Enabled only when the user came back from the billing provider.
    pub fn from_return_url(return_url: &str) -> Self {
        Self::from_env().with_enabled(checkout_reference(return_url).is_some())
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.polling_interval.is_zero() {
            return Err(SyncError::InvalidConfig(
                "polling_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Polling { session: Uuid, attempt: u32 },
    Completed { session: Uuid, outcome: SyncOutcome },
    Stopped { session: Uuid },
}

/// Observer for one session. Cheap to create; several may watch the same session.
#[derive(Debug, Clone)]
pub struct SyncSession {
    id: Option<Uuid>,
    status: watch::Receiver<SyncStatus>,
    result: Option<watch::Receiver<Option<SyncOutcome>>>,
}

impl SyncSession {
    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Resolves once the session ends. `None` means it was stopped or disabled
    /// before finishing, or never started. A finished session keeps its
    /// outcome even after the poller is reset or starts another session.
    pub async fn outcome(self) -> Option<SyncOutcome> {
        let mut result = self.result?;
        loop {
            if let Some(outcome) = result.borrow_and_update().clone() {
                return Some(outcome);
            }
            if result.changed().await.is_err() {
                return result.borrow().clone();
            }
        }
    }
}

struct PollerState {
    enabled: bool,
    epoch: u64,
    session: PollingSession,
    stop: Option<watch::Sender<bool>>,
    result: Option<watch::Sender<Option<SyncOutcome>>>,
}

struct Inner<S> {
    reader: Arc<CachedAccountReader<S>>,
    state: Mutex<PollerState>,
    status: watch::Sender<SyncStatus>,
}

/// key: subscription-sync-poller -> bounded reconciliation after a billing portal visit
///
/// Runs at most one background task. Each cycle refreshes the account reads,
/// captures a snapshot and compares it with the previous one; the task ends on
/// the first change, when the attempt budget is spent, or when stopped.
pub struct SubscriptionSyncPoller<S> {
    inner: Arc<Inner<S>>,
}

impl<S: AccountSource + 'static> SubscriptionSyncPoller<S> {
    pub fn new(reader: Arc<CachedAccountReader<S>>) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        Self {
            inner: Arc::new(Inner {
                reader,
                state: Mutex::new(PollerState {
                    enabled: false,
                    epoch: 0,
                    session: PollingSession::idle(config::DEFAULT_MAX_ATTEMPTS),
                    stop: None,
                    result: None,
                }),
                status,
            }),
        }
    }

    /// Starts a session, or returns the current one if it is already running.
    ///
    /// Passing `enabled = false` resets all session state.
    pub fn start(&self, options: SyncOptions) -> SyncResult<SyncSession> {
        options.validate()?;

        let mut state = self.inner.lock_state();
        if !options.enabled {
            self.inner.reset_locked(&mut state, options.max_attempts);
            return Ok(self.inner.observer(&state, None));
        }

        if state.enabled && state.session.state() != SessionState::Idle {
            let id = state.session.id();
            return Ok(self.inner.observer(&state, Some(id)));
        }

        state.enabled = true;
        state.epoch += 1;
        state.session = PollingSession::start(options.max_attempts);
        let session_id = state.session.id();
        let (stop_tx, stop_rx) = watch::channel(false);
        state.stop = Some(stop_tx);
        state.result = Some(watch::channel(None).0);
        self.inner.status.send_replace(SyncStatus::Polling {
            session: session_id,
            attempt: 0,
        });

        info!(
            session = %session_id,
            max_attempts = options.max_attempts,
            interval_ms = options.polling_interval.as_millis() as u64,
            "subscription sync started"
        );

        let inner = self.inner.clone();
        let epoch = state.epoch;
        tokio::spawn(run_session(inner, epoch, options.polling_interval, stop_rx));

        Ok(self.inner.observer(&state, Some(session_id)))
    }

    /// Cancels any scheduled attempt. Safe to call at any time.
    pub fn stop(&self) {
        let mut state = self.inner.lock_state();
        self.inner.stop_locked(&mut state);
    }

    /// Mirrors the enabling condition. Turning it off wipes the session so the
    /// next enable starts clean.
    pub fn set_enabled(&self, enabled: bool, options: SyncOptions) -> SyncResult<SyncSession> {
        self.start(options.with_enabled(enabled))
    }

    /// Invalidates cached user reads and re-fetches profile and subscription.
    /// Failures are logged and reported as `false`.
    pub async fn force_refresh(&self) -> bool {
        self.inner.refresh_snapshot().await.is_some()
    }

    pub fn is_polling(&self) -> bool {
        let state = self.inner.lock_state();
        state.enabled && state.session.is_polling()
    }

    pub fn attempt_count(&self) -> u32 {
        self.inner.lock_state().session.attempt_count()
    }

    pub fn session(&self) -> PollingSession {
        self.inner.lock_state().session.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }
}

impl<S> Drop for SubscriptionSyncPoller<S> {
    fn drop(&mut self) {
        let mut state = self.inner.lock_state();
        self.inner.stop_locked(&mut state);
    }
}

impl<S> Inner<S> {
    fn lock_state(&self) -> MutexGuard<'_, PollerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn observer(&self, state: &PollerState, id: Option<Uuid>) -> SyncSession {
        SyncSession {
            id,
            status: self.status.subscribe(),
            result: id.and(state.result.as_ref()).map(|tx| tx.subscribe()),
        }
    }

    fn stop_locked(&self, state: &mut PollerState) {
        state.enabled = false;
        state.epoch += 1;
        if let Some(stop) = state.stop.take() {
            let _ = stop.send(true);
        }
        // dropping the sender resolves pending observers; a published outcome stays readable
        state.result = None;
        if state.session.is_polling() {
            debug!(
                session = %state.session.id(),
                attempt = state.session.attempt_count(),
                "subscription sync stopped"
            );
            self.status.send_replace(SyncStatus::Stopped {
                session: state.session.id(),
            });
        }
    }

    fn reset_locked(&self, state: &mut PollerState, max_attempts: u32) {
        self.stop_locked(state);
        state.session = PollingSession::idle(max_attempts);
        self.status.send_replace(SyncStatus::Idle);
    }

    fn finish_locked(&self, state: &mut PollerState, outcome: SyncOutcome) {
        state.stop = None;
        let session = state.session.id();
        match &outcome {
            SyncOutcome::Changed {
                changed, attempts, ..
            } => info!(
                %session,
                attempts,
                changed = ?changed.iter().map(|field| field.as_str()).collect::<Vec<_>>(),
                "subscription change detected"
            ),
            SyncOutcome::TimedOut { attempts } => warn!(
                %session,
                attempts,
                "subscription sync timed out without observing a change"
            ),
        }
        if let Some(result) = &state.result {
            result.send_replace(Some(outcome.clone()));
        }
        self.status
            .send_replace(SyncStatus::Completed { session, outcome });
    }
}

impl<S: AccountSource> Inner<S> {
    async fn refresh_snapshot(&self) -> Option<SubscriptionSnapshot> {
        match self.reader.refreshed_snapshot().await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                let transient = err
                    .downcast_ref::<SyncError>()
                    .map(SyncError::is_transient)
                    .unwrap_or(true);
                warn!(?err, transient, "account refresh failed; retrying next cycle");
                None
            }
        }
    }

    /// Runs one reconciliation cycle. Returns whether the session keeps polling.
    async fn run_cycle(&self, epoch: u64) -> bool {
        let (session, attempt) = {
            let mut state = self.lock_state();
            if state.epoch != epoch {
                return false;
            }
            match state.session.begin_attempt() {
                AttemptDecision::Finished => return false,
                AttemptDecision::Exhausted(outcome) => {
                    self.finish_locked(&mut state, outcome);
                    return false;
                }
                AttemptDecision::Proceed { attempt } => {
                    let session = state.session.id();
                    self.status
                        .send_replace(SyncStatus::Polling { session, attempt });
                    (session, attempt)
                }
            }
        };

        let snapshot = self.refresh_snapshot().await;

        let mut state = self.lock_state();
        if state.epoch != epoch {
            debug!(%session, attempt, "discarding refresh result for cancelled session");
            return false;
        }
        let cycle = match snapshot {
            Some(snapshot) => state.session.observe(snapshot),
            None => state.session.record_failure(),
        };
        match cycle {
            CycleOutcome::Baseline => {
                debug!(%session, attempt, "captured baseline subscription snapshot");
                true
            }
            CycleOutcome::Unchanged => {
                debug!(%session, attempt, "no subscription change yet");
                true
            }
            CycleOutcome::Completed(outcome) => {
                self.finish_locked(&mut state, outcome);
                false
            }
            CycleOutcome::Ignored => false,
        }
    }
}

async fn run_session<S: AccountSource>(
    inner: Arc<Inner<S>>,
    epoch: u64,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    // a slow cycle pushes the next tick back instead of firing a burst
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }
        if !inner.run_cycle(epoch).await {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_documented_defaults() {
        let options = SyncOptions::default();
        assert!(options.enabled);
        assert_eq!(options.max_attempts, 10);
        assert_eq!(options.polling_interval, Duration::from_millis(2000));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn invalid_options_fail_fast() {
        let zero_attempts = SyncOptions::default().with_max_attempts(0);
        assert!(matches!(
            zero_attempts.validate(),
            Err(SyncError::InvalidConfig(_))
        ));

        let zero_interval = SyncOptions::default().with_polling_interval(Duration::ZERO);
        assert!(matches!(
            zero_interval.validate(),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn return_url_controls_enablement() {
        assert!(SyncOptions::from_return_url("/billing?session_id=cs_1").enabled);
        assert!(!SyncOptions::from_return_url("/billing").enabled);
    }
}
