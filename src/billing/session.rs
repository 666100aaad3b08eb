use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::models::{SnapshotField, SubscriptionSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Polling,
    Completed,
}

/// How a session ended. Exactly one of these is produced per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncOutcome {
    Changed {
        previous: SubscriptionSnapshot,
        current: SubscriptionSnapshot,
        changed: Vec<SnapshotField>,
        attempts: u32,
    },
    TimedOut {
        attempts: u32,
    },
}

impl SyncOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            SyncOutcome::Changed { attempts, .. } | SyncOutcome::TimedOut { attempts } => *attempts,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, SyncOutcome::Changed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptDecision {
    /// The session already finished; nothing to schedule.
    Finished,
    Exhausted(SyncOutcome),
    Proceed { attempt: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Baseline,
    Unchanged,
    Completed(SyncOutcome),
    /// Late result for a session that is no longer polling.
    Ignored,
}

/// key: sync-session -> per-session reconciliation state
#[derive(Debug, Clone)]
pub struct PollingSession {
    id: Uuid,
    state: SessionState,
    max_attempts: u32,
    attempt_count: u32,
    initial_snapshot: Option<SubscriptionSnapshot>,
    last_known_snapshot: Option<SubscriptionSnapshot>,
    outcome: Option<SyncOutcome>,
    started_at: Option<DateTime<Utc>>,
}

impl PollingSession {
    pub fn idle(max_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            max_attempts,
            attempt_count: 0,
            initial_snapshot: None,
            last_known_snapshot: None,
            outcome: None,
            started_at: None,
        }
    }

    pub fn start(max_attempts: u32) -> Self {
        let mut session = Self::idle(max_attempts);
        session.state = SessionState::Polling;
        session.started_at = Some(Utc::now());
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_polling(&self) -> bool {
        self.state == SessionState::Polling
    }

    pub fn is_completed(&self) -> bool {
        self.state == SessionState::Completed
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn initial_snapshot(&self) -> Option<&SubscriptionSnapshot> {
        self.initial_snapshot.as_ref()
    }

    pub fn last_known_snapshot(&self) -> Option<&SubscriptionSnapshot> {
        self.last_known_snapshot.as_ref()
    }

    pub fn outcome(&self) -> Option<&SyncOutcome> {
        self.outcome.as_ref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Claims the next attempt. Once `max_attempts` reads have been made the
    /// following claim times the session out instead; `attempt_count` keeps
    /// counting reads, so it never exceeds `max_attempts`.
    pub fn begin_attempt(&mut self) -> AttemptDecision {
        if self.state != SessionState::Polling {
            return AttemptDecision::Finished;
        }
        if self.attempt_count >= self.max_attempts {
            return AttemptDecision::Exhausted(self.time_out());
        }
        self.attempt_count += 1;
        AttemptDecision::Proceed {
            attempt: self.attempt_count,
        }
    }

    /// Records the snapshot captured by the current attempt.
    pub fn observe(&mut self, snapshot: SubscriptionSnapshot) -> CycleOutcome {
        if self.state != SessionState::Polling {
            return CycleOutcome::Ignored;
        }

        let Some(previous) = self.last_known_snapshot.take() else {
            self.initial_snapshot = Some(snapshot.clone());
            self.last_known_snapshot = Some(snapshot);
            return CycleOutcome::Baseline;
        };

        let changed = previous.changed_fields(&snapshot);
        self.last_known_snapshot = Some(snapshot.clone());
        if changed.is_empty() {
            return CycleOutcome::Unchanged;
        }

        let outcome = SyncOutcome::Changed {
            previous,
            current: snapshot,
            changed,
            attempts: self.attempt_count,
        };
        self.complete(outcome.clone());
        CycleOutcome::Completed(outcome)
    }

    /// Records an attempt whose refresh failed. The attempt still counts.
    pub fn record_failure(&mut self) -> CycleOutcome {
        if self.state != SessionState::Polling {
            return CycleOutcome::Ignored;
        }
        CycleOutcome::Unchanged
    }

    fn time_out(&mut self) -> SyncOutcome {
        let outcome = SyncOutcome::TimedOut {
            attempts: self.attempt_count,
        };
        self.complete(outcome.clone());
        outcome
    }

    fn complete(&mut self, outcome: SyncOutcome) {
        self.state = SessionState::Completed;
        self.outcome = Some(outcome);
    }
}
