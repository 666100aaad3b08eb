use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// key: sync-profile-model -> current user read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub stripe_subscription_id: Option<String>,
}

/// key: sync-subscription-model -> current subscription read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub current_period_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancel_at_period_end: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotField {
    Role,
    SubscriptionId,
    Status,
    PlanId,
}

impl SnapshotField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotField::Role => "role",
            SnapshotField::SubscriptionId => "subscription_id",
            SnapshotField::Status => "status",
            SnapshotField::PlanId => "plan_id",
        }
    }
}

/// Point-in-time capture of the billing fields a portal visit can change.
///
/// Fields are private; a snapshot is replaced, never edited. `captured_at`
/// is informational and does not take part in change detection.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionSnapshot {
    role: Option<String>,
    subscription_id: Option<String>,
    status: Option<String>,
    plan_id: Option<String>,
    captured_at: DateTime<Utc>,
}

impl SubscriptionSnapshot {
    pub fn new(
        role: Option<String>,
        subscription_id: Option<String>,
        status: Option<String>,
        plan_id: Option<String>,
    ) -> Self {
        Self {
            role,
            subscription_id,
            status,
            plan_id,
            captured_at: Utc::now(),
        }
    }

    /// The subscription id comes from the profile, not the subscription read.
    pub fn capture(profile: &UserProfile, subscription: &SubscriptionRecord) -> Self {
        Self::new(
            profile.role.clone(),
            profile.stripe_subscription_id.clone(),
            subscription.status.clone(),
            subscription.plan_id.clone(),
        )
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription_id.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn plan_id(&self) -> Option<&str> {
        self.plan_id.as_deref()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn changed_fields(&self, other: &SubscriptionSnapshot) -> Vec<SnapshotField> {
        let mut changed = Vec::new();
        if self.role != other.role {
            changed.push(SnapshotField::Role);
        }
        if self.subscription_id != other.subscription_id {
            changed.push(SnapshotField::SubscriptionId);
        }
        if self.status != other.status {
            changed.push(SnapshotField::Status);
        }
        if self.plan_id != other.plan_id {
            changed.push(SnapshotField::PlanId);
        }
        changed
    }

    pub fn differs_from(&self, other: &SubscriptionSnapshot) -> bool {
        !self.changed_fields(other).is_empty()
    }
}

impl PartialEq for SubscriptionSnapshot {
    fn eq(&self, other: &Self) -> bool {
        !self.differs_from(other)
    }
}

impl Eq for SubscriptionSnapshot {}
