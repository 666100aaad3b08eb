pub mod adapters;
pub mod cache;
pub mod models;
pub mod reconciliation;
pub mod session;
pub mod store;
pub mod trigger;

pub use adapters::{AccountSource, HttpAccountSource};
pub use cache::{CacheTag, CachedAccountReader, QueryCache};
pub use models::{SnapshotField, SubscriptionRecord, SubscriptionSnapshot, UserProfile};
pub use reconciliation::{SubscriptionSyncPoller, SyncOptions, SyncSession, SyncStatus};
pub use session::{PollingSession, SessionState, SyncOutcome};
pub use store::PgAccountSource;
pub use trigger::checkout_reference;
