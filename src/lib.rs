pub mod billing;
pub mod config;
pub mod error;

pub use error::{SyncError, SyncResult};
