//! Resumable per-channel sync orchestration (C9): persists per-channel
//! state under the store's exclusive scope, prefers the cheap
//! incremental feed, and escalates to a full listing fallback on a
//! detected gap or feed failure.

#![warn(missing_docs)]

mod orchestrator;
mod state;
mod store;

pub use orchestrator::{Fallback, SyncOrchestrator, SyncResult};
pub use state::{Status, Strategy, SyncState};
pub use store::{FileLock, FileSyncStateStore, SyncStateStore, DEFAULT_LOCK_TIMEOUT};
