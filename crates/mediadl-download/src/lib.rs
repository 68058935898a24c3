//! Download engine for mediadl.
//!
//! Implements `DownloadOrchestratorPort` on top of a budgeted byte-range
//! content cache, a FIFO scheduler with bounded parallelism, and an ordered
//! listener bus.
//!
//! # Structure
//!
//! - `cache` - Sparse span storage with LRU eviction and read-through streams
//! - `queue` - FIFO of QUEUED jobs
//! - `manager` - Orchestrator, runner loop, transfer worker, restore pass
//! - `bus` - Listener bus, terminal-state notifier, state mirror
//! - `progress` - Progress updates and throttling
//! - `fetch` - HTTP range fetcher
//! - `context` - Engine wiring

// Dev-dependencies used only by integration tests
#[cfg(test)]
use mediadl_db as _;
#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tokio_test as _;

pub mod bus;
pub mod cache;
pub mod context;
pub mod fetch;
pub mod manager;
pub mod progress;
pub mod queue;

pub use bus::{
    DownloadStateMirror, ListenerBus, MirrorEntry, MirrorSnapshot, SubscriptionId,
    TerminalStateNotifier,
};
pub use cache::{CacheEntryInfo, ContentCache, PinGuard};
pub use context::{OrchestratorContext, OrchestratorDeps};
pub use fetch::HttpFetcher;
pub use manager::{DownloadOrchestrator, RestoreSummary};
pub use progress::{ProgressThrottle, ProgressUpdate};
