//! Job domain types, events, errors, and request DTOs.
//!
//! Pure data types for the download engine. No I/O, networking, or runtime
//! dependencies allowed.
//!
//! # Structure
//!
//! - `types` - Job record, state machine, stop/failure reasons, cache keys
//! - `events` - Bus events (`JobEvent`, `JobChanged`, `DeliveredEvent`)
//! - `errors` - Error taxonomy for engine operations
//! - `request` - Add-download request and snapshot DTOs

pub mod errors;
pub mod events;
pub mod request;
pub mod types;

pub use errors::{DownloadError, DownloadResult};
pub use events::{DeliveredEvent, JobChanged, JobEvent};
pub use request::{DownloadRequest, DownloadsSnapshot, JobSummary};
pub use types::{CacheKey, FailureReason, JobRecord, JobState, StopReason};
