//! Core domain types and port definitions for mediadl.
//!
//! This crate is the pure center of the workspace: job records and their
//! state machine, bus events, the error taxonomy, requirement flags, engine
//! configuration, and the port traits adapters implement.
//!
//! # Structure
//!
//! - `job` - Job record, state machine, events, errors, request DTOs
//! - `requirements` - Requirement flags gating DOWNLOADING
//! - `config` - `EngineConfig`
//! - `ports` - Trait abstractions for index, fetcher, listeners, signals
//! - `paths` - Data directory resolution

pub mod config;
pub mod job;
pub mod paths;
pub mod ports;
pub mod requirements;

pub use config::EngineConfig;
pub use job::{
    CacheKey, DeliveredEvent, DownloadError, DownloadRequest, DownloadResult, DownloadsSnapshot,
    FailureReason, JobChanged, JobEvent, JobRecord, JobState, JobSummary, StopReason,
};
pub use paths::{PathError, cache_dir, data_root, database_path, ensure_directory};
pub use ports::{
    ByteRange, ByteStream, DownloadIndexPort, DownloadOrchestratorPort, FetchedResource,
    JobListener, ListenerError, RepositoryError, ResourceFetcherPort, SignalKind,
    SignalLedgerPort, SignalSinkPort, TerminalSignal,
};
pub use requirements::Requirements;
