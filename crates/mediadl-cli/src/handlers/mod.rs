//! Command handlers.
//!
//! Handlers follow one pattern:
//! - Signature: `pub async fn execute(ctx: &CliContext, ...) -> Result<()>`
//! - Thin wrappers that call the orchestrator and format output
//!
//! Handlers should NOT touch the index or the cache files directly.

pub mod add;
pub mod cache;
pub mod control;
pub mod export;
pub mod list;
pub mod remove;
pub mod run;
pub mod status;
