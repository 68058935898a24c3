//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where infrastructure is wired together
//! for the CLI:
//! - `SQLite` index and signal ledger (via mediadl-db)
//! - HTTP fetcher and the engine (via mediadl-download)
//! - Console signal sink
//!
//! Handlers receive the composed `CliContext`.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use mediadl_core::{DownloadOrchestratorPort, EngineConfig, ResourceFetcherPort, data_root};
use mediadl_db::{DbFactory, setup_database};
use mediadl_download::{HttpFetcher, OrchestratorContext, OrchestratorDeps};

use crate::error::CliError;
use crate::signals::ConsoleSignalSink;

/// Overrides the cache budget (bytes).
pub const CACHE_BUDGET_ENV: &str = "MEDIADL_CACHE_BUDGET";
/// Overrides the number of parallel downloads.
pub const MAX_PARALLEL_ENV: &str = "MEDIADL_MAX_PARALLEL";
/// Overrides the automatic retry bound.
pub const MAX_RETRIES_ENV: &str = "MEDIADL_MAX_RETRIES";

/// Bootstrap configuration for the CLI.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Data directory override (`--data-dir` / `MEDIADL_DATA_DIR`).
    pub data_dir: Option<PathBuf>,
    pub cache_budget_bytes: Option<u64>,
    pub max_parallel_downloads: Option<usize>,
    pub max_retries: Option<u32>,
}

impl CliConfig {
    /// Read numeric overrides from the environment.
    pub fn from_env(data_dir: Option<PathBuf>) -> Result<Self> {
        Ok(Self {
            data_dir,
            cache_budget_bytes: env_override(CACHE_BUDGET_ENV)?,
            max_parallel_downloads: env_override(MAX_PARALLEL_ENV)?,
            max_retries: env_override(MAX_RETRIES_ENV)?,
        })
    }

    /// Resolve the data directory and build the engine configuration.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let root =
            data_root(self.data_dir.as_deref()).map_err(|e| CliError::Config(e.to_string()))?;
        let mut config = EngineConfig::new(root);
        if let Some(budget) = self.cache_budget_bytes {
            config = config.with_cache_budget(budget);
        }
        if let Some(max) = self.max_parallel_downloads {
            config = config.with_max_parallel_downloads(max);
        }
        if let Some(max) = self.max_retries {
            config = config.with_max_retries(max);
        }
        Ok(config)
    }
}

fn env_override<T>(name: &str) -> Result<Option<T>, CliError>
where
    T: FromStr,
    T::Err: Display,
{
    parse_override(name, std::env::var(name).ok())
}

fn parse_override<T>(name: &str, raw: Option<String>) -> Result<Option<T>, CliError>
where
    T: FromStr,
    T::Err: Display,
{
    let Some(value) = raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    value
        .parse()
        .map(Some)
        .map_err(|e| CliError::Config(format!("{name}={value}: {e}")))
}

/// Fully composed context for CLI commands.
pub struct CliContext {
    /// The running engine.
    pub engine: OrchestratorContext,
    /// The configuration it was opened with.
    pub config: EngineConfig,
}

impl CliContext {
    /// The orchestrator command surface.
    pub fn downloads(&self) -> Arc<dyn DownloadOrchestratorPort> {
        self.engine.orchestrator()
    }

    /// Access the engine.
    pub const fn engine(&self) -> &OrchestratorContext {
        &self.engine
    }

    /// Stop transfers and flush pending listener deliveries.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}

/// Bootstrap the CLI application.
///
/// Opens the index database, restores engine state from it and wires the
/// console signal sink. Transfers do not start until a handler calls
/// `start` on the engine.
pub async fn bootstrap(config: CliConfig) -> Result<CliContext> {
    let engine_config = config.engine_config()?;

    // 1. Index database and signal ledger
    let pool = setup_database(&engine_config.database_path())
        .await
        .map_err(|e| CliError::Database(format!("{e:#}")))?;
    let stores = DbFactory::build_stores(&pool);

    // 2. Transport
    let fetcher: Arc<dyn ResourceFetcherPort> = Arc::new(HttpFetcher::new()?);

    // 3. Engine
    let deps = OrchestratorDeps::new(stores.index, fetcher)
        .with_signals(Arc::new(ConsoleSignalSink::new()), Some(stores.ledger));
    let engine = OrchestratorContext::open(engine_config.clone(), deps).await?;

    tracing::debug!(
        data_dir = %engine_config.data_dir.display(),
        budget = engine_config.cache_budget_bytes,
        parallel = engine_config.max_parallel_downloads,
        "CLI bootstrapped"
    );
    Ok(CliContext {
        engine,
        config: engine_config,
    })
}
