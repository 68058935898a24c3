//! CLI entry point - the composition root.
//!
//! Bootstrap wires the infrastructure; command dispatch routes to handlers.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use mediadl_cli::handlers::add::AddArgs;
use mediadl_cli::{Cli, CliConfig, CliError, Commands, bootstrap, handlers};

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = CliConfig::from_env(cli.data_dir)?;
    let ctx = bootstrap(config).await?;

    let result = match command {
        Commands::Add {
            id,
            uri,
            title,
            variant,
            cache_key,
        } => {
            let args = AddArgs {
                id,
                uri,
                title,
                variant,
                cache_key,
            };
            handlers::add::execute(&ctx, args).await
        }
        Commands::List => handlers::list::execute(&ctx).await,
        Commands::Status { id } => handlers::status::execute(&ctx, &id).await,
        Commands::Pause { id } => handlers::control::pause(&ctx, &id).await,
        Commands::Resume { id } => handlers::control::resume(&ctx, &id).await,
        Commands::ResumeAll => handlers::control::resume_all(&ctx).await,
        Commands::Remove { id } => handlers::remove::execute(&ctx, &id).await,
        Commands::RemoveAll { force } => handlers::remove::remove_all(&ctx, force).await,
        Commands::Run => handlers::run::execute(&ctx).await,
        Commands::Cache => handlers::cache::execute(&ctx).await,
        Commands::Export { id, path } => handlers::export::execute(&ctx, &id, &path).await,
    };

    // Flush listener deliveries (signals, replays) before exiting.
    ctx.shutdown().await;
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before parsing so MEDIADL_* variables apply
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let classified = CliError::from_anyhow(&err);
            eprintln!("Error: {err:#}");
            ExitCode::from(classified.exit_code())
        }
    }
}
