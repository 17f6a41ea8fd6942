//! Tally CLI - Transaction import and entity resolution
//!
//! Usage:
//!   tally init                                  Initialize database
//!   tally preview --file F --format custom_csv  Show how a file normalizes
//!   tally import --file F --format custom_csv   Import transactions
//!   tally serve --port 3000                     Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Import {
            file,
            format,
            utc_offset,
            dsv,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let db = commands::open_db(&cli.db, cli.no_encrypt)?
                .with_batch_limits(config.batch_limits());
            commands::cmd_import(&db, &config, &cli.user, &file, &format, utc_offset, &dsv)
                .map(|_| ())
        }
        Commands::Preview {
            file,
            format,
            limit,
            dsv,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_preview(&config, &file, &format, limit, &dsv).map(|_| ())
        }
        Commands::Serve {
            port,
            host,
            no_auth,
        } => {
            commands::cmd_serve(
                &cli.db,
                cli.config.as_deref(),
                &host,
                port,
                no_auth,
                cli.no_encrypt,
            )
            .await
        }
        Commands::Accounts => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_accounts(&db, &cli.user)
        }
        Commands::Categories => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_categories(&db, &cli.user)
        }
        Commands::Counterparties => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_counterparties(&db, &cli.user)
        }
        Commands::Tags => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_tags(&db, &cli.user)
        }
    }
}
