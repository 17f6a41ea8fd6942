//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Tally - Import bank and bookkeeping exports into your ledger
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Transaction import and entity resolution", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "tally.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TALLY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// User whose data is read and written
    #[arg(long, default_value = "local-dev", global = true)]
    pub user: String,

    /// Import config override (defaults to ~/.local/share/tally/config/import.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Import transactions, creating missing accounts, categories, counterparties and tags
    Import {
        /// File to import
        #[arg(short, long)]
        file: PathBuf,

        /// File type: dengioperacii, custom_csv, dsv_csv, dsv_tsv, dsv_xlsx
        #[arg(short = 't', long = "format")]
        format: String,

        /// Timezone for rows without one, in minutes east of UTC
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        utc_offset: i32,

        #[command(flatten)]
        dsv: DsvArgs,
    },

    /// Show how a file normalizes, without touching the database
    Preview {
        /// File to preview
        #[arg(short, long)]
        file: PathBuf,

        /// File type: dengioperacii, custom_csv, dsv_csv, dsv_tsv, dsv_xlsx
        #[arg(short = 't', long = "format")]
        format: String,

        /// Maximum rows to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        #[command(flatten)]
        dsv: DsvArgs,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, the server requires Cloudflare Access authentication headers.
        #[arg(long)]
        no_auth: bool,
    },

    /// List accounts
    Accounts,

    /// List categories
    Categories,

    /// List counterparties
    Counterparties,

    /// List tags
    Tags,
}

/// Layout of a delimiter-separated file (dsv_* formats only)
#[derive(Args, Debug, Clone, Default)]
pub struct DsvArgs {
    /// Column positions as JSON, e.g. '{"time":0,"type":1,"amount":2,"account":3}'
    #[arg(long)]
    pub column_map: Option<String>,

    /// Type column values as JSON, e.g. '{"Spent":"expense","Got":"income"}'
    #[arg(long)]
    pub type_map: Option<String>,

    /// The first line is data, not a header
    #[arg(long)]
    pub no_header: bool,

    /// chrono format of the time column
    #[arg(long)]
    pub time_format: Option<String>,

    /// chrono format of the timezone column (e.g. %z or %:z)
    #[arg(long)]
    pub timezone_format: Option<String>,

    /// Decimal separator of amounts
    #[arg(long)]
    pub decimal_separator: Option<char>,

    /// Digit grouping symbol of amounts (empty for none)
    #[arg(long)]
    pub grouping_symbol: Option<String>,

    /// Separator between the two numbers of a geo-location
    #[arg(long)]
    pub geo_separator: Option<String>,

    /// Order of the geo-location numbers: lonlat or latlon
    #[arg(long)]
    pub geo_order: Option<String>,

    /// Separator between tags
    #[arg(long)]
    pub tag_separator: Option<String>,
}
