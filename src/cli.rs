use clap::{Parser, Subcommand};

/// tokencache: shared access-token cache for multi-instance services
#[derive(Parser)]
#[command(name = "tokencache", version, about)]
pub struct Cli {
    /// Skip the in-process memory tier for this run
    #[arg(long, global = true)]
    pub no_memoize: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a valid access token, refreshing the cache if needed
    Get,

    /// Fetch a fresh token from the issuer without touching the cache
    ForceFetch,

    /// Create the backing collection (run once before first use)
    CreateCollection,
}
