use clap::{Parser, Subcommand};

/// Order status synchronization and seller settlement worker
#[derive(Parser, Debug)]
#[command(name = "shipsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single sync pass and print the run report as JSON
    Sync {
        /// Re-check orders that are already delivered
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Process at most this many orders
        #[arg(long, env = "SHIPSYNC_LIMIT")]
        limit: Option<usize>,
    },

    /// Run the recurring scheduler and the ops server until Ctrl-C
    Run,

    /// Apply pending database migrations
    Migrate,
}
