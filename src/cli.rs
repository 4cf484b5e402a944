use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lobby", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file path
    #[arg(short, long = "config", value_name = "FILE")]
    pub config_path: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the gateway and the presence worker (default)
    Serve,

    /// Generate sample configuration
    ConfigSample {
        /// Output path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the online players of a tenant
    Online {
        /// Tenant ID
        tenant: String,
    },

    /// Repair player state from online set membership
    Reconcile {
        /// Tenant ID
        tenant: String,
    },
}
