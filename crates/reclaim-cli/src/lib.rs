//! reclaim CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// reclaim - external resource GC for CAPA clusters
#[derive(Parser, Debug)]
#[command(name = "reclaim")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enable, disable or configure external resource garbage collection
    Gc(commands::gc::GcArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Gc(args) => commands::gc::run(args).await,
        }
    }
}
