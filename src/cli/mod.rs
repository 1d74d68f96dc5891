pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "ormchain")]
#[command(about = "Inspect ORM callback chains, configuration and connectivity")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, conflicts_with = "json", help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Show the resolved order of the default callback chains")]
    Callbacks {
        #[command(subcommand)]
        cmd: commands::callbacks::CallbackCommands,
    },

    #[command(about = "Show the effective configuration")]
    Config,

    #[command(about = "Check that DATABASE_URL is reachable")]
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        match (cli.text, cli.json) {
            (false, true) => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Callbacks { cmd } => commands::callbacks::handle(cmd, output_format),
        Commands::Config => commands::config::handle(output_format),
        Commands::Ping => commands::db::handle_ping(output_format),
    }
}
