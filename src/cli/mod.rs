pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "campus")]
#[command(about = "Campus CLI - Administrative operations against the campus database")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Delete a legacy user and every row that depends on it")]
    Purge {
        #[arg(help = "Legacy user id")]
        user_id: i64,

        #[arg(long, help = "Run the purge and roll it back, reporting what would be removed")]
        dry_run: bool,
    },

    #[command(about = "Validate and print the deletion graph in execution order")]
    Graph,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Purge { user_id, dry_run } => {
            commands::purge::handle(user_id, dry_run, output_format).await
        }
        Commands::Graph => commands::graph::handle(output_format).await,
    }
}
