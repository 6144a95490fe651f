mod commands;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use commands::run::{self, RunOptions};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one conversation, answering input requests from the terminal
    Run {
        /// Message that opens the conversation
        #[arg(short, long)]
        message: String,

        /// JSON engine script, the built-in vacation planner when omitted
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Agent that should take the first turn
        #[arg(short, long)]
        agent: Option<String>,

        /// Answer to use for the next input request instead of prompting (repeatable)
        #[arg(long = "answer")]
        answers: Vec<String>,

        /// Upper bound on engine rounds, 0 for no bound
        #[arg(long, default_value_t = 15)]
        max_rounds: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs only when asked for, so they never mix into the conversation
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            message,
            script,
            agent,
            answers,
            max_rounds,
        } => {
            run::execute(RunOptions {
                message,
                script,
                agent,
                answers,
                max_rounds,
            })
            .await
        }
    }
}
