// Path: crates/cli/src/main.rs

//! The `mlayer` binary.
//!
//! Exit codes: 0 success, 1 user error (bad input, wrong password),
//! 2 internal error.

mod chain_client;
mod commands;

use clap::{Parser, Subcommand};
use commands::CliError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mlayer", version, about = "mlayer validator node")]
struct Cli {
    /// Path to the node configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the keystore directory.
    #[arg(long, global = true)]
    keystore_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage node account, wallet and license registration.
    Node {
        #[command(subcommand)]
        command: commands::NodeCommand,
    },
    /// Start the validator node.
    Start,
}

fn main() {
    let cli = Cli::parse();
    let config = match commands::load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let outcome = match cli.command {
        Command::Node { command } => commands::run_node_command(command, &config, cli.keystore_dir),
        Command::Start => commands::run_start(config),
    };

    match outcome {
        Ok(()) => {}
        Err(CliError::User(message)) => {
            eprintln!("error: {message}");
            std::process::exit(1);
        }
        Err(CliError::Internal(e)) => {
            eprintln!("internal error: {e:#}");
            std::process::exit(2);
        }
    }
}
