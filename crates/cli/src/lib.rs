pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "freddie",
    about = "Freddie shoe store assistant CLI",
    long_about = "Chat with the store assistant from the console, inspect configuration, and list the catalog.",
    after_help = "Examples:\n  freddie chat --user-id zaid --contact zaid@example.com\n  freddie config\n  freddie catalog --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive chat session that prints tool calls and hand-offs")]
    Chat {
        #[arg(long, default_value = "console", help = "User id the cart and history belong to")]
        user_id: String,
        #[arg(long, alias = "email", help = "Address receipts are sent to")]
        contact: Option<String>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "List the products the store sells")]
    Catalog {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { user_id, contact } => {
            commands::chat::run(commands::chat::ChatOptions { user_id, contact })
        }
        Command::Config => commands::config::run(),
        Command::Catalog { json } => commands::catalog::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
