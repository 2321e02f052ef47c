pub mod commands;
pub mod logging;

use clap::{Parser, Subcommand};
use customers_core::config::{AppConfig, LoadOptions};
use std::process::ExitCode;

use crate::commands::customer::CustomerCommand;

#[derive(Debug, Parser)]
#[command(
    name = "customers",
    about = "Customers operator CLI",
    long_about = "Apply migrations, inspect configuration, run readiness checks, and manage customer records.",
    after_help = "Examples:\n  customers migrate\n  customers customer save --name Alice --phone 555-1234\n  customers customer list --active\n  customers doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, DB connectivity, and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Read and modify customer records")]
    Customer {
        #[command(subcommand)]
        command: CustomerCommand,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        if let Err(error) = logging::init(&config.logging) {
            eprintln!("failed to initialize logging: {error}");
        }
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            let (exit_code, output) = commands::doctor::run(json);
            commands::CommandResult { exit_code, output }
        }
        Command::Customer { command } => commands::customer::run(command),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
