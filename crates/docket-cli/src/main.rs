//! Docket CLI: the `docket` command.

mod cli;
mod commands;
mod config;
mod error;

use clap::Parser;
use cli::{Cli, Commands, JobsCommands};
use commands::store::KeysArgs;
use error::CliError;
use std::process;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "DOCKET_LOG";

fn main() {
    init_logging();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => exit_with(&CliError::Runtime(e)),
    };
    if let Err(e) = runtime.block_on(run(cli.command)) {
        exit_with(&e);
    }
}

async fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Get { key, common } => commands::store::run_get(key, common).await,

        Commands::Put {
            key,
            json_body,
            force,
            common,
        } => commands::store::run_put(key, json_body, force, common).await,

        Commands::Delete { key, common } => commands::store::run_delete(key, common).await,

        Commands::Keys {
            start_key,
            end_key,
            key,
            limit,
            offset,
            descending,
            docs,
            common,
        } => {
            let args = KeysArgs {
                start_key,
                end_key,
                key,
                limit,
                offset,
                descending,
                docs,
            };
            commands::store::run_keys(args, common).await
        }

        Commands::Jobs { command } => match command {
            JobsCommands::List { common } => commands::jobs::run_list(common).await,
            JobsCommands::Clear { method, common } => {
                commands::jobs::run_clear(method, common).await
            }
        },
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_with(error: &CliError) -> ! {
    eprintln!("error: {error}");
    process::exit(1);
}
