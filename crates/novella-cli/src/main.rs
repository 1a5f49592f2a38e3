//! novella: drive the generation gateway from the terminal.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use novella_core::ConfigStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the event stream.
    let filter = if cli.verbose {
        EnvFilter::new("novella=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_store = match &cli.config {
        Some(path) => ConfigStore::with_path(path),
        None => ConfigStore::new(),
    };
    config_store.hydrate_env();
    let config = config_store.load();

    let result = match cli.command {
        Commands::Generate {
            ref library,
            ref token,
            ref origin,
            ref records_dir,
            ref request,
        } => {
            let options = commands::generate::GenerateOptions {
                library: library.clone(),
                token: token.clone(),
                origin: origin.clone(),
                records_dir: records_dir.clone(),
                request: request.clone(),
            };
            commands::generate::run(&config, options).await
        }
        Commands::Providers => commands::providers::run(&config),
        Commands::Cost {
            ref model,
            linked_chars,
        } => commands::cost::run(&config, model, linked_chars),
        Commands::Records {
            ref user,
            limit,
            ref records_dir,
        } => commands::records::run(user, limit, records_dir.as_deref()).await,
    };

    if let Err(err) = result {
        if let Some(exit_err) = err.downcast_ref::<commands::ExitError>() {
            eprintln!("{}", exit_err.message);
            std::process::exit(exit_err.code);
        }
        return Err(err);
    }

    Ok(())
}
