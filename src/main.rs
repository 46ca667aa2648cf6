use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use poolwarden::cli::{Cli, Commands};
use poolwarden::config::AppConfig;
use poolwarden::logging::init_logging;
use poolwarden::runtime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(cli.config.as_deref())
        .with_context(|| format!("loading configuration from {:?}", cli.config))?;

    if let Commands::Serve { bind: Some(bind) } = &cli.command {
        config.server.bind = bind.clone();
    }

    if let Err(violations) = config.validate() {
        bail!("invalid configuration:\n  {}", violations.join("\n  "));
    }

    init_logging(&config.logging);
    info!("poolwarden {} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { .. } => runtime::run_serve(config).await?,
        Commands::Cleaner { url } => runtime::run_cleaner(config, url).await?,
        Commands::Client { url } => runtime::run_client(config, url).await?,
        Commands::Simulate {
            cleaners,
            clients,
            seconds,
        } => {
            let snapshot = runtime::run_simulate(config, cleaners, clients, seconds).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}
