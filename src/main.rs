use anyhow::Result;
use clap::Parser;
use tracing::info;

use kingdom_scout::{
    cli::{handle_command, Cli},
    config::Config,
    logging::init_logger,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let _guard = init_logger(cli.verbose, config.logging.file.as_deref())?;

    info!("🏠 KingdomScout");
    handle_command(cli.command, config).await
}
