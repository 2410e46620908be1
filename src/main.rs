use clap::Parser;
use fleetrun::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    cli.init_logging()?;

    // Execute the run
    cli.execute().await?;

    Ok(())
}
