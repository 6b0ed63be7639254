mod cli;
mod live;
pub mod logging;

use clap::Parser;

pub async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    cli.command.run().await
}
