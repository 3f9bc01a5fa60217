use clap::Parser;
use tracing_subscriber::EnvFilter;

use filestore::client::{Shell, TransferMode};
use filestore::config::ClientArgs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ClientArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.effective_log_filter())),
        )
        .init();

    let mut shell = Shell::new(args.host, args.port, args.climit);

    match args.run.as_deref().and_then(TransferMode::parse) {
        Some(mode) => shell.run_once(mode).await,
        None => shell.run_interactive().await,
    }
}
