use clap::Parser;
use tracing_subscriber::EnvFilter;

use filestore::config::ServerArgs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.effective_log_filter())),
        )
        .init();

    if !args.dir.exists() {
        std::fs::create_dir_all(&args.dir)?;
    }

    filestore::server::serve(args.port, args.dir).await
}
