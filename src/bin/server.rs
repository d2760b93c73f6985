use clap::Parser;
use moneylog::config::Config;
use moneylog::user_repository::MemoryUserDirectory;
use moneylog::{init_tracing, start_server_with_config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "moneylog-server", about = "moneylog authentication API")]
struct Args {
    /// Path to the TOML config file (default: moneylog.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    init_tracing(&config.logging);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    // Run the server in a background task so we can listen for Ctrl-C in the main task
    let mut server_task = tokio::spawn(async move {
        let users = Arc::new(MemoryUserDirectory::new());
        start_server_with_config(config, users, shutdown_rx).await
    });

    tokio::select! {
        result = &mut server_task => {
            if let Err(e) = result? {
                error!("server error: {:#}", e);
                return Err(e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutdown requested, stopping server...");
            let _ = shutdown_tx.send(());
            server_task.await??;
        }
    }

    Ok(())
}
