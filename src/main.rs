use anyhow::Result;
use tracing::info;

use crabchat_session::{app, config, logging};

#[tokio::main]
async fn main() -> Result<()> {
    // Load config
    let cfg = config::load_config()?;

    logging::init(&cfg.logging)?;
    info!("Starting crabchat-session v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = app::run(cfg).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
