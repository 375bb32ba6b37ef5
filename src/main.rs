mod app;
mod backend;
mod config;
mod domain;
mod infrastructure;
mod pipeline;
mod report;
mod source;

use anyhow::Result;
use infrastructure::{directories, logging, shutdown};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config()?;
    let paths = directories::ensure_directories(&config.directories)?;
    logging::init_tracing(&config.logging, &paths.logs_dir)?;

    let cancel = CancellationToken::new();
    shutdown::install_signal_handlers(cancel.clone());

    let app = app::SpamReportApp::initialize(config, cancel)?;
    app.run().await?;
    Ok(())
}
