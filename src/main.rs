use log::error;
use tokio::sync::broadcast;

use sbms_bridge::prelude::*;
use sbms_bridge::options::Options;

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::new();

    let config = ConfigWrapper::new(&options.config_file)?;
    sbms_bridge::init_logging(config.loglevel());
    config.log_summary();

    if options.once {
        return sbms_bridge::poll_once(config).await;
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        if let Err(e) = shutdown_tx.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    });

    sbms_bridge::app(shutdown_rx, config).await
}
