use anyhow::Result;
use log::{error, info};
use std::sync::Arc;

use linkwarden::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting Linkwarden v{}", linkwarden::VERSION);

    let config = Config::from_env()?;

    if let Err(e) = tokio::fs::create_dir_all(&config.data_dir).await {
        error!("Could not create data directory {}: {}", config.data_dir.display(), e);
        return Err(e.into());
    }

    let warns = Arc::new(WarnStore::load(config.warns_path()).await?);
    let registry = Arc::new(Registry::load(config.registry_path()).await?);

    let mut connection = TelegramConnection::new(TelegramConfig::from_env()?);
    connection.connect().await?;
    let events = connection
        .get_event_receiver()
        .ok_or_else(|| anyhow::anyhow!("Telegram connection produced no event stream"))?;

    let api: Arc<dyn ChatApi> = Arc::new(connection);
    let bot = Arc::new(WardenBot::new(api, warns, registry, &config)?);

    let dispatcher = Arc::clone(&bot);
    let dispatch_task = tokio::spawn(async move {
        dispatcher.run(events).await;
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        result = dispatch_task => {
            if let Err(e) = result {
                error!("Event dispatcher terminated abnormally: {}", e);
            }
        }
    }

    info!("Linkwarden stopped");
    Ok(())
}
