//! Tillsync Agent - keeps the local point-of-sale data in step with the
//! remote sync service.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tillsync_agent::{controller, Config, SyncEngine, SyncEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tillsync_agent=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!(
        data_dir = %config.data_dir.display(),
        configured = config.sync_configured(),
        "starting tillsync agent"
    );

    let engine = Arc::new(SyncEngine::new(config).await);

    // Bridge notable events to the log until a UI subscribes.
    let mut events = engine.events().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SyncEvent::NewOrderAlert { count }) => {
                    info!(count, "new storefront orders");
                }
                Ok(SyncEvent::QueueOverflow { dropped }) => {
                    warn!(dropped, "sync queue overflowed; oldest payloads lost");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    controller::run(engine).await;

    Ok(())
}
