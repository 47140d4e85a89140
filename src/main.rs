use anyhow::{Context, Result};
use sdo_notifications::{
    CredentialProvider, CredentialProviderConfig, EnvCredentialSink, NotificationProvider,
    SdoNotifications,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let credentials = CredentialProvider::new(
        CredentialProviderConfig::from_env(),
        Arc::new(EnvCredentialSink),
    )
    .context("failed to build credential provider")?;

    let notifications = SdoNotifications::new();
    let providers: Vec<Arc<dyn NotificationProvider>> = vec![Arc::new(credentials)];
    notifications.initialize(providers).await;

    let mut ticker = time::interval(Duration::from_secs(1));
    let mut iteration: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if notifications.should_stop() {
                    tracing::info!(iteration, "stop requested; leaving work loop");
                    break;
                }
                iteration += 1;
                tracing::info!(iteration, "worker tick");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(iteration, "interrupt received; leaving work loop");
                break;
            }
        }
    }

    notifications.stop();
    Ok(())
}
