use std::sync::Arc;
use std::time::Duration;

use brewlink_bridge::{spawn_reconcile, spawn_reporter, start_ingress, BridgeConfig};
use brewlink_core::telemetry::init_tracing;
use brewlink_core::{Brewlink, HttpSparkApi};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let config = BridgeConfig::load();
    tracing::info!(
        target: "bridge",
        api = %config.api.base_url,
        services = ?config.services,
        "Starting bridge"
    );

    let api = Arc::new(HttpSparkApi::with_config(config.api.clone()));
    let mut brewlink = Brewlink::new(api).await?;
    brewlink.start().await?;

    for service_id in &config.services {
        brewlink.services.start_service(service_id).await?;
    }

    let ingress = start_ingress(&config.ingress_addr, Arc::clone(&brewlink.event_bus)).await?;

    let reconcile = (config.poll_interval_secs > 0).then(|| {
        spawn_reconcile(
            Arc::clone(&brewlink.services),
            Duration::from_secs(config.poll_interval_secs),
        )
    });
    let reporter = (config.report_interval_secs > 0).then(|| {
        spawn_reporter(
            Arc::clone(&brewlink.services),
            Duration::from_secs(config.report_interval_secs),
        )
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!(target: "bridge", "Shutdown requested");

    ingress.abort();
    for handle in reconcile.into_iter().chain(reporter) {
        handle.abort();
    }
    brewlink.shutdown().await?;
    Ok(())
}
