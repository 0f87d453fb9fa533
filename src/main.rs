use tracing_subscriber::EnvFilter;

use ccloud_metrics::{ClientConfig, Query, TelemetryClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ccloud_metrics=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::var("CCLOUD_METRICS_CONFIG")
        .unwrap_or_else(|_| "ccloud-metrics.toml".to_string());
    let config = ClientConfig::load(&config_path)?.with_env_overrides();
    if config.credentials.api_key.is_empty() {
        tracing::warn!("no API key configured, requests will be rejected");
    }

    let client = TelemetryClient::new(config)?;

    let output = match std::env::var("CCLOUD_METRICS_QUERY") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)?;
            let query: Query = serde_json::from_str(&raw)?;
            tracing::info!("running query from {path}");
            let res = client.post_query(&query).await?;
            serde_json::to_string_pretty(&res.data)?
        }
        Err(_) => {
            let metrics = client.get_available_metrics().await?;
            tracing::info!("{} metrics available", metrics.len());
            serde_json::to_string_pretty(&metrics)?
        }
    };
    println!("{output}");

    Ok(())
}
