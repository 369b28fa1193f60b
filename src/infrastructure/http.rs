use crate::config::UploaderConfig;
use crate::services::transfer::HttpPipelineClient;
use std::sync::Arc;
use tracing::info;

/// Builds the shared reqwest client. The timeout applies to every request,
/// so negotiation, transfer and status calls each have their own deadline.
pub fn build_http_client(config: &UploaderConfig) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .connect_timeout(config.request_timeout())
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .build()?;
    Ok(client)
}

pub fn setup_pipeline_client(config: &UploaderConfig) -> anyhow::Result<Arc<HttpPipelineClient>> {
    info!(
        "☁️  Pipeline API: {} (Region: {}, Input: {}, Output: {})",
        config.api_base_url,
        config.region,
        config.input_bucket.as_deref().unwrap_or("-"),
        config.output_bucket.as_deref().unwrap_or("-"),
    );

    let http = build_http_client(config)?;
    Ok(Arc::new(HttpPipelineClient::new(
        http,
        config.api_base_url.clone(),
    )))
}
