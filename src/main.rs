use anyhow::Context;
use podcast_ui::{config::UiConfig, init_tracing, init_ui};
use std::env;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Optional config file; environment variables override it
    let config_path = env::args().nth(1).map(PathBuf::from);

    let config = UiConfig::load(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load configuration from environment".to_string(),
    })?;

    init_ui(config).await.context("UI server error")?;

    Ok(())
}
