//! Paper translator - HTTP server entry point.

use paper_translator::{api, config::Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("paper_translator=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        extract_dir = %config.extract_dir.display(),
        llm_dir = %config.llm_dir.display(),
        fast_model = %config.fast_profile.model,
        correction_model = %config.strong_profile.model,
        "Starting paper translator"
    );

    api::serve(config).await
}
