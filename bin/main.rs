use clap::Parser;
use imageclassifier::config::{Cli, ServiceConfig};
use imageclassifier::provider::InferenceProvider;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // tract reports through the `log` facade
    tracing_log::LogTracer::init()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let config = ServiceConfig::from(cli);
    tracing::info!(?config, "image classifier v{}", env!("CARGO_PKG_VERSION"));

    InferenceProvider::new(config).run().await?;
    eprintln!("image classifier exiting");
    Ok(())
}
