use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs in production (LIFF_LOG_JSON=1), human-readable otherwise
    let json_logs = std::env::var("LIFF_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("liff_server=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = liff_server::config::ServerConfig::parse();
    tracing::info!("Starting user store on {}", config.listen_addr);
    if !config.cors_origins.is_empty() {
        tracing::info!("CORS origins: {}", config.cors_origins.join(", "));
    }
    liff_server::run(config).await
}
