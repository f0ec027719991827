//! codium server binary
//!
//! Starts the HTTP API. The TOML config path comes from `--config <path>` or
//! `CODIUM_CONFIG`; see `ServerConfig` for the environment overrides.

use std::{env, path::PathBuf};

use anyhow::Result;
use codium::server::{config::ServerConfig, serve};
use tracing_subscriber::EnvFilter;

fn parse_config_arg(args: &[String]) -> Option<PathBuf> {
    args.iter()
        .position(|a| a == "--config" || a == "-c")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("codium=info,tower_http=info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let config_path =
        parse_config_arg(&args).or_else(|| env::var("CODIUM_CONFIG").ok().map(PathBuf::from));
    let config = ServerConfig::load(config_path.as_deref()).await?;
    serve(config).await?;
    Ok(())
}
