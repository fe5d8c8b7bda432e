//! Content-addressed blob server
//!
//! Run with: cargo run -p blobserver --features cli -- --config blobserver.toml

use std::net::SocketAddr;

use blobserver::Config;
use camino::Utf8PathBuf;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Serve content-addressed blobs over HTTP
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Utf8PathBuf,

    /// Override the listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Always stream blobs, even when the backend can issue redirects
    #[arg(long)]
    no_redirect: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config).await?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if args.no_redirect {
        config.redirect = false;
    }

    let addr = config.listen;
    let app = blobserver::router(config.server().await?);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Blob server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
