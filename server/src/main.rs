use anyhow::Result;
use axum::Router;
use clap::Parser;
use corpus::CorpusConfig;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};
use server::build_app;
use tokio::net::TcpListener;

#[derive(Parser)]
struct Args {
    /// Corpus store root directory
    #[arg(long, default_value = "./corpus")]
    root: String,
    /// Number of most recent versions to keep
    #[arg(long, default_value_t = 5)]
    retention: usize,
    /// Checkpoint on every n-th ingest request
    #[arg(long, default_value_t = 1)]
    checkpoint_interval: usize,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = CorpusConfig::new(&args.root)
        .with_retention(args.retention)
        .with_checkpoint_interval(args.checkpoint_interval);
    let app: Router = build_app(config)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, root = %args.root, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
