use anyhow::Result;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use timeslice_core::config::RetrievalConfig;
use timeslice_core::persist::ClusterPaths;
use timeslice_server::{build_app, ServerOptions};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Document statistics directory
    #[arg(long, default_value = "./stats")]
    stats: PathBuf,
    /// Term enumeration TSV; the dictionary snapshot in --stats is used when omitted
    #[arg(long)]
    terms: Option<PathBuf>,
    #[arg(long)]
    day_clusters: PathBuf,
    #[arg(long)]
    hour_clusters: PathBuf,
    /// Per-window document vectors for windows without exported assignments
    #[arg(long)]
    vectors: Option<PathBuf>,
    #[arg(long)]
    dimension: usize,
    /// JSON retrieval settings
    #[arg(long)]
    config: Option<PathBuf>,
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
    let config = match &args.config {
        Some(path) => RetrievalConfig::load(path)?,
        None => RetrievalConfig::default(),
    };
    let clusters = ClusterPaths {
        day_root: args.day_clusters,
        hour_root: args.hour_clusters,
        dimension: args.dimension,
        trial: config.trial,
        vectors_root: args.vectors,
    };
    let app: Router = build_app(ServerOptions { stats: args.stats, terms: args.terms, clusters, config })?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
