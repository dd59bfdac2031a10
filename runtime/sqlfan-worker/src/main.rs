use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use sqlfan_db::{JsonFileSettings, SqliteDriver};
use sqlfan_worker::{Endpoint, serve};

#[derive(Debug, Parser)]
#[command(name = "sqlfan-worker", about = "Serve allow-listed sqlfan operations over HTTP")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "SQLFAN_BIND", default_value = "127.0.0.1:8787")]
    bind: SocketAddr,

    /// JSON settings document holding the kill-switch.
    #[arg(long, env = "SQLFAN_SETTINGS", default_value = "sqlfan-settings.json")]
    settings: PathBuf,

    /// Directory holding one SQLite file per database name.
    #[arg(long, env = "SQLFAN_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("creating data dir {}", args.data_dir.display()))?;
    let endpoint = Arc::new(Endpoint::new(
        Arc::new(SqliteDriver::new(&args.data_dir)),
        Arc::new(JsonFileSettings::new(&args.settings)),
    ));
    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    serve(listener, endpoint).await.context("serving")?;
    Ok(())
}
