//! nbintel - notebook AI chat orchestration server.
//!
//! This is the main entry point for the nbintel server.

use clap::Parser;
use nbintel_core::config::{ConfigOptions, NbiConfig};
use nbintel_core::ChatService;
use nbintel_server::{router, AppState};
use nbintel_util::log::{self, LogLevel};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "nbintel")]
#[command(author, version, about = "Notebook AI chat orchestration server", long_about = None)]
struct Cli {
    /// Address to bind to
    #[arg(long, default_value = "127.0.0.1:8585")]
    bind: SocketAddr,

    /// Root directory served to the notebook front end
    #[arg(long, default_value = ".")]
    root_dir: PathBuf,

    /// Override the user config directory
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    log::init(LogLevel::parse(&cli.log_level).unwrap_or_default());

    let root_dir = cli
        .root_dir
        .canonicalize()
        .unwrap_or_else(|_| cli.root_dir.clone());
    let config = Arc::new(NbiConfig::new(ConfigOptions {
        server_root_dir: root_dir.display().to_string(),
        env_dir: None,
        user_dir: cli.config_dir,
    }));

    let service = ChatService::new(config).await;
    let app = router(AppState::new(service));

    info!(address = %cli.bind, root_dir = %root_dir.display(), "starting nbintel server");
    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
