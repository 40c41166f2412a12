//! Pipeline server - HTTP front end for the change-request flows.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use pipeline::io::config::load_startup_config;
use pipeline::logging;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "pipeline-server")]
#[command(about = "HTTP server for change-request pipeline runs")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Configuration file (defaults to `pipeline.toml` when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("pipeline_server=info,pipeline=info");

    let args = Args::parse();
    let config = load_startup_config(args.config.as_deref())?;
    info!(
        completion = config.completion.endpoint.is_some() && config.completion.api_key.is_some(),
        hosting = config.hosting.token.is_some(),
        data_dir = %config.git.data_dir.display(),
        "starting pipeline-server"
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router()
        .layer(cors)
        .with_state(AppState::new(config));

    info!(addr = %args.bind, "listening");
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
