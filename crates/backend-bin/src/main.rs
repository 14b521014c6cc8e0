// ============================
// munch-backend-bin/src/main.rs
// ============================
use std::sync::Arc;

use anyhow::Result;
use backend_lib::{
    catalog::PlacesCatalog,
    config::Settings,
    ws_router, AppState,
};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "munch-server", about = "Group restaurant-swipe coordination server")]
struct Args {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if settings.places.api_key.is_empty() {
        warn!("no places API key configured; rooms will seed with empty restaurant lists");
    }

    let catalog = Arc::new(PlacesCatalog::new(&settings.places)?);
    let bind_addr = settings.bind_addr;
    let state = Arc::new(AppState::new(catalog, settings));

    let app = ws_router::create_router(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}
