use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tourforge_core::config::Config;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

mod coordinator;
mod db;
mod error;
mod routes;
mod state;
mod store;

use crate::state::AppState;

#[derive(Parser)]
struct Args {
    /// Directory holding instance files
    #[arg(long, short, default_value = "instances")]
    instances: PathBuf,

    #[arg(long, default_value = "sqlite://hive.db")]
    db: String,

    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// JSON file overriding the solver and channel settings
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    settings: Config,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    info!("🐝 TourForge Hive is initializing...");

    let config = match &args.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(c) => {
                info!("⚙️ Loaded settings from {:?}", path);
                c
            }
            Err(e) => {
                error!("❌ {}", e);
                std::process::exit(1);
            }
        },
        None => args.settings,
    };

    let pool = match db::init_db(&args.db).await {
        Ok(p) => p,
        Err(e) => {
            error!("❌ Could not open queue store {}: {}", args.db, e);
            std::process::exit(1);
        }
    };

    let instances = if args.instances.exists() {
        args.instances
    } else if Path::new("../instances").exists() {
        PathBuf::from("../instances")
    } else {
        warn!("⚠️ Instance directory {:?} not found", args.instances);
        args.instances
    };
    info!("📂 Serving instances from: {:?}", instances);

    let state = Arc::new(AppState::new(pool, instances, config));

    let app = routes::app(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("🚀 Hive listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("❌ Could not bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!("❌ Server error: {}", e);
    }
}
