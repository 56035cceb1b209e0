use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tourforge_core::config::Config;
use tourforge_node::calibration::run_calibration;
use tourforge_node::http_broker::HttpBroker;
use tourforge_node::pool::{configure_global_thread_pool, detect_profile};
use tourforge_node::worker::Worker;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Hive Server URL
    #[arg(long, default_value = "http://localhost:3000")]
    hive: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Measures single-core permutation throughput
    Calibrate {
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    /// Connects to the Hive and starts processing tasks
    Work {
        /// Stable node id; a random one is generated when omitted
        #[arg(long)]
        node_id: Option<String>,

        /// Cores left free for the host
        #[arg(long, default_value_t = 0)]
        reserve_cores: usize,

        #[command(flatten)]
        config: Config,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Calibrate { seconds } => {
            let outcome =
                tokio::task::spawn_blocking(move || run_calibration(Duration::from_secs(seconds))).await;
            match outcome {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!("❌ Calibration failed: {}", e),
                Err(e) => error!("❌ Calibration panicked: {}", e),
            }
        }
        Commands::Work {
            node_id,
            reserve_cores,
            config,
        } => {
            let node_id = node_id.unwrap_or_else(|| {
                let short = Uuid::new_v4().simple().to_string();
                format!("node-{}", &short[..8])
            });
            run_worker(cli.hive, node_id, reserve_cores, config).await
        }
    }
}

async fn run_worker(hive_url: String, node_id: String, reserve_cores: usize, mut config: Config) {
    configure_global_thread_pool(reserve_cores);

    let profile = detect_profile();
    info!(
        "🤖 Worker {} ({} | {} cores) connecting to Hive at {}",
        node_id, profile.cpu_model, profile.cores, hive_url
    );
    let broker = Arc::new(HttpBroker::new(hive_url, profile));

    loop {
        match broker.register(&node_id).await {
            Ok(reg) => {
                info!("✅ Registered ({}), prefetch {}", reg.status, reg.prefetch);
                config.channel.prefetch = reg.prefetch;
                break;
            }
            Err(e) => {
                warn!("Hive unreachable ({}). Retrying in 5s...", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }

    Worker::new(broker, &node_id, &config).run().await;
}
