use clap::{Parser, Subcommand};
use std::process;
use tracing::{error, info, warn};

mod cmd;
mod reports;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Rayon worker threads (defaults to all cores)
    #[arg(global = true, long)]
    threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Solves an instance in-process
    Solve(cmd::solve::SolveArgs),
    /// Shows how a bruteforce run would be partitioned
    Plan(cmd::plan::PlanArgs),
}

fn main() {
    // Logs go to stderr so stdout carries only the report.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    if let Some(threads) = cli.threads {
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
            Ok(()) => info!("🧵 Thread Pool configured: {} threads", threads),
            Err(e) => warn!("⚠️ Could not size thread pool: {}", e),
        }
    }

    let outcome = match cli.command {
        Commands::Solve(args) => cmd::solve::run(args),
        Commands::Plan(args) => cmd::plan::run(args),
    };

    if let Err(e) = outcome {
        error!("❌ {}", e);
        process::exit(1);
    }
}
