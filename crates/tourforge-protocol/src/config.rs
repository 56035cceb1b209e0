use clap::Args;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 10!, the number of permutations a single bruteforce task covers.
pub const DEFAULT_CHUNK_SIZE: u64 = 3_628_800;

#[derive(Args, Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[command(flatten)]
    pub genetic: GeneticParams,
    #[command(flatten)]
    pub bruteforce: BruteforceParams,
    #[command(flatten)]
    pub channel: ChannelParams,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;

        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config {}: {}", path.display(), e))
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticParams {
    /// Population size is `cities * multiplier` (divided across workers when sharded).
    #[arg(long, default_value_t = 50)]
    pub population_multiplier: usize,
    #[arg(long, default_value_t = 0.05)]
    pub mutation_probability: f64,
    #[arg(long, default_value_t = 0.8)]
    pub crossover_probability: f64,
    /// Wall-clock budget of one resumable invocation.
    #[arg(long, default_value_t = 4000)]
    pub slice_ms: u64,
    #[arg(long)]
    pub max_generations: Option<usize>,
    /// Elite individuals returned as migrants after each slice.
    #[arg(long, default_value_t = 10)]
    pub migrant_count: usize,
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Default for GeneticParams {
    fn default() -> Self {
        Self {
            population_multiplier: 50,
            mutation_probability: 0.05,
            crossover_probability: 0.8,
            slice_ms: 4000,
            max_generations: None,
            migrant_count: 10,
            seed: None,
        }
    }
}

impl GeneticParams {
    pub fn slice(&self) -> Duration {
        Duration::from_millis(self.slice_ms)
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BruteforceParams {
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,
    /// Fan each range out across local cores.
    #[arg(long, default_value_t = false)]
    pub parallel: bool,
}

impl Default for BruteforceParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel: false,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelParams {
    /// Maximum unacknowledged deliveries a consumer holds.
    #[arg(long, default_value_t = 10)]
    pub prefetch: usize,
    #[arg(long, default_value_t = 2000)]
    pub fetch_wait_ms: u64,
    /// A leased message becomes ready again after this long without an ack.
    #[arg(long, default_value_t = 300)]
    pub lease_secs: u64,
    /// Consumers not seen for this long no longer count as live workers.
    #[arg(long, default_value_t = 60)]
    pub consumer_ttl_secs: u64,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self {
            prefetch: 10,
            fetch_wait_ms: 2000,
            lease_secs: 300,
            consumer_ttl_secs: 60,
        }
    }
}

impl ChannelParams {
    pub fn fetch_wait(&self) -> Duration {
        Duration::from_millis(self.fetch_wait_ms)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn consumer_ttl(&self) -> Duration {
        Duration::from_secs(self.consumer_ttl_secs)
    }
}
