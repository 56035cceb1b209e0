use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::{info, warn};

use crate::http_broker::NodeProfile;

/// Sizes rayon's global pool used by the parallel bruteforce fan-out.
/// `reserve` cores are left free for the host.
pub fn configure_global_thread_pool(reserve: usize) -> usize {
    let max_threads = num_cpus::get();
    let threads = max_threads.saturating_sub(reserve).max(1);

    match rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
        Ok(()) => info!(
            "🧵 Thread Pool configured: {} worker threads (System total: {})",
            threads, max_threads
        ),
        Err(e) => warn!("⚠️ Rayon pool already initialised: {}", e),
    }
    threads
}

pub fn detect_profile() -> NodeProfile {
    let mut sys = System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::everything()));
    sys.refresh_cpu();

    let cpu_model = sys
        .cpus()
        .first()
        .map(|c| c.brand().trim().to_string())
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());
    let cores = match sys.cpus().len() {
        0 => num_cpus::get(),
        n => n,
    };

    NodeProfile { cpu_model, cores }
}
