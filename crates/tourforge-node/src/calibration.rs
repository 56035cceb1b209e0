use std::time::{Duration, Instant};
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tourforge_core::bruteforce::evaluate_range;
use tourforge_core::config::DEFAULT_CHUNK_SIZE;
use tourforge_core::error::{TourError, TourResult};
use tourforge_core::DistanceMatrix;
use tracing::info;

/// Cities in the benchmark matrix: 10 non-start cities, so the whole space is
/// exactly one default-sized chunk.
const BENCH_CITIES: usize = 11;
const BATCH: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct Calibration {
    pub permutations: u64,
    pub elapsed: Duration,
}

impl Calibration {
    pub fn per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.permutations as f64 / secs
        } else {
            0.0
        }
    }

    /// Estimated wall time for one default bruteforce chunk on one core.
    pub fn seconds_per_chunk(&self) -> Option<f64> {
        let rate = self.per_second();
        (rate > 0.0).then(|| DEFAULT_CHUNK_SIZE as f64 / rate)
    }
}

pub fn bench_matrix(seed: u64) -> TourResult<DistanceMatrix> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let rows = (0..BENCH_CITIES)
        .map(|_| (0..BENCH_CITIES).map(|_| rng.i64(1..1000)).collect())
        .collect();
    DistanceMatrix::from_rows(rows).map_err(TourError::Validation)
}

/// Evaluates consecutive permutation batches on the calling thread for at
/// least `duration`.
pub fn measure(duration: Duration) -> TourResult<Calibration> {
    let matrix = bench_matrix(42)?;
    let space = DEFAULT_CHUNK_SIZE;

    // Warm-up
    std::hint::black_box(evaluate_range(&matrix, 0, BATCH)?);

    let start = Instant::now();
    let mut permutations = 0u64;
    let mut cursor = 0u64;
    while start.elapsed() < duration || permutations == 0 {
        let end = (cursor + BATCH).min(space);
        std::hint::black_box(evaluate_range(&matrix, cursor, end)?);
        permutations += end - cursor;
        cursor = if end == space { 0 } else { end };
    }

    Ok(Calibration {
        permutations,
        elapsed: start.elapsed(),
    })
}

pub fn run_calibration(duration: Duration) -> TourResult<Calibration> {
    info!("🔌 Initializing TourForge Node Calibration...");

    let mut sys = System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::everything()));
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu();

    let host_name = System::host_name().unwrap_or("Unknown".into());
    let model = sys.cpus().first().map(|c| c.brand().trim().to_string()).unwrap_or_default();
    info!("🖥️  Host: {}", host_name);
    info!("🧠  CPU: {} ({} cores)", model, sys.cpus().len());
    info!("💾  RAM: {} MB", sys.total_memory() / 1024 / 1024);

    info!("🔥 Running Benchmark ({:.1}s)...", duration.as_secs_f64());
    let cal = measure(duration)?;

    info!("✅ Calibration Complete");
    info!(
        "⚡ Speed: {:.2} Million Permutations/sec (Single Core)",
        cal.per_second() / 1_000_000.0
    );
    if let Some(secs) = cal.seconds_per_chunk() {
        info!("⏱️  One {}-permutation chunk takes about {:.1}s per core", DEFAULT_CHUNK_SIZE, secs);
    }
    Ok(cal)
}
