use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tourforge_core::channel::{Broker, Consumer};
use tourforge_core::config::Config;
use tourforge_core::coordinator::{
    genetic_multiplier, partition_bruteforce, BruteforceAggregator, GeneticAggregator, Outcome, Verdict,
};
use tourforge_core::error::{TourError, TourResult};
use tourforge_core::protocol::{
    task_queue_for, GeneticSeed, ResultMessage, RunReport, StartRunResponse, TaskMessage, TaskPayload, RESULT_QUEUE,
    TASK_QUEUE,
};
use tourforge_core::{Algorithm, DistanceMatrix};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Consumer ids used by the coordinator itself; never counted as workers.
pub const COORDINATOR_PREFIX: &str = "coordinator";

/// Clears the in-flight flag when the run ends, however it ends.
pub struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> TourResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TourError::ConcurrentRun)?;
        Ok(Self { flag: flag.clone() })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Initial tasks with their target queue, produced lazily.
type TaskStream = Box<dyn Iterator<Item = (String, TaskMessage)> + Send>;

enum Aggregator {
    Bruteforce(BruteforceAggregator),
    Genetic(GeneticAggregator),
}

impl Aggregator {
    fn accept(&mut self, result: &ResultMessage) -> Verdict {
        match self {
            Aggregator::Bruteforce(a) => a.accept(result),
            Aggregator::Genetic(a) => a.accept(result),
        }
    }

    fn continuation_published(&mut self, result: &ResultMessage) {
        if let Aggregator::Genetic(a) = self {
            a.continuation_published(result);
        }
    }

    fn outcome(&self) -> Outcome {
        match self {
            Aggregator::Bruteforce(a) => a.outcome(),
            Aggregator::Genetic(a) => a.outcome(),
        }
    }
}

/// A run whose tasks are published and whose results are still to be
/// collected.
pub struct ActiveRun {
    _guard: RunGuard,
    run_id: Uuid,
    algorithm: Algorithm,
    tasks_issued: u64,
    started: Instant,
    started_at: String,
    aggregator: Aggregator,
}

impl ActiveRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn tasks_issued(&self) -> u64 {
        self.tasks_issued
    }
}

pub struct Coordinator<B: Broker> {
    broker: Arc<B>,
    config: Config,
    running: Arc<AtomicBool>,
    latest: RwLock<Option<RunReport>>,
}

impl<B: Broker> Coordinator<B> {
    pub fn new(broker: Arc<B>, config: Config) -> Self {
        Self {
            broker,
            config,
            running: Arc::new(AtomicBool::new(false)),
            latest: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn latest_report(&self) -> Option<RunReport> {
        self.latest.read().await.clone()
    }

    async fn publish_task(&self, queue: &str, task: &TaskMessage) -> TourResult<()> {
        let payload = serde_json::to_string(task)?;
        self.broker.publish(queue, payload).await
    }

    /// Validates, plans and publishes every initial task. Nothing is
    /// published if validation fails.
    pub async fn begin(&self, matrix: DistanceMatrix, algorithm: Algorithm) -> TourResult<ActiveRun> {
        let guard = RunGuard::acquire(&self.running)?;
        let run_id = Uuid::new_v4();

        // Plan first: overflow and worker availability are checked before
        // the first publish.
        let (planned, aggregator): (TaskStream, Aggregator) =
            match algorithm {
                Algorithm::Bruteforce => {
                    let partition = partition_bruteforce(&matrix, self.config.bruteforce.chunk_size)?;
                    info!(
                        "🧮 Bruteforce over {} permutations in {} tasks",
                        partition.space(),
                        partition.task_count()
                    );
                    let aggregator =
                        Aggregator::Bruteforce(BruteforceAggregator::new(matrix.clone(), partition.task_count()));
                    let tasks = partition.map(move |range| {
                        let task = TaskMessage {
                            task_id: Uuid::new_v4(),
                            run_id,
                            round: 0,
                            matrix: matrix.clone(),
                            payload: TaskPayload::Bruteforce(range),
                        };
                        (TASK_QUEUE.to_string(), task)
                    });
                    let tasks: TaskStream = Box::new(tasks);
                    (tasks, aggregator)
                }
                Algorithm::Genetic => {
                    let workers: Vec<String> = self
                        .broker
                        .live_consumers()
                        .await?
                        .into_iter()
                        .filter(|id| !id.starts_with(COORDINATOR_PREFIX))
                        .collect();
                    if workers.is_empty() {
                        return Err(TourError::Validation("no live workers for a genetic run".into()));
                    }

                    let multiplier = genetic_multiplier(self.config.genetic.population_multiplier, workers.len());
                    info!(
                        "🧬 Genetic run on {} workers, population multiplier {}",
                        workers.len(),
                        multiplier
                    );

                    let mut rng = match self.config.genetic.seed {
                        Some(s) => fastrand::Rng::with_seed(s),
                        None => fastrand::Rng::new(),
                    };
                    let tasks: Vec<(String, TaskMessage)> = workers
                        .iter()
                        .map(|worker| {
                            let mut individual: Vec<usize> = (0..matrix.size()).collect();
                            rng.shuffle(&mut individual);
                            let task = TaskMessage {
                                task_id: Uuid::new_v4(),
                                run_id,
                                round: 0,
                                matrix: matrix.clone(),
                                payload: TaskPayload::Genetic(GeneticSeed {
                                    individual,
                                    population_size_multiplier: multiplier,
                                    migrants: Vec::new(),
                                    max_generations: self.config.genetic.max_generations,
                                }),
                            };
                            (task_queue_for(worker), task)
                        })
                        .collect();
                    let aggregator = Aggregator::Genetic(GeneticAggregator::new(
                        matrix,
                        run_id,
                        workers.len(),
                        multiplier,
                        self.config.genetic.max_generations,
                    ));
                    let tasks: TaskStream = Box::new(tasks.into_iter());
                    (tasks, aggregator)
                }
            };

        let stale = self.broker.purge(RESULT_QUEUE).await?;
        if stale > 0 {
            warn!("🧹 Purged {} stale results before run {}", stale, run_id);
        }

        let mut tasks_issued = 0u64;
        for (queue, task) in planned {
            self.publish_task(&queue, &task).await?;
            tasks_issued += 1;
        }
        info!("🚀 Run {} started: {} {} tasks published", run_id, tasks_issued, algorithm);

        Ok(ActiveRun {
            _guard: guard,
            run_id,
            algorithm,
            tasks_issued,
            started: Instant::now(),
            started_at: Utc::now().to_rfc3339(),
            aggregator,
        })
    }

    /// Consumes results until the run's stop condition holds, then records
    /// and returns the report.
    pub async fn drive(&self, mut run: ActiveRun) -> RunReport {
        let mut consumer = Consumer::new(
            self.broker.clone(),
            format!("{}-{}", COORDINATOR_PREFIX, run.run_id),
            vec![RESULT_QUEUE.to_string()],
            self.config.channel.prefetch,
            self.config.channel.fetch_wait(),
        );

        loop {
            let inbound = match consumer.next().await {
                Ok(Some(inbound)) => inbound,
                Ok(None) => continue,
                Err(e) => {
                    error!("❌ Result channel error: {}. Retrying...", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let result: ResultMessage = match serde_json::from_str(&inbound.delivery.payload) {
                Ok(r) => r,
                Err(e) => {
                    warn!("⚠️ Dropping malformed result: {}", e);
                    if let Err(e) = consumer.nack(&inbound, false).await {
                        error!("❌ Nack failed: {}", e);
                    }
                    continue;
                }
            };

            if result.run_id != run.run_id {
                debug!("Ignoring result of run {}", result.run_id);
                if let Err(e) = consumer.ack(&inbound).await {
                    error!("❌ Ack failed: {}", e);
                }
                continue;
            }

            let verdict = run.aggregator.accept(&result);
            let finished = matches!(verdict, Verdict::Finished);

            if let Verdict::Continue(next) = verdict {
                let queue = task_queue_for(&result.worker_id);
                if let Err(e) = self.publish_task(&queue, &next).await {
                    // The redelivered result reissues the same continuation.
                    error!("❌ Could not publish continuation to {}: {}. Requeueing result...", queue, e);
                    if let Err(e) = consumer.nack(&inbound, true).await {
                        error!("❌ Nack failed: {}", e);
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
                run.aggregator.continuation_published(&result);
            }

            if let Err(e) = consumer.ack(&inbound).await {
                error!("❌ Ack failed: {}", e);
            }
            if finished {
                break;
            }
        }

        match self.broker.purge(RESULT_QUEUE).await {
            Ok(n) if n > 0 => debug!("Purged {} late results", n),
            Ok(_) => {}
            Err(e) => warn!("⚠️ Could not purge result queue: {}", e),
        }

        let outcome = run.aggregator.outcome();
        let report = RunReport {
            run_id: run.run_id,
            algorithm: run.algorithm,
            best_cost: outcome.best_cost,
            best_path: outcome.best_path,
            elapsed_ms: run.started.elapsed().as_millis() as u64,
            tasks_issued: run.tasks_issued,
            results_received: outcome.results_received,
            started_at: run.started_at.clone(),
        };
        info!(
            "🏁 Run {} finished: cost {} in {} ms ({} results)",
            report.run_id, report.best_cost, report.elapsed_ms, report.results_received
        );

        *self.latest.write().await = Some(report.clone());
        report
    }

    /// Runs to completion in the caller's task.
    pub async fn run(&self, matrix: DistanceMatrix, algorithm: Algorithm) -> TourResult<RunReport> {
        let active = self.begin(matrix, algorithm).await?;
        Ok(self.drive(active).await)
    }

    /// Publishes the run and collects its results in the background.
    pub async fn start(self: &Arc<Self>, matrix: DistanceMatrix, algorithm: Algorithm) -> TourResult<StartRunResponse> {
        let active = self.begin(matrix, algorithm).await?;
        let response = StartRunResponse {
            run_id: active.run_id(),
            algorithm,
            tasks_issued: active.tasks_issued(),
        };

        let this = self.clone();
        tokio::spawn(async move {
            this.drive(active).await;
        });
        Ok(response)
    }
}
